//! Dev-mode stand-in for the external auth layer spec §4.1 assumes already
//! ran before a connection reaches this crate.
//!
//! Production deployments terminate auth upstream (a gateway, a session
//! cookie service) and hand this crate an already-authenticated
//! [`Principal`]; [`HeaderAuthenticator`] exists so the crate is runnable
//! and testable standalone, trusting caller-supplied headers the way the
//! teacher's own dev-mode auth shim trusts a bearer token with no
//! verification step.

use crate::authority::Role;
use crate::error::WireError;
use crate::principal::Principal;

/// Resolves a [`Principal`] from whatever the transport handed the
/// connection endpoint.
pub trait Authenticator: Send + Sync {
    /// Authenticate an incoming connection from its upgrade request headers.
    fn authenticate(&self, headers: &axum::http::HeaderMap) -> Result<Principal, WireError>;
}

/// Trusts `X-User-Id`/`X-User-Name`/`X-User-Role` headers verbatim. Meant
/// for local development and the integration test suite, never for a
/// deployment reachable from untrusted clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderAuthenticator;

impl Authenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &axum::http::HeaderMap) -> Result<Principal, WireError> {
        let user_id = header_str(headers, "x-user-id").ok_or(WireError::Unauthorized)?;
        let display_name = header_str(headers, "x-user-name").unwrap_or_else(|| user_id.clone());
        let role = header_str(headers, "x-user-role")
            .map(|raw| parse_role(&raw))
            .unwrap_or(Some(Role::Viewer))
            .ok_or(WireError::Unauthorized)?;
        Ok(Principal::new(user_id, display_name, role))
    }
}

fn header_str(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_owned)
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw.to_ascii_lowercase().as_str() {
        "viewer" => Some(Role::Viewer),
        "operator" => Some(Role::Operator),
        "admin" => Some(Role::Admin),
        "owner" => Some(Role::Owner),
        _ => None,
    }
}
