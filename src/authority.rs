//! Role ordering and the pure (role, action) → allowed? predicate.
//!
//! The arbiter and hub consult this module only; it never touches
//! persistent stores or talks to the auth layer itself — it is handed an
//! already-authenticated [`Role`] and nothing else.

use serde::{Deserialize, Serialize};

/// Fixed total order: `Viewer < Operator < Admin < Owner`.
///
/// Always serialize by name, never by the discriminant — the wire protocol
/// and any persisted record must remain stable across a reordering of this
/// enum's variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can subscribe and watch output.
    Viewer,
    /// Can claim, send keys, resize.
    Operator,
    /// Can preempt another operator's claim.
    Admin,
    /// Same authority as `Admin` for everything this crate arbitrates.
    Owner,
}

/// An action gated by [`allowed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Subscribe to a session's output and presence.
    View,
    /// Write input bytes / resize a claimed session.
    SendKeys,
    /// Acquire a claim on an unclaimed session.
    Claim,
    /// Preempt another user's claim.
    Preempt,
    /// Force-release someone else's claim.
    ForceRelease,
}

/// Returns whether `role` may perform `action`, independent of any
/// particular session or claim state.
///
/// Claim-specific guards (e.g. "only the current holder may renew") live in
/// [`crate::hub::claim`], which consults this predicate for the
/// role-threshold half of each guard and adds the holder-identity half
/// itself.
#[must_use]
pub fn allowed(role: Role, action: Action) -> bool {
    match action {
        Action::View => true,
        Action::SendKeys | Action::Claim => role >= Role::Operator,
        Action::Preempt | Action::ForceRelease => role >= Role::Admin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_is_total() {
        assert!(Role::Viewer < Role::Operator);
        assert!(Role::Operator < Role::Admin);
        assert!(Role::Admin < Role::Owner);
    }

    #[test]
    fn viewer_can_only_view() {
        assert!(allowed(Role::Viewer, Action::View));
        assert!(!allowed(Role::Viewer, Action::SendKeys));
        assert!(!allowed(Role::Viewer, Action::Claim));
        assert!(!allowed(Role::Viewer, Action::Preempt));
        assert!(!allowed(Role::Viewer, Action::ForceRelease));
    }

    #[test]
    fn operator_can_claim_and_send_keys_but_not_preempt() {
        assert!(allowed(Role::Operator, Action::Claim));
        assert!(allowed(Role::Operator, Action::SendKeys));
        assert!(!allowed(Role::Operator, Action::Preempt));
        assert!(!allowed(Role::Operator, Action::ForceRelease));
    }

    #[test]
    fn admin_and_owner_can_preempt_and_force_release() {
        for role in [Role::Admin, Role::Owner] {
            assert!(allowed(role, Action::Preempt));
            assert!(allowed(role, Action::ForceRelease));
        }
    }

    #[test]
    fn role_serializes_by_name() {
        let json = serde_json::to_string(&Role::Operator).unwrap();
        assert_eq!(json, "\"operator\"");
    }
}
