//! The authenticated identity attached to a connection.

use crate::authority::Role;
use serde::{Deserialize, Serialize};

/// Immutable per-connection identity, created by the (external) auth layer
/// at connection time and destroyed on disconnect.
///
/// The core never constructs one itself — it is handed to
/// [`crate::connection`] by whatever upgraded the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque user identifier, stable across reconnects.
    pub user_id: String,
    /// Display name shown in presence/claim frames.
    pub display_name: String,
    /// Authority level for this connection.
    pub role: Role,
}

impl Principal {
    /// Construct a principal. Used by tests and by whatever auth middleware
    /// wraps the connection endpoint in a real deployment.
    #[must_use]
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
        }
    }
}
