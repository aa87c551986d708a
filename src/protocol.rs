//! JSON wire frames exchanged over the `/ws` connection.
//!
//! Tagged unions keyed on `type`, dispatched exhaustively in
//! [`crate::connection`] — no reflection or string-key lookup in the hot
//! path, per the fixed dispatch style the rest of this crate uses for
//! [`crate::hub::HubEvent`].

use crate::authority::Role;
use serde::{Deserialize, Serialize};

/// A frame sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Join a session's membership set.
    Subscribe {
        /// Multiplexer session name.
        session_name: String,
    },
    /// Leave a session's membership set.
    Unsubscribe {
        /// Multiplexer session name.
        session_name: String,
    },
    /// Send raw input bytes (UTF-8 encoded, control bytes permitted).
    SendKeys {
        /// Multiplexer session name.
        session_name: String,
        /// Raw key bytes as sent by the terminal.
        keys: String,
    },
    /// Request a PTY resize.
    Resize {
        /// Multiplexer session name.
        session_name: String,
        /// New column count.
        cols: u16,
        /// New row count.
        rows: u16,
    },
    /// Acquire or renew the claim.
    Claim {
        /// Multiplexer session name.
        session_name: String,
    },
    /// Release a claim this connection holds.
    Release {
        /// Multiplexer session name.
        session_name: String,
    },
    /// Forcibly release someone else's claim (requires admin+).
    ForceRelease {
        /// Multiplexer session name.
        session_name: String,
    },
    /// Application-level liveness probe.
    Ping {
        /// Echoed back verbatim in the `pong` reply.
        nonce: String,
    },
}

/// A single presence entry inside a `presence` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    /// Opaque user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional avatar hint passed through from the principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Whether every connection for this user is currently idle.
    pub idle: bool,
}

/// The `by` field of a `claimed` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimHolder {
    /// Opaque user id of the holder.
    pub id: String,
    /// Display name of the holder.
    pub name: String,
}

/// Why a `claimed` frame was emitted, beyond a first-time acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimedReason {
    /// The existing holder renewed their own lease.
    Renewed,
    /// A higher-authority user took the claim from its prior holder.
    Preempted,
}

/// Why a `released` frame was emitted, beyond a plain voluntary release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasedReason {
    /// The holder's only connection to this session disconnected.
    HolderGone,
    /// The lease expired without renewal or input.
    Expired,
    /// An admin+ force-released it.
    Forced,
}

/// A frame sent by the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Sent once per connection, before any session frame.
    Connected {
        /// The connecting principal's user id.
        user_id: String,
        /// The connecting principal's role.
        role: Role,
    },
    /// A chunk of raw multiplexer output.
    Output {
        /// Originating session.
        session_name: String,
        /// Monotonic per-session sequence number; gaps mean drops, never reorders.
        seq: u64,
        /// Raw output bytes, UTF-8 lossy-decoded for wire transport.
        data: String,
    },
    /// A claim was acquired, renewed, or preempted.
    Claimed {
        /// Session the claim applies to.
        session_name: String,
        /// Current holder.
        by: ClaimHolder,
        /// ISO-8601 lease expiry.
        expires_at: String,
        /// Set when this isn't a first-time acquisition.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<ClaimedReason>,
    },
    /// A claim was released.
    Released {
        /// Session the claim applied to.
        session_name: String,
        /// Why, if not a plain voluntary release.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<ReleasedReason>,
    },
    /// Current membership snapshot for a session.
    Presence {
        /// Session this snapshot describes.
        session_name: String,
        /// Deduplicated-by-user membership list.
        users: Vec<PresenceUser>,
    },
    /// A recoverable or terminal error tied to a request or connection.
    Error {
        /// Stable wire code; clients should switch on this, not `message`.
        code: &'static str,
        /// Human-readable, localized, informational only.
        message: String,
        /// Session this error pertains to, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        session_name: Option<String>,
        /// Current holder, present only for `LOCKED`.
        #[serde(skip_serializing_if = "Option::is_none")]
        held_by: Option<String>,
    },
    /// Reply to a `ping`.
    Pong {
        /// Echoed nonce.
        nonce: String,
    },
}

impl ServerFrame {
    /// Build an `error` frame from a [`crate::error::WireError`].
    #[must_use]
    pub fn from_wire_error(err: &crate::error::WireError, session_name: Option<String>) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
            session_name,
            held_by: err.held_by().map(str::to_owned),
        }
    }
}
