//! The typed wire error boundary.
//!
//! Internal plumbing (adapter I/O, JSON decode, channel send failures) stays
//! on `anyhow::Result` the way the rest of this crate does; `WireError` only
//! exists at the edges where a failure must become a `{code, message}` frame
//! on the wire. Clients drive UI off `code`; `message` is informational.

use thiserror::Error;

/// One variant per `error.code` named in the wire protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    /// No principal attached to the connection (handshake never completed).
    #[error("unauthorized")]
    Unauthorized,
    /// Role lacks authority for the requested action.
    #[error("forbidden")]
    Forbidden,
    /// Named session is unknown to the multiplexer.
    #[error("session not found")]
    NotFound,
    /// Claim is held by someone else and the requester can't preempt it.
    #[error("locked by {held_by}")]
    Locked {
        /// `userId` of the current holder.
        held_by: String,
    },
    /// Requester sent `sendKeys`/`resize` without holding the claim.
    #[error("not the claim holder")]
    NotHolder,
    /// Requester was just preempted by a higher-authority claimant.
    #[error("claim preempted")]
    Preempted,
    /// Client frame failed to decode.
    #[error("malformed frame")]
    BadFrame,
    /// Multiplexer write/read failed.
    #[error("io error")]
    Io,
    /// The multiplexer session vanished out from under the hub.
    #[error("session lost")]
    SessionLost,
    /// Subscriber's outbound queues could not keep up.
    #[error("slow consumer")]
    SlowConsumer,
    /// Subscriber evicted for exceeding the presence idle-eviction window.
    #[error("idle timeout")]
    IdleTimeout,
    /// Process-wide shutdown in progress.
    #[error("server shutdown")]
    ServerShutdown,
}

impl WireError {
    /// The stable wire string clients switch on.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Locked { .. } => "LOCKED",
            Self::NotHolder => "NOT_HOLDER",
            Self::Preempted => "PREEMPTED",
            Self::BadFrame => "BAD_FRAME",
            Self::Io => "IO",
            Self::SessionLost => "SESSION_LOST",
            Self::SlowConsumer => "SLOW_CONSUMER",
            Self::IdleTimeout => "IDLE_TIMEOUT",
            Self::ServerShutdown => "SERVER_SHUTDOWN",
        }
    }

    /// `heldBy` field for the `error` frame, if this variant carries one.
    #[must_use]
    pub fn held_by(&self) -> Option<&str> {
        match self {
            Self::Locked { held_by } => Some(held_by.as_str()),
            _ => None,
        }
    }
}
