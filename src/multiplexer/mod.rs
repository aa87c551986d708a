//! Abstract attach/detach/read/write/resize contract over an external
//! terminal multiplexer.
//!
//! Isolating this trait lets the hub be tested against [`FakeMultiplexer`]
//! and makes the multiplexer swappable; [`tmux::TmuxMultiplexer`] is the
//! production backend.

pub mod fake;
pub mod tmux;

use async_trait::async_trait;
use std::fmt;

pub use fake::FakeMultiplexer;
pub use tmux::TmuxMultiplexer;

/// Failure modes the adapter contract can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// Named session does not exist (or vanished).
    NotFound,
    /// The multiplexer backend is unreachable right now.
    Unavailable,
    /// `cols`/`rows` outside the valid range, or otherwise malformed args.
    InvalidArgs,
    /// A read or write against the backend failed.
    IoError(String),
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "session not found"),
            Self::Unavailable => write!(f, "multiplexer unavailable"),
            Self::InvalidArgs => write!(f, "invalid arguments"),
            Self::IoError(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for MuxError {}

/// One entry of [`Multiplexer::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// Session name, as known to the multiplexer.
    pub name: String,
    /// Number of windows/panes the multiplexer reports for this session.
    pub window_count: u32,
    /// Whether any client is currently attached.
    pub attached: bool,
    /// Creation time, multiplexer-reported, opaque to this crate.
    pub created: String,
    /// Last-known terminal width, if the multiplexer tracks one.
    pub width: Option<u16>,
    /// Last-known terminal height, if the multiplexer tracks one.
    pub height: Option<u16>,
}

/// A live attachment to a multiplexer session's output stream.
///
/// Produces an unending sequence of raw PTY output chunks — no line framing
/// assumed, ANSI control sequences included verbatim.
#[async_trait]
pub trait OutputHandle: Send {
    /// Read the next chunk of output. Returns `None` on a clean EOF
    /// (multiplexer session exited) or `Some(Err(_))` on a read failure.
    async fn read_chunk(&mut self) -> Option<Result<Vec<u8>, MuxError>>;

    /// Detach from this session. Idempotent: calling it more than once, or
    /// after the stream has already ended, is not an error.
    async fn detach(&mut self);
}

/// The abstract multiplexer contract the hub drives.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Attach to a named session's output stream.
    async fn attach(&self, session_name: &str) -> Result<Box<dyn OutputHandle>, MuxError>;

    /// Write raw input bytes to a session. The adapter serializes concurrent
    /// writes to the same session itself — callers never interleave.
    async fn write(&self, session_name: &str, bytes: &[u8]) -> Result<(), MuxError>;

    /// Request a PTY resize. `0 < cols, rows <= 4096` or this fails with
    /// `InvalidArgs`.
    async fn resize(&self, session_name: &str, cols: u16, rows: u16) -> Result<(), MuxError>;

    /// List every session the multiplexer currently knows about.
    async fn list(&self) -> Result<Vec<SessionDescriptor>, MuxError>;
}

/// Shared bounds validation for `resize`, so every backend rejects the same
/// inputs the same way.
pub(crate) fn validate_resize(cols: u16, rows: u16) -> Result<(), MuxError> {
    const MAX_DIM: u16 = 4096;
    if cols == 0 || rows == 0 || cols > MAX_DIM || rows > MAX_DIM {
        return Err(MuxError::InvalidArgs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_resize_rejects_zero_and_oversized() {
        assert!(validate_resize(0, 24).is_err());
        assert!(validate_resize(80, 0).is_err());
        assert!(validate_resize(4097, 24).is_err());
        assert!(validate_resize(80, 4097).is_err());
        assert!(validate_resize(80, 24).is_ok());
        assert!(validate_resize(4096, 4096).is_ok());
    }
}
