//! Collaborative terminal-multiplexing server: the session hub and claim
//! arbiter core, plus the wire protocol and HTTP boundary around it.
//!
//! See `SPEC_FULL.md` at the workspace root for the full module map; the
//! binary entry point (`main.rs`) only parses CLI flags and wires these
//! modules together.

pub mod audit;
pub mod auth;
pub mod authority;
pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod multiplexer;
pub mod principal;
pub mod protocol;
pub mod registry;
pub mod server;

pub use authority::Role;
pub use config::Config;
pub use error::WireError;
pub use principal::Principal;
pub use registry::SessionRegistry;
