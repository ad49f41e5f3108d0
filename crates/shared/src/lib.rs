//! Shared types for the Pulse live-update client and server.

pub mod error;
pub mod protocol;
pub mod query;
pub mod router;

pub use error::*;
pub use protocol::*;
pub use query::*;
pub use router::*;
