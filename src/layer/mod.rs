mod config;
mod connection;
mod endpoint;
mod error;
mod receiver;
mod sender;

pub use config::*;
pub use connection::*;
pub use endpoint::*;
pub use error::*;

/// Consecutive send/receive failures tolerated before a transfer gives up.
const MAX_CONSECUTIVE_TRANSPORT_ERRORS: usize = 64;
