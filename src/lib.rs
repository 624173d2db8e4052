//! Reliable, in-order byte transfer over UDP.
//!
//! A sender cuts the caller's data into packets with 8-bit wrapping sequence
//! numbers and sends them in rounds sized by the receiver's window grant. The
//! receiver reassembles them in a fixed ring and answers with cumulative
//! ACKs once the sender goes quiet. Lost packets are sent again.
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let mut conn = backtcp::layer::Connection::open(IpAddr::V4(Ipv4Addr::LOCALHOST), 6666)?;
//! let sent = conn.send(b"hello")?;
//! assert_eq!(sent, 5);
//! conn.close();
//! # Ok::<(), backtcp::layer::Error>(())
//! ```

pub mod layer;
pub mod protocol;
pub mod utils;
