//! # Packet header
//!
//! ```text
//! 0   1   2   3   4   5   6   7   8 (BYTE)
//! +---+---+---+---+---+---+---+---+
//! |spt|dpt|seq|ack|off|wnd|flg|len|
//! +---+---+---+---+---+---+---+---+
//! |                               |
//! |        Payload (`len`)        |
//! |                               |
//! +-------------------------------+
//! ```
//!
//! - `spt`, `dpt`: reserved, always `0`
//! - `seq`, `ack`: wrap modulo 256
//! - `off`: byte offset of the payload, normally [`packet_hdr::HEADER_LEN`]
//! - `wnd`: data packet: packets still to come in this round;
//!   ACK: free slots in the receiver's reassembly ring
//! - `flg`: bit 0 `RETRANSMISSION`, bit 1 `END_OF_TRANSMISSION`, bit 6 `ACK`
//!
//! A zero-length datagram (no header at all) means the peer is closing.
//!
//! # Invariants
//!
//! - `off + len` equals the length of the datagram carrying the header

pub mod packet;
pub mod packet_hdr;

#[derive(Debug, PartialEq, Eq)]
pub enum DecodingError {
    TooShort { len: usize },
    Decoding { field: &'static str },
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, PartialEq, Eq)]
pub enum EncodingError {
    NotEnoughSpace,
    PayloadTooLong { len: usize },
}
