use std::{collections::TryReserveError, io};

use thiserror::Error;

use crate::{
    protocol::{DecodingError, EncodingError},
    utils::Seq8,
};

use super::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("no peer address known yet")]
    NoPeer,

    #[error("malformed packet: {0:?}")]
    MalformedPacket(DecodingError),

    #[error("duplicate packet seq={seq}")]
    DuplicatePacket { seq: Seq8 },

    #[error("packet seq={seq} not in receive window starting at {window_start}")]
    OutOfWindowPacket { seq: Seq8, window_start: Seq8 },

    #[error("failed to allocate working buffers: {0}")]
    AllocationFailure(#[from] TryReserveError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("cannot encode packet: {0:?}")]
    Encoding(EncodingError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("configuration is fixed once a transfer has started")]
    ConfigLocked,
}

impl From<DecodingError> for Error {
    fn from(e: DecodingError) -> Self {
        Error::MalformedPacket(e)
    }
}

impl From<EncodingError> for Error {
    fn from(e: EncodingError) -> Self {
        Error::Encoding(e)
    }
}
