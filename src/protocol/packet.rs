use std::io::{self, Cursor};

use super::{
    packet_hdr::{PacketHeader, PacketHeaderBuilder, HEADER_LEN},
    DecodingError, EncodingError,
};

/// A datagram whose header has been checked against its actual length.
pub struct Packet<'a> {
    hdr: PacketHeader,
    payload: &'a [u8],
}

pub struct PacketBuilder<'a> {
    pub hdr: PacketHeaderBuilder,
    pub payload: &'a [u8],
}

impl<'a> PacketBuilder<'a> {
    pub fn build(self) -> Result<Packet<'a>, EncodingError> {
        if self.payload.len() > u8::MAX as usize {
            return Err(EncodingError::PayloadTooLong {
                len: self.payload.len(),
            });
        }
        let mut hdr = self.hdr;
        hdr.data_len = self.payload.len() as u8;
        let this = Packet {
            hdr: hdr.build(),
            payload: self.payload,
        };
        this.check_rep();
        Ok(this)
    }
}

impl<'a> Packet<'a> {
    #[inline]
    fn check_rep(&self) {
        assert_eq!(self.hdr.data_len() as usize, self.payload.len());
    }

    /// Parses a whole datagram.
    ///
    /// Fails unless `data_off + data_len` equals `datagram.len()`.
    pub fn from_datagram(datagram: &'a [u8]) -> Result<Self, DecodingError> {
        let mut rdr = Cursor::new(datagram);
        let hdr = PacketHeader::from_bytes(&mut rdr)?;
        if hdr.claimed_len() != datagram.len() {
            return Err(DecodingError::LengthMismatch {
                expected: hdr.claimed_len(),
                actual: datagram.len(),
            });
        }
        let payload = &datagram[hdr.data_off() as usize..];

        let this = Packet { hdr, payload };
        this.check_rep();
        Ok(this)
    }

    pub fn append_to(&self, wtr: &mut impl io::Write) -> Result<(), EncodingError> {
        self.hdr.append_to(wtr)?;
        wtr.write_all(self.payload)
            .map_err(|_| EncodingError::NotEnoughSpace)?;
        Ok(())
    }

    #[must_use]
    #[inline]
    pub fn hdr(&self) -> &PacketHeader {
        &self.hdr
    }

    #[must_use]
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    #[must_use]
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}
