use std::io::{self, Cursor};

use byteorder::{ReadBytesExt, WriteBytesExt};
use num_enum::IntoPrimitive;

use crate::utils::Seq8;

use super::{DecodingError, EncodingError};

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Flag {
    Retransmission = 0x01,
    EndOfTransmission = 0x02,
    Ack = 0x40,
}

/// Bitset of [`Flag`]s. Unknown bits are kept as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    #[must_use]
    pub fn empty() -> Self {
        Flags(0)
    }

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    #[must_use]
    #[inline]
    pub fn bits(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn with(self, flag: Flag) -> Self {
        Flags(self.0 | u8::from(flag))
    }

    #[must_use]
    #[inline]
    pub fn contains(&self, flag: Flag) -> bool {
        let bit = u8::from(flag);
        self.0 & bit == bit
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    seq: Seq8,
    ack: Seq8,
    data_off: u8,
    wnd: u8,
    flags: Flags,
    data_len: u8,
}

pub struct PacketHeaderBuilder {
    pub seq: Seq8,
    pub ack: Seq8,
    pub wnd: u8,
    pub flags: Flags,
    pub data_len: u8,
}

impl PacketHeaderBuilder {
    pub fn build(self) -> PacketHeader {
        let this = PacketHeader {
            seq: self.seq,
            ack: self.ack,
            data_off: HEADER_LEN as u8,
            wnd: self.wnd,
            flags: self.flags,
            data_len: self.data_len,
        };
        this.check_rep();
        this
    }
}

impl PacketHeader {
    #[inline]
    fn check_rep(&self) {
        assert!(HEADER_LEN <= self.data_off as usize);
    }

    /// Header of a pure acknowledgement: no payload, `ACK` flag set.
    #[must_use]
    pub fn ack(ack: Seq8, wnd: u8) -> Self {
        PacketHeaderBuilder {
            seq: Seq8::zero(),
            ack,
            wnd,
            flags: Flags::empty().with(Flag::Ack),
            data_len: 0,
        }
        .build()
    }

    /// Decodes the fixed-size header at the cursor position.
    ///
    /// Only the header itself is checked here; whether `data_off + data_len`
    /// matches the datagram is the job of [`super::packet::Packet`].
    pub fn from_bytes(rdr: &mut Cursor<&[u8]>) -> Result<Self, DecodingError> {
        let remaining = rdr.get_ref().len().saturating_sub(rdr.position() as usize);
        if remaining < HEADER_LEN {
            return Err(DecodingError::TooShort { len: remaining });
        }
        let _sport = read_field(rdr, "sport")?;
        let _dport = read_field(rdr, "dport")?;
        let seq = read_field(rdr, "seq")?;
        let ack = read_field(rdr, "ack")?;
        let data_off = read_field(rdr, "data_off")?;
        let wnd = read_field(rdr, "wnd")?;
        let flags = read_field(rdr, "flags")?;
        let data_len = read_field(rdr, "data_len")?;

        if (data_off as usize) < HEADER_LEN {
            return Err(DecodingError::Decoding { field: "data_off" });
        }

        let this = PacketHeader {
            seq: Seq8::from_u8(seq),
            ack: Seq8::from_u8(ack),
            data_off,
            wnd,
            flags: Flags::from_bits(flags),
            data_len,
        };
        this.check_rep();
        Ok(this)
    }

    pub fn append_to(&self, wtr: &mut impl io::Write) -> Result<(), EncodingError> {
        let fields = [
            0,
            0,
            self.seq.to_u8(),
            self.ack.to_u8(),
            self.data_off,
            self.wnd,
            self.flags.bits(),
            self.data_len,
        ];
        for field in fields {
            wtr.write_u8(field)
                .map_err(|_| EncodingError::NotEnoughSpace)?;
        }
        Ok(())
    }

    #[must_use]
    #[inline]
    pub fn seq(&self) -> Seq8 {
        self.seq
    }

    #[must_use]
    #[inline]
    pub fn ack_num(&self) -> Seq8 {
        self.ack
    }

    #[must_use]
    #[inline]
    pub fn data_off(&self) -> u8 {
        self.data_off
    }

    #[must_use]
    #[inline]
    pub fn wnd(&self) -> u8 {
        self.wnd
    }

    #[must_use]
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    #[inline]
    pub fn data_len(&self) -> u8 {
        self.data_len
    }

    /// Total datagram length this header claims.
    #[must_use]
    #[inline]
    pub fn claimed_len(&self) -> usize {
        self.data_off as usize + self.data_len as usize
    }
}

#[inline]
fn read_field(rdr: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, DecodingError> {
    rdr.read_u8()
        .map_err(|_e| DecodingError::Decoding { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1() {
        let hdr = PacketHeaderBuilder {
            seq: Seq8::from_u8(200),
            ack: Seq8::from_u8(17),
            wnd: 3,
            flags: Flags::empty().with(Flag::Retransmission),
            data_len: 64,
        }
        .build();
        let mut buf = Vec::new();
        hdr.append_to(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 0, 200, 17, 8, 3, 0x01, 64]);

        let hdr2 = PacketHeader::from_bytes(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(hdr, hdr2);
        assert_eq!(hdr2.claimed_len(), HEADER_LEN + 64);
    }

    #[test]
    fn ack_header_layout() {
        let hdr = PacketHeader::ack(Seq8::from_u8(5), 10);
        let mut buf = Vec::new();
        hdr.append_to(&mut buf).unwrap();
        //              spt dpt seq ack off wnd  flg  len
        assert_eq!(buf, vec![0, 0, 0, 5, 8, 10, 0x40, 0]);
        assert!(hdr.flags().contains(Flag::Ack));
        assert!(!hdr.flags().contains(Flag::Retransmission));
    }

    #[test]
    fn decode_too_short() {
        let buf = [0u8; HEADER_LEN - 1];
        let err = PacketHeader::from_bytes(&mut Cursor::new(&buf[..])).unwrap_err();
        assert_eq!(err, DecodingError::TooShort { len: HEADER_LEN - 1 });

        let err = PacketHeader::from_bytes(&mut Cursor::new(&[][..])).unwrap_err();
        assert_eq!(err, DecodingError::TooShort { len: 0 });
    }

    #[test]
    fn decode_offset_inside_header() {
        let buf = [0, 0, 1, 0, 4, 0, 0, 0];
        let err = PacketHeader::from_bytes(&mut Cursor::new(&buf[..])).unwrap_err();
        assert_eq!(err, DecodingError::Decoding { field: "data_off" });
    }

    #[test]
    fn append_to_full_buffer() {
        let hdr = PacketHeader::ack(Seq8::from_u8(1), 1);
        let mut small = [0u8; HEADER_LEN - 2];
        let err = hdr.append_to(&mut Cursor::new(&mut small[..])).unwrap_err();
        assert_eq!(err, EncodingError::NotEnoughSpace);
    }

    #[test]
    fn flags_keep_unknown_bits() {
        let flags = Flags::from_bits(0x80 | 0x02);
        assert!(flags.contains(Flag::EndOfTransmission));
        assert!(!flags.contains(Flag::Ack));
        assert_eq!(flags.bits(), 0x82);
    }
}
