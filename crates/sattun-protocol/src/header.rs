//! GSE packet header codec.
//!
//! Every GSE packet starts with a two-byte fixed header:
//!
//! ```text
//!  7   6   5 4   3 2 1 0   7 6 5 4 3 2 1 0
//! +---+---+-----+-------------------------+
//! | S | E | LT  |       GSE length        |
//! +---+---+-----+-------------------------+
//! ```
//!
//! The GSE length counts the bytes following the fixed header. Depending on the
//! S (start) and E (end) flags the fixed header is followed by:
//!
//! - complete packet: protocol type (2), label, PDU
//! - first fragment: fragment id (1), total length (2), protocol type (2), label, data
//! - intermediate fragment: fragment id (1), data
//! - last fragment: fragment id (1), data, CRC-32 (4)
//!
//! A packet whose first four bits are all zero is padding.

use byteorder::{BigEndian, ByteOrder};

use sattun_core::constants::{FIXED_HEADER_LENGTH, MAX_GSE_LENGTH};

use crate::checksum::CHECKSUM_LENGTH;

/// Length of the fragment id field.
pub const FRAG_ID_LENGTH: usize = 1;
/// Length of the total length field.
pub const TOTAL_LENGTH_LENGTH: usize = 2;
/// Length of the protocol type field.
pub const PROTOCOL_LENGTH: usize = 2;

const START_FLAG: u16 = 0x8000;
const END_FLAG: u16 = 0x4000;
const LABEL_TYPE_SHIFT: u16 = 12;

/// How the label of a packet is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelType {
    /// 6-byte label.
    SixBytes,
    /// 3-byte label.
    ThreeBytes,
    /// No label (broadcast).
    Broadcast,
    /// No label bytes; the previous label applies. Also set on non-first fragments.
    Reuse,
}

impl LabelType {
    /// Decodes the two LT bits.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => LabelType::SixBytes,
            1 => LabelType::ThreeBytes,
            2 => LabelType::Broadcast,
            _ => LabelType::Reuse,
        }
    }

    /// Encodes the two LT bits.
    pub fn bits(self) -> u8 {
        match self {
            LabelType::SixBytes => 0,
            LabelType::ThreeBytes => 1,
            LabelType::Broadcast => 2,
            LabelType::Reuse => 3,
        }
    }

    /// Number of label bytes carried in the header.
    pub fn label_length(self) -> usize {
        match self {
            LabelType::SixBytes => 6,
            LabelType::ThreeBytes => 3,
            LabelType::Broadcast | LabelType::Reuse => 0,
        }
    }
}

/// The four packet shapes given by the S and E flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    /// S=1, E=1: a whole PDU.
    Complete,
    /// S=1, E=0: first fragment of a PDU.
    First,
    /// S=0, E=0: intermediate fragment.
    Intermediate,
    /// S=0, E=1: last fragment, followed by the CRC-32.
    Last,
}

impl PacketKind {
    fn from_flags(start: bool, end: bool) -> Self {
        match (start, end) {
            (true, true) => PacketKind::Complete,
            (true, false) => PacketKind::First,
            (false, false) => PacketKind::Intermediate,
            (false, true) => PacketKind::Last,
        }
    }

    fn flags(self) -> u16 {
        match self {
            PacketKind::Complete => START_FLAG | END_FLAG,
            PacketKind::First => START_FLAG,
            PacketKind::Intermediate => 0,
            PacketKind::Last => END_FLAG,
        }
    }

    /// Header length of this packet shape, fixed header included.
    pub fn header_length(self, label_type: LabelType) -> usize {
        match self {
            PacketKind::Complete => {
                FIXED_HEADER_LENGTH + PROTOCOL_LENGTH + label_type.label_length()
            }
            PacketKind::First => {
                FIXED_HEADER_LENGTH
                    + FRAG_ID_LENGTH
                    + TOTAL_LENGTH_LENGTH
                    + PROTOCOL_LENGTH
                    + label_type.label_length()
            }
            PacketKind::Intermediate | PacketKind::Last => FIXED_HEADER_LENGTH + FRAG_ID_LENGTH,
        }
    }

    /// Trailer length of this packet shape.
    pub fn trailer_length(self) -> usize {
        match self {
            PacketKind::Last => CHECKSUM_LENGTH,
            _ => 0,
        }
    }
}

/// The fixed header common to every GSE packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedHeader {
    /// Packet shape.
    pub kind: PacketKind,
    /// Label encoding.
    pub label_type: LabelType,
    /// Bytes following the fixed header.
    pub gse_length: usize,
}

impl FixedHeader {
    /// Creates a header. `gse_length` must not exceed [`MAX_GSE_LENGTH`].
    pub fn new(kind: PacketKind, label_type: LabelType, gse_length: usize) -> Self {
        debug_assert!(gse_length <= MAX_GSE_LENGTH);
        Self { kind, label_type, gse_length }
    }

    /// Length of the whole packet, fixed header included.
    pub fn packet_length(&self) -> usize {
        self.gse_length + FIXED_HEADER_LENGTH
    }

    /// Writes the header into the first two bytes of `out`.
    pub fn write(&self, out: &mut [u8]) {
        let value = self.kind.flags()
            | (u16::from(self.label_type.bits()) << LABEL_TYPE_SHIFT)
            | (self.gse_length as u16 & MAX_GSE_LENGTH as u16);
        BigEndian::write_u16(&mut out[..FIXED_HEADER_LENGTH], value);
    }

    /// Parses the header at the start of `bytes`. Returns `None` if fewer than two bytes
    /// are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FIXED_HEADER_LENGTH {
            return None;
        }
        let value = BigEndian::read_u16(bytes);
        Some(Self {
            kind: PacketKind::from_flags(value & START_FLAG != 0, value & END_FLAG != 0),
            label_type: LabelType::from_bits((value >> LABEL_TYPE_SHIFT) as u8),
            gse_length: usize::from(value) & MAX_GSE_LENGTH,
        })
    }
}

/// Returns true if `bytes` starts with padding rather than a GSE packet.
pub fn is_padding(bytes: &[u8]) -> bool {
    bytes.first().map_or(false, |byte| byte >> 4 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lengths() {
        assert_eq!(PacketKind::Complete.header_length(LabelType::SixBytes), 10);
        assert_eq!(PacketKind::First.header_length(LabelType::SixBytes), 13);
        assert_eq!(PacketKind::First.header_length(LabelType::ThreeBytes), 10);
        assert_eq!(PacketKind::Intermediate.header_length(LabelType::Reuse), 3);
        assert_eq!(PacketKind::Last.header_length(LabelType::Reuse), 3);
        assert_eq!(PacketKind::Last.trailer_length(), 4);
        assert_eq!(PacketKind::First.trailer_length(), 0);
    }

    #[test]
    fn test_complete_header_bits() {
        let mut out = [0u8; 2];
        FixedHeader::new(PacketKind::Complete, LabelType::SixBytes, 68).write(&mut out);
        assert_eq!(out, [0xC0, 68]);
    }

    #[test]
    fn test_last_fragment_header_bits() {
        let mut out = [0u8; 2];
        FixedHeader::new(PacketKind::Last, LabelType::Reuse, 0x0ABC).write(&mut out);
        assert_eq!(out, [0x7A, 0xBC]);
    }

    #[test]
    fn test_parse_header() {
        let header = FixedHeader::parse(&[0xB1, 0x23, 0xFF]).unwrap();
        assert_eq!(header.kind, PacketKind::First);
        assert_eq!(header.label_type, LabelType::Reuse);
        assert_eq!(header.gse_length, 0x123);
        assert_eq!(header.packet_length(), 0x125);
    }

    #[test]
    fn test_parse_short_header() {
        assert_eq!(FixedHeader::parse(&[0xC0]), None);
    }

    #[test]
    fn test_every_shape_parses_back() {
        let kinds =
            [PacketKind::Complete, PacketKind::First, PacketKind::Intermediate, PacketKind::Last];
        let label_types =
            [LabelType::SixBytes, LabelType::ThreeBytes, LabelType::Broadcast, LabelType::Reuse];
        for kind in kinds {
            for label_type in label_types {
                let header = FixedHeader::new(kind, label_type, 4095);
                let mut out = [0u8; 2];
                header.write(&mut out);
                assert_eq!(FixedHeader::parse(&out), Some(header));
            }
        }
    }

    #[test]
    fn test_padding_detection() {
        assert!(is_padding(&[0x00, 0x00]));
        assert!(is_padding(&[0x0F]));
        assert!(!is_padding(&[0x30, 0x01]));
        assert!(!is_padding(&[]));
    }
}
