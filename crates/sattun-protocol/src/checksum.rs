//! CRC-32 of fragmented PDUs.
//!
//! The last fragment of a fragmented PDU carries a CRC-32 computed over the total
//! length field, the protocol type, the label and the whole PDU, in that order.
//! The checksum is the IEEE CRC-32 provided by `crc32fast`.

use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher;

/// Length of the CRC-32 trailer.
pub const CHECKSUM_LENGTH: usize = 4;

/// Starts a checksum over the header fields covered by the CRC.
pub fn begin_checksum(total_length: u16, protocol: u16, label: &[u8]) -> Hasher {
    let mut fields = [0u8; 4];
    BigEndian::write_u16(&mut fields[..2], total_length);
    BigEndian::write_u16(&mut fields[2..], protocol);

    let mut hasher = Hasher::new();
    hasher.update(&fields);
    hasher.update(label);
    hasher
}

/// Computes the checksum of a whole fragmented PDU.
pub fn pdu_checksum(total_length: u16, protocol: u16, label: &[u8], pdu: &[u8]) -> u32 {
    let mut hasher = begin_checksum(total_length, protocol, label);
    hasher.update(pdu);
    hasher.finalize()
}

/// Writes `checksum` big-endian into the first four bytes of `trailer`.
pub fn write_checksum(trailer: &mut [u8], checksum: u32) {
    BigEndian::write_u32(&mut trailer[..CHECKSUM_LENGTH], checksum);
}

/// Reads a big-endian checksum from the first four bytes of `trailer`.
pub fn read_checksum(trailer: &[u8]) -> Option<u32> {
    if trailer.len() < CHECKSUM_LENGTH {
        return None;
    }
    Some(BigEndian::read_u32(trailer))
}
