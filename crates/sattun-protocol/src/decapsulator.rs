//! Decapsulation of GSE packets and reassembly of fragmented PDUs.
//!
//! Each call decodes the packet at the start of the input window and reports how
//! many bytes it accounted for, so a caller can walk a buffer holding several
//! concatenated packets. Fragments are reassembled in one context per fragment id.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher;
use tracing::{debug, trace};

use sattun_core::{constants::FIXED_HEADER_LENGTH, FragmentAllocator, PduLabel, VirtualFragment};

use crate::{
    checksum::{begin_checksum, read_checksum},
    engine::{DecapError, DecodeStatus, Decoded, FrameDecoder, SetupError},
    header::{is_padding, FixedHeader, LabelType, PacketKind, PROTOCOL_LENGTH},
};

/// A PDU being reassembled.
struct Reassembly {
    pdu: VirtualFragment,
    expected: usize,
    label_type: LabelType,
    label: PduLabel,
    protocol: u16,
    hasher: Hasher,
}

/// GSE decapsulator.
pub struct Decapsulator {
    qos_count: u8,
    contexts: HashMap<u8, Reassembly>,
    last_label: Option<(LabelType, PduLabel)>,
    allocator: FragmentAllocator,
}

/// Fields following the fixed header of a complete packet or first fragment.
struct StartFields {
    label_type: LabelType,
    label: PduLabel,
    label_bytes: [u8; PduLabel::LENGTH],
    label_length: usize,
}

impl Decapsulator {
    /// Creates a decapsulator accepting fragment ids below `qos_count`.
    /// Reassembled PDUs are allocated from `allocator`.
    pub fn new(qos_count: u8, allocator: FragmentAllocator) -> Result<Self, SetupError> {
        if qos_count == 0 {
            return Err(SetupError::NoQosClass);
        }
        Ok(Self { qos_count, contexts: HashMap::new(), last_label: None, allocator })
    }

    /// Number of PDUs currently being reassembled.
    pub fn in_progress(&self) -> usize {
        self.contexts.len()
    }

    fn read_label(&self, label_type: LabelType, bytes: &[u8]) -> Result<StartFields, DecapError> {
        let label_length = label_type.label_length();
        let mut label_bytes = [0u8; PduLabel::LENGTH];
        label_bytes[PduLabel::LENGTH - label_length..].copy_from_slice(&bytes[..label_length]);

        let (label_type, label) = match label_type {
            LabelType::Reuse => self.last_label.ok_or(DecapError::NoPreviousLabel)?,
            other => (other, PduLabel::from_bytes(label_bytes)),
        };
        Ok(StartFields { label_type, label, label_bytes, label_length })
    }

    fn check_frag_id(&self, frag_id: u8) -> Result<(), DecapError> {
        if frag_id >= self.qos_count {
            return Err(DecapError::InvalidFragId { frag_id, count: self.qos_count });
        }
        Ok(())
    }

    fn complete_packet(&mut self, header: &FixedHeader, body: &[u8]) -> DecodeStatus {
        let label_length = header.label_type.label_length();
        if body.len() < PROTOCOL_LENGTH + label_length {
            return DecodeStatus::InvalidLength;
        }
        let protocol = BigEndian::read_u16(body);
        let fields = match self.read_label(header.label_type, &body[PROTOCOL_LENGTH..]) {
            Ok(fields) => fields,
            Err(err) => return DecodeStatus::Failed(err),
        };
        self.last_label = Some((fields.label_type, fields.label));

        let pdu = self.allocator.copy_from(&body[PROTOCOL_LENGTH + label_length..]);
        trace!("Complete packet carrying {} PDU bytes for label {}", pdu.len(), fields.label);
        let (label_type, label) = (fields.label_type, fields.label);
        DecodeStatus::PduComplete { pdu, label_type, label, protocol }
    }

    fn first_fragment(&mut self, header: &FixedHeader, body: &[u8]) -> DecodeStatus {
        // fragment id, total length, protocol type
        const FIELDS_LENGTH: usize = 5;
        let label_length = header.label_type.label_length();
        if body.len() < FIELDS_LENGTH + label_length {
            return DecodeStatus::InvalidLength;
        }
        let frag_id = body[0];
        if let Err(err) = self.check_frag_id(frag_id) {
            return DecodeStatus::Failed(err);
        }
        let total_length = BigEndian::read_u16(&body[1..3]);
        let protocol = BigEndian::read_u16(&body[3..5]);
        let fields = match self.read_label(header.label_type, &body[FIELDS_LENGTH..]) {
            Ok(fields) => fields,
            Err(err) => return DecodeStatus::Failed(err),
        };

        let data = &body[FIELDS_LENGTH + label_length..];
        let expected = match usize::from(total_length).checked_sub(PROTOCOL_LENGTH + label_length) {
            Some(expected) if data.len() <= expected => expected,
            _ => {
                debug!(
                    "First fragment carries {} bytes but announces a total length of {}",
                    data.len(),
                    total_length
                );
                return self.drop_context(frag_id);
            }
        };

        let wire_label = &fields.label_bytes[PduLabel::LENGTH - fields.label_length..];
        let mut hasher = begin_checksum(total_length, protocol, wire_label);
        hasher.update(data);
        let mut pdu = self.allocator.allocate(0, 0, expected);
        if let Err(err) = pdu.append(data.len()).map(|out| out.copy_from_slice(data)) {
            return DecodeStatus::Failed(err.into());
        }
        self.last_label = Some((fields.label_type, fields.label));

        let context = Reassembly {
            pdu,
            expected,
            label_type: fields.label_type,
            label: fields.label,
            protocol,
            hasher,
        };
        trace!("First fragment for label {}: {}/{} PDU bytes", fields.label, data.len(), expected);
        match self.contexts.insert(frag_id, context) {
            Some(previous) => {
                debug!(
                    "Fragment id {} reused: dropping incomplete PDU with label {} ({}/{} bytes)",
                    frag_id,
                    previous.label,
                    previous.pdu.len(),
                    previous.expected
                );
                DecodeStatus::Overwritten
            }
            None => DecodeStatus::MoreNeeded,
        }
    }

    fn next_fragment(&mut self, header: &FixedHeader, body: &[u8]) -> DecodeStatus {
        let trailer_length = header.kind.trailer_length();
        if body.len() < 1 + trailer_length {
            return DecodeStatus::InvalidLength;
        }
        let frag_id = body[0];
        if let Err(err) = self.check_frag_id(frag_id) {
            return DecodeStatus::Failed(err);
        }
        let data = &body[1..body.len() - trailer_length];

        let context = match self.contexts.get_mut(&frag_id) {
            Some(context) => context,
            None => return DecodeStatus::Failed(DecapError::NoContext { frag_id }),
        };
        let received = context.pdu.len() + data.len();
        let length_ok = match header.kind {
            PacketKind::Last => received == context.expected,
            _ => received <= context.expected,
        };
        if !length_ok {
            debug!(
                "{:?} fragment of {} bytes does not fit the {}/{} bytes reassembled for label {}",
                header.kind,
                data.len(),
                context.pdu.len(),
                context.expected,
                context.label
            );
            return self.drop_context(frag_id);
        }

        context.hasher.update(data);
        if let Err(err) = context.pdu.append(data.len()).map(|out| out.copy_from_slice(data)) {
            self.contexts.remove(&frag_id);
            return DecodeStatus::Failed(err.into());
        }
        if header.kind == PacketKind::Intermediate {
            trace!(
                "Intermediate fragment for label {}: {}/{} PDU bytes",
                context.label,
                received,
                context.expected
            );
            return DecodeStatus::MoreNeeded;
        }

        let context = match self.contexts.remove(&frag_id) {
            Some(context) => context,
            None => return DecodeStatus::Failed(DecapError::NoContext { frag_id }),
        };
        let computed = context.hasher.finalize();
        match read_checksum(&body[body.len() - trailer_length..]) {
            Some(received) if received == computed => {
                trace!(
                    "Last fragment for label {}: {} PDU bytes complete",
                    context.label, context.expected
                );
                DecodeStatus::PduComplete {
                    pdu: context.pdu,
                    label_type: context.label_type,
                    label: context.label,
                    protocol: context.protocol,
                }
            }
            Some(received) => DecodeStatus::Failed(DecapError::CrcMismatch { received, computed }),
            None => DecodeStatus::InvalidLength,
        }
    }

    fn drop_context(&mut self, frag_id: u8) -> DecodeStatus {
        self.contexts.remove(&frag_id);
        DecodeStatus::InvalidLength
    }
}

impl FrameDecoder for Decapsulator {
    fn decode(&mut self, frame: &VirtualFragment) -> Decoded {
        let bytes = frame.data();
        if is_padding(bytes) {
            return Decoded { consumed: bytes.len(), status: DecodeStatus::Padding };
        }
        let header = match FixedHeader::parse(bytes) {
            Some(header) if header.packet_length() <= bytes.len() => header,
            _ => {
                debug!("Truncated GSE packet: {} bytes left in the buffer", bytes.len());
                return Decoded { consumed: bytes.len(), status: DecodeStatus::InvalidLength };
            }
        };
        let consumed = header.packet_length();
        let body = &bytes[FIXED_HEADER_LENGTH..consumed];

        let status = match header.kind {
            PacketKind::Complete => self.complete_packet(&header, body),
            PacketKind::First => self.first_fragment(&header, body),
            PacketKind::Intermediate | PacketKind::Last => self.next_fragment(&header, body),
        };
        Decoded { consumed, status }
    }
}
