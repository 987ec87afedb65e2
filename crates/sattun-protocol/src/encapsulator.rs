//! Encapsulation and fragmentation of PDUs into GSE packets.
//!
//! PDUs wait in one FIFO per QoS class. Each frame request looks at the PDU at the
//! head of the FIFO and emits either a complete packet, when the whole PDU fits the
//! desired length, or the next fragment of it. A complete packet is built in place
//! in the PDU fragment's reserved head room; fragments are copied into new frames.
//!
//! The fragment id of a fragmented PDU is its QoS class, so at most one fragmented
//! PDU per QoS is in flight at a time.

use std::{cmp, collections::VecDeque};

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use sattun_core::{
    constants::{FIXED_HEADER_LENGTH, MAX_HEADER_LENGTH, MAX_PACKET_LENGTH, MAX_TRAILER_LENGTH},
    FragmentAllocator, PduLabel, VirtualFragment,
};

use crate::{
    checksum::{pdu_checksum, write_checksum},
    engine::{EncapError, FrameRequest, PduEncoder, SetupError},
    header::{FixedHeader, LabelType, PacketKind, PROTOCOL_LENGTH},
};

/// Largest PDU whose total length (protocol type, label and PDU) fits 16 bits.
pub const MAX_ENCAP_PDU_LENGTH: usize =
    u16::MAX as usize - PROTOCOL_LENGTH - PduLabel::LENGTH;

/// Label type of every PDU this encapsulator emits.
const LABEL_TYPE: LabelType = LabelType::SixBytes;

struct PendingPdu {
    pdu: VirtualFragment,
    label: PduLabel,
    protocol: u16,
    /// PDU bytes already emitted in fragments.
    sent: usize,
    /// CRC-32 of the PDU, set once the first fragment is emitted.
    checksum: u32,
}

impl PendingPdu {
    fn total_length(&self) -> u16 {
        (PROTOCOL_LENGTH + PduLabel::LENGTH + self.pdu.len()) as u16
    }
}

/// GSE encapsulator with one bounded FIFO per QoS class.
pub struct Encapsulator {
    fifos: Vec<VecDeque<PendingPdu>>,
    max_fragmentation: usize,
    allocator: FragmentAllocator,
}

impl Encapsulator {
    /// Creates an encapsulator for `qos_count` QoS classes, each queueing up to
    /// `max_fragmentation` PDUs. Frames are allocated from `allocator`.
    pub fn new(
        qos_count: u8,
        max_fragmentation: usize,
        allocator: FragmentAllocator,
    ) -> Result<Self, SetupError> {
        if qos_count == 0 {
            return Err(SetupError::NoQosClass);
        }
        if max_fragmentation == 0 {
            return Err(SetupError::EmptyFifo);
        }
        Ok(Self {
            fifos: (0..qos_count).map(|_| VecDeque::with_capacity(max_fragmentation)).collect(),
            max_fragmentation,
            allocator,
        })
    }

    /// Number of PDUs queued on `qos`.
    pub fn pending(&self, qos: u8) -> usize {
        self.fifos.get(usize::from(qos)).map_or(0, VecDeque::len)
    }

    fn qos_count(&self) -> u8 {
        self.fifos.len() as u8
    }

    fn fifo(&mut self, qos: u8) -> Result<&mut VecDeque<PendingPdu>, EncapError> {
        let count = self.qos_count();
        self.fifos.get_mut(usize::from(qos)).ok_or(EncapError::InvalidQos { qos, count })
    }

    /// Moves `pdu` into a fragment with the standard reservation if it lacks head room.
    fn with_reserve(&self, pdu: VirtualFragment) -> VirtualFragment {
        if pdu.head_room() >= MAX_HEADER_LENGTH {
            return pdu;
        }
        let mut copy = self.allocator.allocate(pdu.len(), MAX_HEADER_LENGTH, MAX_TRAILER_LENGTH);
        copy.data_mut().copy_from_slice(pdu.data());
        copy
    }

    /// Allocates a frame of `length` bytes able to grow up to `desired_length`.
    fn new_frame(&self, length: usize, desired_length: usize) -> VirtualFragment {
        self.allocator.allocate(length, 0, desired_length.saturating_sub(length))
    }

    fn complete_packet(
        &self,
        pending: PendingPdu,
        desired_length: usize,
    ) -> Result<VirtualFragment, EncapError> {
        let header_length = PacketKind::Complete.header_length(LABEL_TYPE);
        let frame_length = header_length + pending.pdu.len();
        let padding = desired_length.saturating_sub(frame_length);

        let in_place =
            pending.pdu.head_room() >= header_length && pending.pdu.tail_room() >= padding;
        let mut frame = if in_place {
            pending.pdu
        } else {
            let mut frame = self.new_frame(frame_length, desired_length);
            frame.data_mut()[header_length..].copy_from_slice(pending.pdu.data());
            frame.advance(header_length)?;
            frame
        };

        let header = frame.prepend(header_length)?;
        FixedHeader::new(PacketKind::Complete, LABEL_TYPE, frame_length - FIXED_HEADER_LENGTH)
            .write(header);
        BigEndian::write_u16(&mut header[2..4], pending.protocol);
        header[4..header_length].copy_from_slice(&pending.label.to_bytes());

        trace!("Complete packet of {} bytes for label {}", frame.len(), pending.label);
        Ok(frame)
    }

    fn first_fragment(
        &self,
        pending: &mut PendingPdu,
        limit: usize,
        desired_length: usize,
        qos: u8,
    ) -> Result<VirtualFragment, EncapError> {
        let header_length = PacketKind::First.header_length(LABEL_TYPE);
        if limit <= header_length {
            return Err(EncapError::LengthTooSmall { desired: limit, minimum: header_length + 1 });
        }
        let data_length = cmp::min(limit - header_length, pending.pdu.len() - 1);
        let frame_length = header_length + data_length;
        let total_length = pending.total_length();
        let label = pending.label.to_bytes();

        let mut frame = self.new_frame(frame_length, desired_length);
        let out = frame.data_mut();
        FixedHeader::new(PacketKind::First, LABEL_TYPE, frame_length - FIXED_HEADER_LENGTH)
            .write(out);
        out[2] = qos;
        BigEndian::write_u16(&mut out[3..5], total_length);
        BigEndian::write_u16(&mut out[5..7], pending.protocol);
        out[7..header_length].copy_from_slice(&label);
        out[header_length..].copy_from_slice(&pending.pdu.data()[..data_length]);

        pending.checksum = pdu_checksum(total_length, pending.protocol, &label, pending.pdu.data());
        pending.sent = data_length;

        trace!(
            "First fragment of {} bytes for label {} ({}/{} PDU bytes)",
            frame_length,
            pending.label,
            pending.sent,
            pending.pdu.len()
        );
        Ok(frame)
    }

    /// Builds the next intermediate or last fragment. Returns true with the last one.
    fn next_fragment(
        &self,
        pending: &mut PendingPdu,
        limit: usize,
        desired_length: usize,
        qos: u8,
    ) -> Result<(VirtualFragment, bool), EncapError> {
        let header_length = PacketKind::Last.header_length(LABEL_TYPE);
        let remaining = pending.pdu.len() - pending.sent;
        let last_length = header_length + remaining + PacketKind::Last.trailer_length();

        let (kind, data_length, frame_length) = if last_length <= limit {
            (PacketKind::Last, remaining, last_length)
        } else {
            // Keep at least one byte for the last fragment.
            let data_length = cmp::min(limit.saturating_sub(header_length), remaining - 1);
            if data_length == 0 {
                let minimum = if remaining > 1 { header_length + 1 } else { last_length };
                return Err(EncapError::LengthTooSmall { desired: limit, minimum });
            }
            (PacketKind::Intermediate, data_length, header_length + data_length)
        };

        let mut frame = self.new_frame(frame_length, desired_length);
        let out = frame.data_mut();
        FixedHeader::new(kind, LabelType::Reuse, frame_length - FIXED_HEADER_LENGTH).write(out);
        out[2] = qos;
        let data_end = header_length + data_length;
        out[header_length..data_end]
            .copy_from_slice(&pending.pdu.data()[pending.sent..pending.sent + data_length]);
        if kind == PacketKind::Last {
            write_checksum(&mut out[data_end..], pending.checksum);
        }
        pending.sent += data_length;

        trace!(
            "{:?} fragment of {} bytes for label {} ({}/{} PDU bytes)",
            kind,
            frame_length,
            pending.label,
            pending.sent,
            pending.pdu.len()
        );
        Ok((frame, kind == PacketKind::Last))
    }
}

impl PduEncoder for Encapsulator {
    fn receive_pdu(
        &mut self,
        pdu: VirtualFragment,
        label: PduLabel,
        protocol: u16,
        qos: u8,
    ) -> Result<(), EncapError> {
        if pdu.is_empty() {
            return Err(EncapError::EmptyPdu);
        }
        if pdu.len() > MAX_ENCAP_PDU_LENGTH {
            return Err(EncapError::PduTooLong { length: pdu.len(), maximum: MAX_ENCAP_PDU_LENGTH });
        }
        let max_fragmentation = self.max_fragmentation;
        if self.fifo(qos)?.len() >= max_fragmentation {
            return Err(EncapError::FifoFull { qos });
        }

        let pdu = self.with_reserve(pdu);
        trace!("Queued PDU of {} bytes with label {} on QoS {}", pdu.len(), label, qos);
        self.fifo(qos)?.push_back(PendingPdu { pdu, label, protocol, sent: 0, checksum: 0 });
        Ok(())
    }

    fn next_frame(&mut self, desired_length: usize, qos: u8) -> FrameRequest {
        let limit = if desired_length == 0 || desired_length > MAX_PACKET_LENGTH {
            MAX_PACKET_LENGTH
        } else {
            desired_length
        };
        let mut fifo = match self.fifo(qos) {
            Ok(fifo) => std::mem::take(fifo),
            Err(err) => return FrameRequest::Failed(err),
        };

        let result = match fifo.front_mut() {
            None => Ok(None),
            Some(pending) if pending.sent == 0 => {
                let complete_length =
                    PacketKind::Complete.header_length(LABEL_TYPE) + pending.pdu.len();
                if complete_length <= limit {
                    match fifo.pop_front() {
                        Some(pending) => self.complete_packet(pending, desired_length).map(Some),
                        None => Ok(None),
                    }
                } else {
                    self.first_fragment(pending, limit, desired_length, qos).map(Some)
                }
            }
            Some(pending) => match self.next_fragment(pending, limit, desired_length, qos) {
                Ok((frame, last)) => {
                    if last {
                        fifo.pop_front();
                    }
                    Ok(Some(frame))
                }
                Err(err) => Err(err),
            },
        };
        self.fifos[usize::from(qos)] = fifo;

        match result {
            Ok(Some(frame)) => FrameRequest::Ready(frame),
            Ok(None) => FrameRequest::Exhausted,
            Err(err) => FrameRequest::Failed(err),
        }
    }

    fn abandon(&mut self, qos: u8) -> bool {
        match self.fifos.get_mut(usize::from(qos)).and_then(VecDeque::pop_front) {
            Some(pending) => {
                trace!("Abandoned PDU with label {} after {} bytes", pending.label, pending.sent);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encapsulator(allocator: &FragmentAllocator) -> Encapsulator {
        Encapsulator::new(1, 4, allocator.clone()).unwrap()
    }

    fn pdu(allocator: &FragmentAllocator, length: usize) -> VirtualFragment {
        let mut pdu = allocator.pdu_fragment();
        pdu.set_len(length).unwrap();
        for (i, byte) in pdu.data_mut().iter_mut().enumerate() {
            *byte = i as u8;
        }
        pdu
    }

    fn ready(request: FrameRequest) -> VirtualFragment {
        match request {
            FrameRequest::Ready(frame) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn test_setup_validation() {
        let allocator = FragmentAllocator::default();
        assert_eq!(Encapsulator::new(0, 1, allocator.clone()).err(), Some(SetupError::NoQosClass));
        assert_eq!(Encapsulator::new(1, 0, allocator).err(), Some(SetupError::EmptyFifo));
    }

    #[test]
    fn test_small_pdu_is_one_complete_packet() {
        let allocator = FragmentAllocator::default();
        let mut encap = encapsulator(&allocator);
        encap.receive_pdu(pdu(&allocator, 60), PduLabel::new(1), 9029, 0).unwrap();

        let frame = ready(encap.next_frame(1500, 0));
        assert_eq!(frame.len(), 70);
        let header = FixedHeader::parse(frame.data()).unwrap();
        assert_eq!(header.kind, PacketKind::Complete);
        assert_eq!(header.gse_length, 68);
        assert_eq!(&frame.data()[2..4], &9029u16.to_be_bytes());
        assert_eq!(&frame.data()[4..10], &[0, 0, 0, 0, 0, 1]);
        assert_eq!(frame.data()[10], 0);
        assert!(frame.tail_room() >= 1500 - 70);

        assert!(matches!(encap.next_frame(1500, 0), FrameRequest::Exhausted));
    }

    #[test]
    fn test_pdu_without_head_room_is_copied() {
        let allocator = FragmentAllocator::default();
        let mut encap = encapsulator(&allocator);
        let bare = VirtualFragment::from_vec(vec![0xAB; 20]);
        encap.receive_pdu(bare, PduLabel::new(2), 9029, 0).unwrap();

        let frame = ready(encap.next_frame(0, 0));
        assert_eq!(frame.len(), 30);
        assert_eq!(&frame.data()[10..], &[0xAB; 20]);
    }

    #[test]
    fn test_fragments_respect_desired_length() {
        let allocator = FragmentAllocator::default();
        let mut encap = encapsulator(&allocator);
        encap.receive_pdu(pdu(&allocator, 300), PduLabel::new(3), 9029, 0).unwrap();

        let mut kinds = Vec::new();
        let mut carried = 0;
        loop {
            match encap.next_frame(100, 0) {
                FrameRequest::Ready(frame) => {
                    assert!(frame.len() <= 100);
                    let header = FixedHeader::parse(frame.data()).unwrap();
                    assert_eq!(header.packet_length(), frame.len());
                    carried += frame.len()
                        - header.kind.header_length(header.label_type)
                        - header.kind.trailer_length();
                    kinds.push(header.kind);
                }
                FrameRequest::Exhausted => break,
                FrameRequest::Failed(err) => panic!("unexpected failure: {}", err),
            }
        }

        assert_eq!(carried, 300);
        assert_eq!(kinds.first(), Some(&PacketKind::First));
        assert_eq!(kinds.last(), Some(&PacketKind::Last));
        assert!(kinds[1..kinds.len() - 1].iter().all(|kind| *kind == PacketKind::Intermediate));
    }

    #[test]
    fn test_large_pdu_fragments_in_variable_mode() {
        let allocator = FragmentAllocator::default();
        let mut encap = encapsulator(&allocator);
        encap.receive_pdu(pdu(&allocator, 5000), PduLabel::new(4), 9029, 0).unwrap();

        let first = ready(encap.next_frame(5000 + 13, 0));
        assert_eq!(first.len(), MAX_PACKET_LENGTH);
        let last = ready(encap.next_frame(5000 + 13, 0));
        assert_eq!(FixedHeader::parse(last.data()).unwrap().kind, PacketKind::Last);
        assert!(matches!(encap.next_frame(0, 0), FrameRequest::Exhausted));
    }

    #[test]
    fn test_desired_length_too_small() {
        let allocator = FragmentAllocator::default();
        let mut encap = encapsulator(&allocator);
        encap.receive_pdu(pdu(&allocator, 100), PduLabel::new(5), 9029, 0).unwrap();

        match encap.next_frame(13, 0) {
            FrameRequest::Failed(EncapError::LengthTooSmall { desired: 13, minimum: 14 }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(encap.pending(0), 1);
        assert!(encap.abandon(0));
        assert!(!encap.abandon(0));
        assert!(matches!(encap.next_frame(0, 0), FrameRequest::Exhausted));
    }

    #[test]
    fn test_receive_pdu_rejections() {
        let allocator = FragmentAllocator::default();
        let mut encap = Encapsulator::new(1, 1, allocator.clone()).unwrap();

        assert_eq!(
            encap.receive_pdu(pdu(&allocator, 0), PduLabel::new(1), 9029, 0),
            Err(EncapError::EmptyPdu)
        );
        assert_eq!(
            encap.receive_pdu(pdu(&allocator, 10), PduLabel::new(1), 9029, 1),
            Err(EncapError::InvalidQos { qos: 1, count: 1 })
        );
        assert!(matches!(
            encap.receive_pdu(pdu(&allocator, MAX_ENCAP_PDU_LENGTH + 1), PduLabel::new(1), 9029, 0),
            Err(EncapError::PduTooLong { .. })
        ));

        encap.receive_pdu(pdu(&allocator, 10), PduLabel::new(1), 9029, 0).unwrap();
        assert_eq!(
            encap.receive_pdu(pdu(&allocator, 10), PduLabel::new(2), 9029, 0),
            Err(EncapError::FifoFull { qos: 0 })
        );

        drop(encap);
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_unknown_qos_frame_request() {
        let allocator = FragmentAllocator::default();
        let mut encap = encapsulator(&allocator);
        assert!(matches!(
            encap.next_frame(100, 3),
            FrameRequest::Failed(EncapError::InvalidQos { qos: 3, count: 1 })
        ));
    }
}
