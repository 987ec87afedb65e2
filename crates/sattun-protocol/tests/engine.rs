//! Integration tests for the GSE engine.
//!
//! These tests drive the encapsulator and the decapsulator together the way the
//! bridge pipelines do: frames leave one side and are walked back on the other.

use rand::{rngs::StdRng, Rng, SeedableRng};

use sattun_core::{constants::MAX_PACKET_LENGTH, FragmentAllocator, PduLabel, VirtualFragment};
use sattun_protocol::{
    DecodeStatus, Decapsulator, Encapsulator, FrameDecoder, FrameRequest, PduEncoder,
};

fn random_pdu(rng: &mut StdRng, length: usize) -> Vec<u8> {
    (0..length).map(|_| rng.gen()).collect()
}

fn encapsulate(
    allocator: &FragmentAllocator,
    pdu: &[u8],
    desired_length: usize,
) -> Vec<VirtualFragment> {
    let mut encap = Encapsulator::new(1, 100, allocator.clone()).unwrap();
    let mut fragment = allocator.pdu_fragment();
    fragment.set_len(pdu.len()).unwrap();
    fragment.data_mut().copy_from_slice(pdu);
    encap.receive_pdu(fragment, PduLabel::new(7), 9029, 0).unwrap();

    let mut frames = Vec::new();
    loop {
        match encap.next_frame(desired_length, 0) {
            FrameRequest::Ready(frame) => frames.push(frame),
            FrameRequest::Exhausted => return frames,
            FrameRequest::Failed(err) => panic!("frame request failed: {}", err),
        }
    }
}

/// Walks `datagram` like the receive pipeline and returns every reassembled PDU.
fn decapsulate(decap: &mut Decapsulator, mut datagram: VirtualFragment) -> Vec<Vec<u8>> {
    let mut pdus = Vec::new();
    while !datagram.is_empty() {
        let decoded = decap.decode(&datagram);
        assert!(decoded.consumed > 0);
        datagram.advance(decoded.consumed).unwrap();
        match decoded.status {
            DecodeStatus::PduComplete { pdu, .. } => pdus.push(pdu.data().to_vec()),
            DecodeStatus::MoreNeeded => {}
            DecodeStatus::Padding => break,
            other => panic!("unexpected decode status {:?}", other),
        }
    }
    pdus
}

#[test]
fn test_round_trip_across_sizes() {
    let mut rng = StdRng::seed_from_u64(0x5A7);
    let allocator = FragmentAllocator::default();
    let mut decap = Decapsulator::new(1, allocator.clone()).unwrap();

    for &desired_length in &[0, 34, 100, 1500, 9000] {
        for &length in &[1, 59, 60, 1490, 1491, 4087, 4088, 9000, 65527] {
            let pdu = random_pdu(&mut rng, length);
            let frames = encapsulate(&allocator, &pdu, desired_length);
            let limit = if desired_length == 0 {
                MAX_PACKET_LENGTH
            } else {
                desired_length.min(MAX_PACKET_LENGTH)
            };

            let mut output = Vec::new();
            for frame in frames {
                assert!(frame.len() <= limit);
                output.extend(decapsulate(&mut decap, frame));
            }
            assert_eq!(
                output,
                vec![pdu],
                "PDU of {} bytes at desired length {}",
                length, desired_length
            );
        }
    }

    drop(decap);
    assert_eq!(allocator.outstanding(), 0);
}

#[test]
fn test_concatenated_frames_in_one_buffer() {
    let mut rng = StdRng::seed_from_u64(11);
    let allocator = FragmentAllocator::default();
    let pdu = random_pdu(&mut rng, 700);

    let mut wire = Vec::new();
    for frame in encapsulate(&allocator, &pdu, 200) {
        wire.extend_from_slice(frame.data());
    }
    wire.extend_from_slice(&[0; 17]);

    let mut decap = Decapsulator::new(1, allocator.clone()).unwrap();
    let pdus = decapsulate(&mut decap, allocator.copy_from(&wire));
    assert_eq!(pdus, vec![pdu]);
}

#[test]
fn test_several_pdus_queue_in_order() {
    let allocator = FragmentAllocator::default();
    let mut encap = Encapsulator::new(1, 100, allocator.clone()).unwrap();
    for (index, length) in [10usize, 300, 20].into_iter().enumerate() {
        let fragment = allocator.copy_from(&vec![index as u8; length]);
        encap.receive_pdu(fragment, PduLabel::new(index as u64 + 1), 9029, 0).unwrap();
    }
    assert_eq!(encap.pending(0), 3);

    let mut decap = Decapsulator::new(1, allocator.clone()).unwrap();
    let mut labels = Vec::new();
    while let FrameRequest::Ready(frame) = encap.next_frame(128, 0) {
        if let DecodeStatus::PduComplete { pdu, label, .. } = decap.decode(&frame).status {
            assert!(pdu.data().iter().all(|byte| u64::from(*byte) + 1 == label.value()));
            labels.push(label.value());
        }
    }
    assert_eq!(labels, vec![1, 2, 3]);
}
