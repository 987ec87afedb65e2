//! The contract between the bridge pipelines and the GSE engine.
//!
//! Fragment ownership moves across this boundary: [`PduEncoder::receive_pdu`] consumes
//! the PDU fragment, frames and reassembled PDUs come back by value. Releasing any of
//! them is dropping it.

use sattun_core::{error::FragmentErrorKind, PduLabel, VirtualFragment};
use thiserror::Error;

use crate::header::LabelType;

/// Produces wire frames out of submitted PDUs.
pub trait PduEncoder {
    /// Queues `pdu` for encapsulation on `qos`. A rejected PDU is released.
    fn receive_pdu(
        &mut self,
        pdu: VirtualFragment,
        label: PduLabel,
        protocol: u16,
        qos: u8,
    ) -> Result<(), EncapError>;

    /// Builds the next frame of at most `desired_length` bytes for `qos`.
    ///
    /// A `desired_length` of 0 asks for the largest frame possible. A ready frame has
    /// enough tail room to be zero-padded up to `desired_length`.
    fn next_frame(&mut self, desired_length: usize, qos: u8) -> FrameRequest;

    /// Drops the PDU currently being emitted on `qos`. Returns true if there was one.
    fn abandon(&mut self, qos: u8) -> bool;
}

/// Reassembles PDUs out of wire frames.
pub trait FrameDecoder {
    /// Decodes the frame at the start of `frame`'s data window.
    fn decode(&mut self, frame: &VirtualFragment) -> Decoded;
}

/// Outcome of a frame request.
#[derive(Debug)]
pub enum FrameRequest {
    /// A frame is ready to be sent.
    Ready(VirtualFragment),
    /// No frame is pending on this QoS.
    Exhausted,
    /// The frame could not be built.
    Failed(EncapError),
}

/// Outcome of one decode call.
#[derive(Debug)]
pub struct Decoded {
    /// Bytes of the input window the call accounted for.
    pub consumed: usize,
    /// What the decoder made of them.
    pub status: DecodeStatus,
}

/// Status of one decode call.
#[derive(Debug)]
pub enum DecodeStatus {
    /// The frame was a fragment and its PDU is still incomplete.
    MoreNeeded,
    /// A whole PDU was reassembled.
    PduComplete {
        /// The reassembled PDU.
        pdu: VirtualFragment,
        /// How the label was carried.
        label_type: LabelType,
        /// Label of the PDU.
        label: PduLabel,
        /// Protocol type of the PDU.
        protocol: u16,
    },
    /// The rest of the input is padding.
    Padding,
    /// A first fragment replaced an incomplete PDU with the same fragment id.
    Overwritten,
    /// A length field is inconsistent. Any affected reassembly was dropped.
    InvalidLength,
    /// The frame could not be decoded.
    Failed(DecapError),
}

/// Engine construction errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SetupError {
    /// At least one QoS class is needed.
    #[error("the number of QoS classes must be strictly positive")]
    NoQosClass,
    /// The per-QoS FIFO must hold at least one PDU.
    #[error("the FIFO size must be strictly positive")]
    EmptyFifo,
}

/// Encapsulation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum EncapError {
    /// The QoS class is not configured.
    #[error("QoS {qos} is out of range (count {count})")]
    InvalidQos {
        /// Requested QoS.
        qos: u8,
        /// Configured number of QoS classes.
        count: u8,
    },
    /// Empty PDUs are not encapsulated.
    #[error("PDU is empty")]
    EmptyPdu,
    /// The PDU does not fit the total length field.
    #[error("PDU of {length} bytes exceeds the {maximum} bytes limit")]
    PduTooLong {
        /// PDU length.
        length: usize,
        /// Largest PDU accepted.
        maximum: usize,
    },
    /// The FIFO of the QoS class is full.
    #[error("FIFO of QoS {qos} is full")]
    FifoFull {
        /// QoS class.
        qos: u8,
    },
    /// The desired frame length cannot hold the next packet.
    #[error("desired length {desired} is too small, at least {minimum} bytes are needed")]
    LengthTooSmall {
        /// Desired length after clamping.
        desired: usize,
        /// Smallest length the next packet needs.
        minimum: usize,
    },
    /// A fragment window operation failed.
    #[error("fragment error: {0}")]
    Fragment(#[from] FragmentErrorKind),
}

/// Decapsulation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DecapError {
    /// A non-first fragment arrived for a fragment id with no reassembly in progress.
    #[error("no reassembly in progress for fragment id {frag_id}")]
    NoContext {
        /// Fragment id.
        frag_id: u8,
    },
    /// The fragment id is not one of the configured QoS classes.
    #[error("fragment id {frag_id} is out of range (count {count})")]
    InvalidFragId {
        /// Fragment id.
        frag_id: u8,
        /// Configured number of QoS classes.
        count: u8,
    },
    /// The reassembled PDU does not match the CRC-32 of its last fragment.
    #[error("CRC-32 mismatch: received {received:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Checksum carried by the last fragment.
        received: u32,
        /// Checksum of the reassembled data.
        computed: u32,
    },
    /// A label-reuse packet arrived before any label was seen.
    #[error("label reuse without a previous label")]
    NoPreviousLabel,
    /// A fragment window operation failed.
    #[error("fragment error: {0}")]
    Fragment(#[from] FragmentErrorKind),
}

impl DecodeStatus {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            DecodeStatus::MoreNeeded => "more-needed",
            DecodeStatus::PduComplete { .. } => "pdu-complete",
            DecodeStatus::Padding => "padding",
            DecodeStatus::Overwritten => "overwritten",
            DecodeStatus::InvalidLength => "invalid-length",
            DecodeStatus::Failed(_) => "failed",
        }
    }
}
