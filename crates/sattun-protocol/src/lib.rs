#![warn(missing_docs)]

//! sattun-protocol: the GSE engine carrying PDUs between the TAP and UDP sides.
//!
//! The bridge pipelines only talk to the engine through the [`PduEncoder`] and
//! [`FrameDecoder`] traits; [`Encapsulator`] and [`Decapsulator`] are the in-crate
//! implementations.

/// CRC-32 of fragmented PDUs.
pub mod checksum;
/// Decapsulation and reassembly.
pub mod decapsulator;
/// Encapsulation and fragmentation.
pub mod encapsulator;
/// Engine traits, statuses and errors.
pub mod engine;
/// GSE packet header codec.
pub mod header;

pub use decapsulator::Decapsulator;
pub use encapsulator::Encapsulator;
pub use engine::{
    DecapError, DecodeStatus, Decoded, EncapError, FrameDecoder, FrameRequest, PduEncoder,
    SetupError,
};
pub use header::{FixedHeader, LabelType, PacketKind};
