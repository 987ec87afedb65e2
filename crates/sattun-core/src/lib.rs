#![warn(missing_docs)]

//! sattun-core: foundational types shared by every layer of the bridge.
//!
//! This crate provides the minimal set of core utilities used by both directions:
//! - Configuration types and validation
//! - Error handling
//! - Protocol constants (buffer reservation policy)
//! - Virtual fragments and the fragment allocator
//! - The process liveness flag and PDU labels
//!
//! Protocol-specific logic lives in specialized crates:
//! - `sattun-protocol`: GSE header codec, encapsulator and decapsulator
//! - `sattun-io`: TAP device, UDP endpoint, readiness polling and signals
//! - `sattun-bridge`: event loop and the send/receive pipelines

/// Protocol constants shared across layers.
pub mod constants {
    /// Length of the fixed GSE header (flags, label type and GSE length).
    pub const FIXED_HEADER_LENGTH: usize = 2;
    /// Largest header any GSE packet can carry (first fragment with a 6-byte label).
    ///
    /// fixed (2) + fragment id (1) + total length (2) + protocol type (2) + label (6)
    pub const MAX_HEADER_LENGTH: usize = 13;
    /// Largest trailer any GSE packet can carry (CRC-32 of a last fragment).
    pub const MAX_TRAILER_LENGTH: usize = 4;
    /// Largest value of the 12-bit GSE length field.
    pub const MAX_GSE_LENGTH: usize = 0x0FFF;
    /// Largest GSE packet, fixed header included.
    pub const MAX_PACKET_LENGTH: usize = MAX_GSE_LENGTH + FIXED_HEADER_LENGTH;
    /// Largest PDU accepted for encapsulation.
    pub const MAX_PDU_LENGTH: usize = 65535;
    /// Smallest constant payload length usable by the send pipeline.
    pub const MIN_ENCAP_FRAME_SIZE: usize = 2 * MAX_HEADER_LENGTH + 2 * MAX_TRAILER_LENGTH;
    /// Largest UDP payload the receive buffer may be sized to.
    pub const MAX_DATAGRAM_LENGTH: usize = 65535;
    /// Number of QoS classes used by the bridge. QoS multiplexing is not supported.
    pub const QOS_COUNT: u8 = 1;
    /// QoS class every PDU is submitted on.
    pub const QOS: u8 = 0;
    /// Protocol type stamped on every encapsulated PDU.
    pub const PROTOCOL: u16 = 9029;
    /// Maximum number of PDUs queued per QoS in the encapsulator.
    pub const MAX_FRAGMENTATION: usize = 100;
    /// Consecutive frame request failures tolerated for one PDU.
    pub const MAX_FRAME_RETRIES: u32 = 5;
}

/// Configuration of one bridge process.
pub mod config;
/// Error types and results.
pub mod error;
/// Virtual fragments and the allocator that tracks them.
pub mod fragment;
/// PDU labels.
pub mod label;
/// Process-wide liveness flag.
pub mod liveness;

pub use config::{Config, Direction};
pub use error::{ErrorKind, Result};
pub use fragment::{FragmentAllocator, FragmentStats, VirtualFragment};
pub use label::PduLabel;
pub use liveness::{Liveness, LoopState};
