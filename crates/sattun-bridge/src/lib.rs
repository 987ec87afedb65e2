#![warn(missing_docs)]

//! sattun-bridge: the event loop and the two pipelines of the bridge.
//!
//! - [`SendPipeline`] (encap): TAP packet → PDU → GSE frames → UDP datagrams
//! - [`ReceivePipeline`] (decap): UDP datagram → GSE frames → PDUs → TAP packets
//! - [`EventLoop`]: waits for readiness and runs one unit of pipeline work per wakeup
//! - [`runner`]: opens the endpoints, runs a direction and maps the outcome to an exit code

/// Receive pipeline (decap direction).
pub mod decap;
/// Send pipeline (encap direction).
pub mod encap;
/// Readiness-driven event loop.
pub mod event_loop;
/// Process-level setup, run and teardown of one direction.
pub mod runner;
/// Pipeline counters.
pub mod stats;

pub use decap::ReceivePipeline;
pub use encap::SendPipeline;
pub use event_loop::EventLoop;
pub use runner::{run_decap, run_encap, BridgeError};
pub use stats::{ReceiveStats, SendStats};
