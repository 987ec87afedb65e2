#![warn(missing_docs)]

//! sattun-io: the OS-facing endpoints of the bridge.
//!
//! - [`TapDevice`]: a TAP interface opened read-only (encap) or write-only (decap)
//! - [`UdpEndpoint`]: the UDP tunnel socket
//! - [`Poller`]: `pselect(2)` readiness wait that only lets termination signals in
//!   while blocked
//! - [`signals`]: termination signal installation and the stop probe

/// Readiness wait over one descriptor.
pub mod poller;
/// Termination signal handling.
pub mod signals;
/// TAP interface.
pub mod tap;
/// Transport abstraction for pluggable I/O.
pub mod transport;
/// UDP tunnel socket.
pub mod udp;

pub use poller::{Poller, Readiness, WaitOutcome};
pub use signals::SignalGuard;
pub use tap::{TapDevice, TapMode};
pub use transport::{DatagramSocket, PacketDevice};
pub use udp::UdpEndpoint;
