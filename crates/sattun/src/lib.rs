#![warn(missing_docs)]

//! Sattun: a TAP ⇄ GSE ⇄ UDP bridge.
//!
//! Two processes make a tunnel. `satencap` reads Ethernet frames from a TAP
//! interface, encapsulates them into GSE packets and sends them as UDP datagrams;
//! `satdecap` receives those datagrams, reassembles the frames and writes them to
//! its own TAP interface.
//!
//! This crate re-exports what is needed to embed either direction:
//!
//! - Configuration (`Config`, `Direction`)
//! - Runners and their outcome (`run_encap`, `run_decap`, `BridgeError`)
//! - The GSE engine (`Encapsulator`, `Decapsulator`)
//!
//! Example
//! ```no_run
//! use sattun::prelude::*;
//!
//! let config = Config {
//!     tap_interface: "tap0".to_string(),
//!     local: "10.0.0.1:5000".parse().unwrap(),
//!     remote: "10.0.0.2:5000".parse().unwrap(),
//!     ..Config::default()
//! };
//! if let Err(err) = run_encap(&config) {
//!     std::process::exit(err.exit_code());
//! }
//! ```

/// Command line definitions shared by the binaries.
pub mod cli;

// Core configuration and fragments
pub use sattun_core::{
    Config, Direction, FragmentAllocator, Liveness, LoopState, PduLabel, VirtualFragment,
};
// Bridge: runners, pipelines and counters
pub use sattun_bridge::{
    run_decap, run_encap, BridgeError, EventLoop, ReceivePipeline, ReceiveStats, SendPipeline,
    SendStats,
};
// I/O: endpoints
pub use sattun_io::{TapDevice, TapMode, UdpEndpoint};
// Protocol: the GSE engine
pub use sattun_protocol::{Decapsulator, DecodeStatus, Encapsulator, FrameDecoder, PduEncoder};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        run_decap, run_encap, BridgeError, Config, Decapsulator, Direction, Encapsulator,
        ReceiveStats, SendStats,
    };
}
