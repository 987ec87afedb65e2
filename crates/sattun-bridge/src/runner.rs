//! Setup, run and teardown of one bridge direction.
//!
//! Each runner validates the configuration, installs the termination signal
//! handling, opens the TAP interface and the UDP socket, builds the GSE engine and
//! runs the event loop until a termination signal or a fatal error. Every resource
//! is owned by a value on the runner's stack, so descriptors are closed exactly once
//! whichever way the runner returns.

use std::{io, net::SocketAddrV4, os::fd::AsRawFd};

use thiserror::Error;
use tracing::{debug, info};

use sattun_core::{
    constants::{MAX_FRAGMENTATION, PROTOCOL, QOS, QOS_COUNT},
    Config, Direction, ErrorKind, FragmentAllocator, LoopState,
};
use sattun_io::{
    signals::{self, TERMINATION_SIGNALS},
    Poller, SignalGuard, TapDevice, TapMode, UdpEndpoint,
};
use sattun_protocol::{Decapsulator, Encapsulator, SetupError};

use crate::{
    decap::ReceivePipeline,
    encap::SendPipeline,
    event_loop::EventLoop,
    stats::{ReceiveStats, SendStats},
};

/// Why a bridge direction did not shut down cleanly.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The configuration was rejected.
    #[error("{0}")]
    Config(ErrorKind),
    /// Signal handling or readiness polling could not be set up.
    #[error("{0}")]
    Setup(ErrorKind),
    /// The TAP interface could not be opened.
    #[error("failed to open TAP interface \"{interface}\": {source}")]
    Tap {
        /// Interface name.
        interface: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The UDP socket could not be bound.
    #[error("failed to bind UDP socket to {local}: {source}")]
    Udp {
        /// Local endpoint.
        local: SocketAddrV4,
        /// Underlying error.
        source: io::Error,
    },
    /// The GSE engine could not be created.
    #[error("failed to initialize the GSE engine: {0}")]
    Engine(#[from] SetupError),
    /// The processing loop stopped on an unrecoverable error.
    #[error("processing loop stopped on an unrecoverable error")]
    Loop,
}

impl BridgeError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) => -1,
            BridgeError::Setup(_)
            | BridgeError::Tap { .. }
            | BridgeError::Udp { .. }
            | BridgeError::Engine(_) => -2,
            BridgeError::Loop => -3,
        }
    }
}

fn log_config(direction: Direction, config: &Config) {
    debug!("{} configuration:", direction);
    debug!("  TAP interface: {}", config.tap_interface);
    debug!("  local endpoint: {}", config.local);
    debug!("  remote endpoint: {}", config.remote);
    debug!("  read timeout: {} ms", config.read_timeout.as_millis());
    if direction == Direction::Encap {
        match config.fixed_payload_len() {
            Some(len) => debug!("  payload length: {} bytes", len),
            None => debug!("  payload length: variable"),
        }
    }
    debug!("  buffer length: {} bytes", config.buffer_len);
    let system = || "system default".to_string();
    debug!(
        "  socket buffers: receive {}, send {}",
        config.socket_recv_buffer_size.map_or_else(system, |size| format!("{} bytes", size)),
        config.socket_send_buffer_size.map_or_else(system, |size| format!("{} bytes", size))
    );
    debug!("  protocol type: {}, QoS: {}, max fragmentation: {}", PROTOCOL, QOS, MAX_FRAGMENTATION);
}

fn open_tap(config: &Config, mode: TapMode) -> Result<TapDevice, BridgeError> {
    TapDevice::open(&config.tap_interface, mode)
        .map_err(|source| BridgeError::Tap { interface: config.tap_interface.clone(), source })
}

fn bind_udp(config: &Config) -> Result<UdpEndpoint, BridgeError> {
    UdpEndpoint::bind(config.local, config)
        .map_err(|source| BridgeError::Udp { local: config.local, source })
}

fn poller(fd: &impl AsRawFd, config: &Config) -> Result<Poller, BridgeError> {
    Poller::new(fd.as_raw_fd(), config.read_timeout, &TERMINATION_SIGNALS)
        .map_err(|err| BridgeError::Setup(ErrorKind::PollFailed(err)))
}

fn install_signals() -> Result<SignalGuard, BridgeError> {
    signals::install().map_err(|err| BridgeError::Setup(ErrorKind::SignalSetup(err)))
}

fn finish(state: LoopState) -> Result<(), BridgeError> {
    match state {
        LoopState::ErrorStop => Err(BridgeError::Loop),
        LoopState::StopRequested | LoopState::Running => Ok(()),
    }
}

/// Runs the encap direction: TAP → GSE → UDP.
pub fn run_encap(config: &Config) -> Result<SendStats, BridgeError> {
    config.validate(Direction::Encap).map_err(BridgeError::Config)?;
    log_config(Direction::Encap, config);

    let _signals = install_signals()?;
    let allocator = FragmentAllocator::default();
    let encoder = Encapsulator::new(QOS_COUNT, MAX_FRAGMENTATION, allocator.clone())?;
    let tap = open_tap(config, TapMode::ReadOnly)?;
    let socket = bind_udp(config)?;
    let poller = poller(&tap, config)?;

    let liveness = signals::liveness();
    let mut pipeline = SendPipeline::new(tap, socket, encoder, allocator, config, liveness.clone());
    info!(
        "Bridging TAP interface {} to {} via {}",
        config.tap_interface, config.remote, config.local
    );
    let state = EventLoop::new(poller, liveness).run(|| pipeline.on_tap_readable());

    let stats = *pipeline.stats();
    info!("Encapsulation stopped: {}", stats);
    finish(state).map(|()| stats)
}

/// Runs the decap direction: UDP → GSE → TAP.
pub fn run_decap(config: &Config) -> Result<ReceiveStats, BridgeError> {
    config.validate(Direction::Decap).map_err(BridgeError::Config)?;
    log_config(Direction::Decap, config);

    let _signals = install_signals()?;
    let allocator = FragmentAllocator::default();
    let decoder = Decapsulator::new(QOS_COUNT, allocator.clone())?;
    let tap = open_tap(config, TapMode::WriteOnly)?;
    let socket = bind_udp(config)?;
    let poller = poller(&socket, config)?;

    let liveness = signals::liveness();
    let mut pipeline =
        ReceivePipeline::new(socket, tap, decoder, allocator, config, liveness.clone());
    info!(
        "Bridging {} to TAP interface {} via {}",
        config.remote, config.tap_interface, config.local
    );
    let state = EventLoop::new(poller, liveness).run(|| pipeline.on_socket_readable());

    let stats = *pipeline.stats();
    info!("Decapsulation stopped: {}", stats);
    finish(state).map(|()| stats)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use sattun_core::error::ConfigErrorKind;

    #[test]
    fn test_exit_codes_are_distinct() {
        let config = BridgeError::Config(ConfigErrorKind::ReadTimeout.into());
        let init = BridgeError::Engine(SetupError::NoQosClass);
        let tap = BridgeError::Tap {
            interface: "tap0".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
        };
        assert_eq!(config.exit_code(), -1);
        assert_eq!(init.exit_code(), -2);
        assert_eq!(tap.exit_code(), -2);
        assert_eq!(BridgeError::Loop.exit_code(), -3);
    }

    #[test]
    fn test_invalid_config_fails_before_opening_anything() {
        let config = Config {
            tap_interface: "tap0".to_string(),
            read_timeout: Duration::ZERO,
            ..Config::default()
        };

        let err = run_encap(&config).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Config(ErrorKind::InvalidConfig(ConfigErrorKind::ReadTimeout))
        ));
        let err = run_decap(&config).unwrap_err();
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn test_error_messages() {
        let err = BridgeError::Tap {
            interface: "tap0".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
        };
        assert_eq!(err.to_string(), "failed to open TAP interface \"tap0\": no such device");
        assert_eq!(
            BridgeError::Config(ConfigErrorKind::ReadTimeout.into()).to_string(),
            "invalid configuration: invalid reading timeout value: must be strictly positive"
        );
    }
}
