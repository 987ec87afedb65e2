use std::{
    default::Default,
    fmt,
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use crate::{
    constants::{MAX_DATAGRAM_LENGTH, MIN_ENCAP_FRAME_SIZE},
    error::{ConfigErrorKind, Result},
};

/// Default constant payload length of the send pipeline, in bytes.
pub const DEFAULT_PAYLOAD_LENGTH: usize = 1500;
/// Default size of the incoming packet buffer, in bytes.
pub const DEFAULT_BUFFER_LENGTH: usize = 8192;
/// Default readiness wait timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Longest interface name accepted by the kernel, terminating NUL excluded.
pub const MAX_INTERFACE_NAME_LENGTH: usize = 15;

/// Which half of the bridge a process runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// TAP → GSE → UDP.
    Encap,
    /// UDP → GSE → TAP.
    Decap,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encap => f.write_str("encap"),
            Direction::Decap => f.write_str("decap"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Immutable parameters of one bridge process.
///
/// Built once at startup, validated with [`Config::validate`], then shared read-only
/// with the pipelines for their whole lifetime.
pub struct Config {
    /// Name of the TAP interface packets are read from (encap) or written to (decap).
    pub tap_interface: String,
    /// Local address and port the UDP tunnel socket binds to.
    pub local: SocketAddrV4,
    /// The only remote address and port traffic is exchanged with.
    pub remote: SocketAddrV4,
    /// How long one readiness wait may block before the loop polls liveness again.
    pub read_timeout: Duration,
    /// Constant size of every outgoing UDP payload. 0 sends one variable-size frame per PDU.
    /// Only used by the encap direction.
    pub payload_len: usize,
    /// Max size of one incoming packet: TAP reads (encap) or UDP datagrams (decap).
    pub buffer_len: usize,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tap_interface: String::new(),
            local: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            remote: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            read_timeout: DEFAULT_READ_TIMEOUT,
            payload_len: DEFAULT_PAYLOAD_LENGTH,
            buffer_len: DEFAULT_BUFFER_LENGTH,
            socket_recv_buffer_size: None, // Use system default
            socket_send_buffer_size: None, // Use system default
        }
    }
}

impl Config {
    /// Returns the constant payload length, or `None` in variable-length mode.
    pub fn fixed_payload_len(&self) -> Option<usize> {
        if self.payload_len == 0 {
            None
        } else {
            Some(self.payload_len)
        }
    }

    /// Checks every parameter the given direction depends on.
    pub fn validate(&self, direction: Direction) -> Result<()> {
        if self.tap_interface.is_empty() || self.tap_interface.len() > MAX_INTERFACE_NAME_LENGTH {
            return Err(ConfigErrorKind::TapInterface(self.tap_interface.clone()).into());
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigErrorKind::ReadTimeout.into());
        }
        if direction == Direction::Encap
            && self.payload_len != 0
            && self.payload_len < MIN_ENCAP_FRAME_SIZE
        {
            return Err(ConfigErrorKind::PayloadLength {
                minimum: MIN_ENCAP_FRAME_SIZE,
                actual: self.payload_len,
            }
            .into());
        }
        if self.buffer_len == 0 || self.buffer_len > MAX_DATAGRAM_LENGTH {
            return Err(ConfigErrorKind::BufferLength {
                maximum: MAX_DATAGRAM_LENGTH,
                actual: self.buffer_len,
            }
            .into());
        }
        Ok(())
    }
}
