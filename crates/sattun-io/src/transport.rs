//! Transport abstraction for pluggable I/O.
//!
//! The pipelines only see these traits, so the TAP device and the UDP socket can be
//! replaced by in-memory implementations.

use std::{
    io::Result,
    net::{SocketAddr, SocketAddrV4},
};

/// A device exchanging whole network packets, such as a TAP interface.
pub trait PacketDevice {
    /// Reads one packet into `buffer` and returns its length.
    fn read_packet(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Writes one packet. Either every byte is written or an error is returned.
    fn write_packet(&mut self, packet: &[u8]) -> Result<()>;
}

/// Low-level datagram socket abstraction.
pub trait DatagramSocket {
    /// Sends a single datagram. Either every byte is sent or an error is returned.
    fn send_datagram(&mut self, addr: &SocketAddrV4, payload: &[u8]) -> Result<()>;

    /// Receives a single datagram into `buffer`, returning its bytes and its source.
    fn receive_datagram<'a>(&mut self, buffer: &'a mut [u8]) -> Result<(&'a [u8], SocketAddr)>;

    /// Returns the address the socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;
}
