use std::{
    io,
    net::{SocketAddr, SocketAddrV4, UdpSocket},
    os::fd::{AsRawFd, RawFd},
};

use socket2::{Domain, Protocol, Socket as Socket2, Type};
use tracing::debug;

use sattun_core::Config;

use crate::transport::DatagramSocket;

/// Applies socket options from configuration to the tunnel socket.
fn apply_socket_options(socket: &Socket2, config: &Config) -> io::Result<()> {
    socket.set_reuse_address(true)?;

    if let Some(size) = config.socket_recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }

    if let Some(size) = config.socket_send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }

    Ok(())
}

/// The UDP socket carrying GSE frames to and from the remote bridge.
///
/// The socket is blocking: the event loop only reads it after a readiness wait.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    /// Binds a socket to `local`, with the buffer sizes of `config`.
    pub fn bind(local: SocketAddrV4, config: &Config) -> io::Result<Self> {
        let socket = Socket2::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        apply_socket_options(&socket, config)?;
        socket.bind(&SocketAddr::V4(local).into())?;

        let socket: UdpSocket = socket.into();
        debug!("UDP tunnel socket bound to {}", socket.local_addr()?);
        Ok(Self { socket })
    }
}

impl DatagramSocket for UdpEndpoint {
    fn send_datagram(&mut self, addr: &SocketAddrV4, payload: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(payload, addr)?;
        if sent != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("partial datagram sent ({} / {} bytes)", sent, payload.len()),
            ));
        }
        Ok(())
    }

    fn receive_datagram<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
        self.socket.recv_from(buffer).map(move |(recv_len, address)| (&buffer[..recv_len], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl AsRawFd for UdpEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
