//! Readiness wait over a single descriptor.
//!
//! Termination signals stay blocked while the loop does useful work. [`Poller::wait`]
//! unblocks them atomically for the duration of `pselect(2)` only, so a signal that
//! arrived since the last liveness check interrupts the very next wait instead of
//! being lost.

use std::{io, mem, os::fd::RawFd, ptr, time::Duration};

use libc::{c_int, sigset_t};

/// Result of one readiness wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The descriptor is readable.
    Ready,
    /// The timeout elapsed without activity.
    Timeout,
    /// A signal interrupted the wait.
    Interrupted,
}

/// Something the event loop can block on.
pub trait Readiness {
    /// Blocks until readiness, timeout or signal delivery.
    fn wait(&mut self) -> io::Result<WaitOutcome>;
}

/// `pselect(2)` over one descriptor with a fixed timeout.
pub struct Poller {
    fd: RawFd,
    timeout: Duration,
    wait_mask: sigset_t,
}

impl Poller {
    /// Creates a poller on `fd`. During each wait the calling thread's current signal
    /// mask applies, minus the signals in `unblocked`.
    pub fn new(fd: RawFd, timeout: Duration, unblocked: &[c_int]) -> io::Result<Self> {
        if fd < 0 || fd as usize >= libc::FD_SETSIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("descriptor {} cannot be watched with pselect", fd),
            ));
        }

        let mut wait_mask: sigset_t = unsafe { mem::zeroed() };
        let ret = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), &mut wait_mask) };
        if ret != 0 {
            return Err(io::Error::from_raw_os_error(ret));
        }
        for &signal in unblocked {
            if unsafe { libc::sigdelset(&mut wait_mask, signal) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(Self { fd, timeout, wait_mask })
    }

    /// The wait timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Readiness for Poller {
    fn wait(&mut self) -> io::Result<WaitOutcome> {
        let mut readfds: libc::fd_set = unsafe { mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut readfds);
            libc::FD_SET(self.fd, &mut readfds);
        }
        let timeout = libc::timespec {
            tv_sec: self.timeout.as_secs() as libc::time_t,
            tv_nsec: self.timeout.subsec_nanos() as libc::c_long,
        };

        let ret = unsafe {
            libc::pselect(
                self.fd + 1,
                &mut readfds,
                ptr::null_mut(),
                ptr::null_mut(),
                &timeout,
                &self.wait_mask,
            )
        };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(WaitOutcome::Interrupted);
            }
            return Err(err);
        }
        if ret > 0 && unsafe { libc::FD_ISSET(self.fd, &readfds) } {
            return Ok(WaitOutcome::Ready);
        }
        Ok(WaitOutcome::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{Ipv4Addr, SocketAddr, SocketAddrV4},
        os::fd::AsRawFd,
        time::Instant,
    };

    use sattun_core::Config;

    use super::*;
    use crate::{transport::DatagramSocket, udp::UdpEndpoint};

    fn loopback_endpoint() -> (UdpEndpoint, SocketAddrV4) {
        let endpoint =
            UdpEndpoint::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), &Config::default())
                .unwrap();
        let addr = match endpoint.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            other => panic!("unexpected address {}", other),
        };
        (endpoint, addr)
    }

    #[test]
    fn test_timeout_without_activity() {
        let (endpoint, _) = loopback_endpoint();
        let mut poller = Poller::new(endpoint.as_raw_fd(), Duration::from_millis(20), &[]).unwrap();

        let start = Instant::now();
        assert_eq!(poller.wait().unwrap(), WaitOutcome::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_ready_after_datagram() {
        let (receiver, addr) = loopback_endpoint();
        let (mut sender, _) = loopback_endpoint();
        let mut poller = Poller::new(receiver.as_raw_fd(), Duration::from_secs(2), &[]).unwrap();

        sender.send_datagram(&addr, b"ready").unwrap();
        assert_eq!(poller.wait().unwrap(), WaitOutcome::Ready);
    }

    #[test]
    fn test_rejects_invalid_descriptor() {
        assert!(Poller::new(-1, Duration::from_millis(1), &[]).is_err());
        assert!(Poller::new(libc::FD_SETSIZE as RawFd, Duration::from_millis(1), &[]).is_err());
    }
}
