//! Linux TAP interface.

use std::{
    ffi::CStr,
    fmt, io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

use libc::{
    c_char, c_short, c_void, ioctl, open, read, write, IFF_NO_PI, IFF_TAP, O_RDONLY, O_WRONLY,
};
use tracing::debug;

use sattun_core::config::MAX_INTERFACE_NAME_LENGTH;

use crate::transport::PacketDevice;

/// TUNSETIFF ioctl number.
const TUNSETIFF: libc::c_ulong = 0x400454ca;

/// Clone device every TAP interface is attached through.
const CLONE_DEVICE: &[u8] = b"/dev/net/tun\0";

/// Interface request structure.
#[repr(C)]
struct IfReq {
    ifr_name: [c_char; 16],
    ifr_flags: c_short,
    _pad: [u8; 22],
}

/// Direction the TAP interface is used in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapMode {
    /// Packets are only read from the interface.
    ReadOnly,
    /// Packets are only written to the interface.
    WriteOnly,
}

impl TapMode {
    fn open_flags(self) -> libc::c_int {
        match self {
            TapMode::ReadOnly => O_RDONLY,
            TapMode::WriteOnly => O_WRONLY,
        }
    }
}

/// An attached TAP interface, carrying Ethernet frames without packet information.
///
/// The descriptor is closed when the device is dropped.
pub struct TapDevice {
    fd: OwnedFd,
    name: String,
    mode: TapMode,
}

impl TapDevice {
    /// Attaches to the TAP interface `name`.
    pub fn open(name: &str, mode: TapMode) -> io::Result<Self> {
        if name.is_empty() || name.len() > MAX_INTERFACE_NAME_LENGTH || name.contains('\0') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid TAP interface name \"{}\"", name),
            ));
        }

        let raw = unsafe { open(CLONE_DEVICE.as_ptr() as *const c_char, mode.open_flags()) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // Owning the descriptor right away closes it on every error path below.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut ifr =
            IfReq { ifr_name: [0; 16], ifr_flags: (IFF_TAP | IFF_NO_PI) as c_short, _pad: [0; 22] };
        for (i, byte) in name.bytes().enumerate() {
            ifr.ifr_name[i] = byte as c_char;
        }

        if unsafe { ioctl(fd.as_raw_fd(), TUNSETIFF, &mut ifr as *mut _ as *mut c_void) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let name = unsafe { CStr::from_ptr(ifr.ifr_name.as_ptr()) }.to_string_lossy().into_owned();
        debug!("Attached to TAP interface {} ({:?})", name, mode);

        Ok(Self { fd, name, mode })
    }

    /// Name of the interface, as reported by the kernel.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direction the interface was opened in.
    pub fn mode(&self) -> TapMode {
        self.mode
    }
}

impl PacketDevice for TapDevice {
    fn read_packet(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let ret =
            unsafe { read(self.fd.as_raw_fd(), buffer.as_mut_ptr() as *mut c_void, buffer.len()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }

    fn write_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        let ret =
            unsafe { write(self.fd.as_raw_fd(), packet.as_ptr() as *const c_void, packet.len()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        if ret as usize != packet.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("partial packet written ({} / {} bytes)", ret, packet.len()),
            ));
        }
        Ok(())
    }
}

impl AsRawFd for TapDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl fmt::Debug for TapDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapDevice")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("fd", &self.fd.as_raw_fd())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_names_before_opening() {
        for name in ["", "a-very-long-interface", "tap\0x"] {
            let err = TapDevice::open(name, TapMode::ReadOnly).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn test_open_flags() {
        assert_eq!(TapMode::ReadOnly.open_flags(), O_RDONLY);
        assert_eq!(TapMode::WriteOnly.open_flags(), O_WRONLY);
    }
}
