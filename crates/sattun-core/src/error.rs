//! Error types shared by the bridge crates.

use std::{io, result};

use thiserror::Error;

/// Convenience alias for results carrying an [`ErrorKind`].
pub type Result<T> = result::Result<T, ErrorKind>;

/// Everything that can go wrong outside of the protocol engine.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Underlying I/O error from the OS.
    #[error("I/O error: {0}")]
    IOError(#[from] io::Error),
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigErrorKind),
    /// A fragment window operation did not fit the allocated buffer.
    #[error("fragment error: {0}")]
    FragmentError(#[from] FragmentErrorKind),
    /// Termination signal handlers could not be installed.
    #[error("could not install signal handlers: {0}")]
    SignalSetup(io::Error),
    /// The multiplexing wait failed for a reason other than signal delivery.
    #[error("readiness wait failed: {0}")]
    PollFailed(io::Error),
}

/// Reasons a [`crate::Config`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigErrorKind {
    /// The TAP interface name is empty or longer than the kernel allows.
    #[error("invalid TAP interface name \"{0}\"")]
    TapInterface(String),
    /// The read timeout is zero.
    #[error("invalid reading timeout value: must be strictly positive")]
    ReadTimeout,
    /// The constant payload length cannot hold a minimal encapsulated frame.
    #[error("invalid payload length {actual}: frames need at least {minimum} bytes")]
    PayloadLength {
        /// Smallest accepted nonzero payload length.
        minimum: usize,
        /// Configured payload length.
        actual: usize,
    },
    /// The incoming buffer length is zero or larger than a UDP datagram.
    #[error("invalid buffer length {actual}: must be between 1 and {maximum} bytes")]
    BufferLength {
        /// Largest accepted buffer length.
        maximum: usize,
        /// Configured buffer length.
        actual: usize,
    },
}

/// Reasons a fragment window operation is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FragmentErrorKind {
    /// Requested window does not fit the allocated buffer.
    #[error("window of {requested} bytes exceeds the {available} bytes available")]
    WindowOverflow {
        /// Bytes requested.
        requested: usize,
        /// Bytes that were available.
        available: usize,
    },
    /// Not enough reserved head room to prepend a header.
    #[error("head room of {available} bytes cannot hold {requested} header bytes")]
    HeadRoom {
        /// Bytes requested.
        requested: usize,
        /// Bytes that were available.
        available: usize,
    },
    /// Not enough reserved tail room to append a trailer.
    #[error("tail room of {available} bytes cannot hold {requested} trailer bytes")]
    TailRoom {
        /// Bytes requested.
        requested: usize,
        /// Bytes that were available.
        available: usize,
    },
    /// Tried to consume more bytes than the window holds.
    #[error("cannot advance {requested} bytes past a {available}-byte window")]
    Advance {
        /// Bytes requested.
        requested: usize,
        /// Bytes that were available.
        available: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: ErrorKind = io::Error::new(io::ErrorKind::NotFound, "no tap").into();
        assert!(matches!(err, ErrorKind::IOError(_)));
        assert!(err.to_string().contains("no tap"));
    }

    #[test]
    fn test_config_error_message() {
        let err = ErrorKind::from(ConfigErrorKind::PayloadLength { minimum: 34, actual: 10 });
        assert_eq!(
            err.to_string(),
            "invalid configuration: invalid payload length 10: frames need at least 34 bytes"
        );
    }
}
