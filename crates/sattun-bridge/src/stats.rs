use std::fmt::{self, Display};

/// Counters of the send pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendStats {
    /// PDUs read from the TAP interface.
    pub pdus_read: u64,
    /// TAP reads that failed or returned nothing.
    pub tap_read_errors: u64,
    /// PDUs the encapsulator refused.
    pub pdus_rejected: u64,
    /// Frames sent over UDP.
    pub frames_sent: u64,
    /// Frame requests that failed.
    pub frame_failures: u64,
    /// PDUs whose remaining frames were dropped after repeated failures or on shutdown.
    pub pdus_abandoned: u64,
    /// Frames that could not be sent.
    pub send_errors: u64,
}

impl Display for SendStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} PDUs read ({} read errors, {} rejected, {} abandoned), \
             {} frames sent ({} request failures, {} send errors)",
            self.pdus_read,
            self.tap_read_errors,
            self.pdus_rejected,
            self.pdus_abandoned,
            self.frames_sent,
            self.frame_failures,
            self.send_errors
        )
    }
}

/// Counters of the receive pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Datagrams accepted from the remote endpoint.
    pub datagrams_received: u64,
    /// Datagrams dropped because another endpoint sent them.
    pub foreign_datagrams: u64,
    /// Empty datagrams from the remote endpoint.
    pub empty_datagrams: u64,
    /// Frames handed to the decapsulator.
    pub frames_decoded: u64,
    /// PDUs written to the TAP interface.
    pub pdus_delivered: u64,
    /// Incomplete PDUs replaced by a new first fragment.
    pub overwritten: u64,
    /// Frames with inconsistent lengths.
    pub invalid_lengths: u64,
    /// Frames the decapsulator failed on.
    pub decode_errors: u64,
    /// PDUs that could not be written to the TAP interface.
    pub tap_write_errors: u64,
}

impl Display for ReceiveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} datagrams received ({} foreign, {} empty), \
             {} frames decoded ({} overwritten, {} invalid lengths, {} errors), \
             {} PDUs delivered ({} write errors)",
            self.datagrams_received,
            self.foreign_datagrams,
            self.empty_datagrams,
            self.frames_decoded,
            self.overwritten,
            self.invalid_lengths,
            self.decode_errors,
            self.pdus_delivered,
            self.tap_write_errors
        )
    }
}
