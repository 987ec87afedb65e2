//! Send pipeline: TAP packets out as GSE frames over UDP.
//!
//! One TAP readiness event is one unit of work: read a single packet, submit it to
//! the encapsulator under a fresh label, then send every frame the encapsulator
//! produces for it before returning to the event loop. Frames of one PDU are
//! therefore always sent before the next PDU is read.
//!
//! In fixed mode every datagram is zero-padded to exactly the configured payload
//! length. In variable mode the desired frame length is the PDU length plus the
//! largest header, so a PDU that fits one GSE packet leaves as one frame.

use std::{cmp, net::SocketAddrV4};

use tracing::{debug, trace, warn};

use sattun_core::{
    constants::{MAX_FRAME_RETRIES, MAX_HEADER_LENGTH, PROTOCOL, QOS},
    Config, FragmentAllocator, Liveness, PduLabel, VirtualFragment,
};
use sattun_io::{DatagramSocket, PacketDevice};
use sattun_protocol::{FrameRequest, PduEncoder};
use sattun_utilities::FrameSummary;

use crate::stats::SendStats;

/// Encap direction pipeline.
pub struct SendPipeline<D: PacketDevice, S: DatagramSocket, E: PduEncoder> {
    tap: D,
    socket: S,
    encoder: E,
    allocator: FragmentAllocator,
    remote: SocketAddrV4,
    payload_len: Option<usize>,
    read_len: usize,
    last_label: PduLabel,
    liveness: Liveness,
    stats: SendStats,
}

impl<D: PacketDevice, S: DatagramSocket, E: PduEncoder> SendPipeline<D, S, E> {
    /// Creates a pipeline reading `tap` and sending to `config.remote` through `socket`.
    pub fn new(
        tap: D,
        socket: S,
        encoder: E,
        allocator: FragmentAllocator,
        config: &Config,
        liveness: Liveness,
    ) -> Self {
        Self {
            tap,
            socket,
            encoder,
            allocator,
            remote: config.remote,
            payload_len: config.fixed_payload_len(),
            read_len: config.buffer_len,
            last_label: PduLabel::ZERO,
            liveness,
            stats: SendStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &SendStats {
        &self.stats
    }

    /// The engine frames are requested from.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Handles one TAP readiness event.
    pub fn on_tap_readable(&mut self) {
        let mut pdu = self.allocator.pdu_fragment();
        let capacity = cmp::min(self.read_len, pdu.len());
        let read = match self.tap.read_packet(&mut pdu.data_mut()[..capacity]) {
            Ok(0) => {
                debug!("Empty read on the TAP interface, packet dropped");
                self.stats.tap_read_errors += 1;
                return;
            }
            Ok(read) => read,
            Err(err) => {
                warn!("Failed to read a packet from the TAP interface: {}", err);
                self.stats.tap_read_errors += 1;
                return;
            }
        };
        if let Err(err) = pdu.set_len(read) {
            warn!("Packet of {} bytes does not fit its fragment: {}", read, err);
            self.stats.tap_read_errors += 1;
            return;
        }
        self.stats.pdus_read += 1;

        let label = self.last_label.next();
        self.last_label = label;
        debug!("PDU #{} read from TAP: {}", label, FrameSummary::new(pdu.data()));

        if let Err(err) = self.encoder.receive_pdu(pdu, label, PROTOCOL, QOS) {
            warn!("Failed to encapsulate PDU #{} ({} bytes): {}", label, read, err);
            self.stats.pdus_rejected += 1;
            return;
        }

        let desired_length = self.payload_len.unwrap_or(read + MAX_HEADER_LENGTH);
        self.emit_frames(label, desired_length);
    }

    /// Sends every frame of the PDU just submitted.
    fn emit_frames(&mut self, label: PduLabel, desired_length: usize) {
        let mut failures = 0;
        let mut frames = 0;
        loop {
            if !self.liveness.is_running() {
                if self.encoder.abandon(QOS) {
                    debug!("Shutdown requested, dropping the remaining frames of PDU #{}", label);
                    self.stats.pdus_abandoned += 1;
                }
                return;
            }

            match self.encoder.next_frame(desired_length, QOS) {
                FrameRequest::Ready(frame) => {
                    failures = 0;
                    frames += 1;
                    self.send_frame(label, frame);
                }
                FrameRequest::Exhausted => {
                    trace!("PDU #{} sent in {} frames", label, frames);
                    return;
                }
                FrameRequest::Failed(err) => {
                    failures += 1;
                    self.stats.frame_failures += 1;
                    warn!(
                        "Frame {} of PDU #{} failed at desired length {} (attempt {}/{}): {}",
                        frames + 1,
                        label,
                        desired_length,
                        failures,
                        MAX_FRAME_RETRIES,
                        err
                    );
                    if failures >= MAX_FRAME_RETRIES {
                        self.encoder.abandon(QOS);
                        self.stats.pdus_abandoned += 1;
                        warn!("Giving up on the remaining frames of PDU #{}", label);
                        return;
                    }
                }
            }
        }
    }

    fn send_frame(&mut self, label: PduLabel, mut frame: VirtualFragment) {
        if let Some(payload_len) = self.payload_len {
            if let Err(err) = frame.zero_pad_to(payload_len) {
                warn!(
                    "Cannot pad a {}-byte frame of PDU #{} to {} bytes: {}",
                    frame.len(),
                    label,
                    payload_len,
                    err
                );
                self.stats.send_errors += 1;
                return;
            }
        }

        match self.socket.send_datagram(&self.remote, frame.data()) {
            Ok(()) => {
                trace!("Frame of {} bytes sent to {}", frame.len(), self.remote);
                self.stats.frames_sent += 1;
            }
            Err(err) => {
                warn!("Failed to send a {}-byte frame to {}: {}", frame.len(), self.remote, err);
                self.stats.send_errors += 1;
            }
        }
    }
}
