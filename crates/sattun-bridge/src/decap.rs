//! Receive pipeline: UDP datagrams in, reassembled PDUs out to the TAP interface.
//!
//! One UDP readiness event is one unit of work: receive a single datagram and walk
//! the GSE packets it carries, in wire order. The walk advances by exactly what the
//! decapsulator reports as consumed, stops on padding, and abandons the rest of the
//! datagram on a decoding failure. Datagrams not sent by the configured remote
//! endpoint never reach the decapsulator.

use std::{
    io,
    net::{SocketAddr, SocketAddrV4},
};

use tracing::{debug, error, trace, warn};

use sattun_core::{Config, FragmentAllocator, Liveness, PduLabel, VirtualFragment};
use sattun_io::{DatagramSocket, PacketDevice};
use sattun_protocol::{DecodeStatus, Decoded, FrameDecoder};
use sattun_utilities::FrameSummary;

use crate::stats::ReceiveStats;

/// Decap direction pipeline.
pub struct ReceivePipeline<S: DatagramSocket, D: PacketDevice, F: FrameDecoder> {
    socket: S,
    tap: D,
    decoder: F,
    allocator: FragmentAllocator,
    remote: SocketAddrV4,
    buffer_len: usize,
    liveness: Liveness,
    stats: ReceiveStats,
}

impl<S: DatagramSocket, D: PacketDevice, F: FrameDecoder> ReceivePipeline<S, D, F> {
    /// Creates a pipeline receiving from `config.remote` through `socket` and writing `tap`.
    pub fn new(
        socket: S,
        tap: D,
        decoder: F,
        allocator: FragmentAllocator,
        config: &Config,
        liveness: Liveness,
    ) -> Self {
        Self {
            socket,
            tap,
            decoder,
            allocator,
            remote: config.remote,
            buffer_len: config.buffer_len,
            liveness,
            stats: ReceiveStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }

    /// Handles one UDP readiness event.
    pub fn on_socket_readable(&mut self) {
        let mut datagram = self.allocator.wire_fragment(self.buffer_len);
        let (received, source) = match self.socket.receive_datagram(datagram.data_mut()) {
            Ok((payload, source)) => (payload.len(), source),
            Err(err) => {
                self.on_receive_error(err);
                return;
            }
        };

        if source != SocketAddr::V4(self.remote) {
            debug!("Datagram of {} bytes from unexpected source {} dropped", received, source);
            self.stats.foreign_datagrams += 1;
            return;
        }
        if received == 0 {
            debug!("Empty datagram from {} dropped", source);
            self.stats.empty_datagrams += 1;
            return;
        }
        if let Err(err) = datagram.set_len(received) {
            warn!("Datagram of {} bytes does not fit its fragment: {}", received, err);
            return;
        }
        self.stats.datagrams_received += 1;
        trace!("Datagram of {} bytes received from {}", received, source);

        self.decode_datagram(datagram);
    }

    fn on_receive_error(&mut self, err: io::Error) {
        match err.kind() {
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
                debug!("No datagram to receive: {}", err);
            }
            // ICMP port unreachable reported for an earlier send.
            io::ErrorKind::ConnectionRefused => {
                warn!("Remote endpoint {} unreachable: {}", self.remote, err);
            }
            _ => {
                error!("Failed to receive a datagram: {}", err);
                self.liveness.fail();
            }
        }
    }

    /// Walks the GSE packets of one datagram.
    fn decode_datagram(&mut self, mut datagram: VirtualFragment) {
        let total = datagram.len();
        while !datagram.is_empty() && self.liveness.is_running() {
            let offset = total - datagram.len();
            let Decoded { consumed, status } = self.decoder.decode(&datagram);
            self.stats.frames_decoded += 1;

            if consumed == 0 || datagram.advance(consumed).is_err() {
                warn!(
                    "Decapsulator consumed {} of the {} bytes left at offset {}, datagram dropped",
                    consumed,
                    datagram.len(),
                    offset
                );
                self.stats.decode_errors += 1;
                return;
            }

            match status {
                DecodeStatus::MoreNeeded => {
                    trace!(
                        "Fragment of {} bytes at offset {} stored, PDU incomplete",
                        consumed, offset
                    );
                }
                DecodeStatus::PduComplete { pdu, label, protocol, .. } => {
                    trace!("PDU #{} complete (protocol {}) at offset {}", label, protocol, offset);
                    self.deliver(label, pdu);
                }
                DecodeStatus::Padding => {
                    trace!("{} bytes of padding at offset {}", consumed, offset);
                    return;
                }
                DecodeStatus::Overwritten => {
                    warn!(
                        "Incomplete PDU overwritten by the fragment at offset {} ({} bytes)",
                        offset, consumed
                    );
                    self.stats.overwritten += 1;
                }
                DecodeStatus::InvalidLength => {
                    warn!(
                        "Invalid length in the frame at offset {} ({} of {} bytes)",
                        offset, consumed, total
                    );
                    self.stats.invalid_lengths += 1;
                }
                DecodeStatus::Failed(err) => {
                    warn!(
                        "Failed to decapsulate the frame at offset {} of a {}-byte datagram: {}",
                        offset, total, err
                    );
                    self.stats.decode_errors += 1;
                    return;
                }
            }
        }
        if !datagram.is_empty() {
            debug!("Shutdown requested, {} bytes of the datagram left unprocessed", datagram.len());
        }
    }

    fn deliver(&mut self, label: PduLabel, pdu: VirtualFragment) {
        match self.tap.write_packet(pdu.data()) {
            Ok(()) => {
                debug!("PDU #{} written to TAP: {}", label, FrameSummary::new(pdu.data()));
                self.stats.pdus_delivered += 1;
            }
            Err(err) => {
                warn!(
                    "Failed to write PDU #{} ({} bytes) to the TAP interface: {}",
                    label,
                    pdu.len(),
                    err
                );
                self.stats.tap_write_errors += 1;
            }
        }
    }
}
