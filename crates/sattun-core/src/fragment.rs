//! Virtual fragments: owned byte buffers with a movable data window.
//!
//! A [`VirtualFragment`] is the unit that moves between endpoint I/O and the protocol
//! engine. Its data window `[start, start + len)` sits inside a larger buffer so that
//! headers can be prepended and trailers appended in place.
//!
//! # Ownership
//!
//! A fragment has exactly one owner. Handing it to the engine is a move, and the
//! engine hands frames and PDUs back by value. Releasing a fragment is dropping it:
//! the buffer goes back to the allocator's free list and the release is counted, so
//! every control path releases exactly once.
//!
//! # Reservation policy
//!
//! [`FragmentAllocator::pdu_fragment`] reserves the largest GSE header and trailer
//! around a maximum-size PDU window, so building frames never needs a reallocation.
//! [`FragmentAllocator::wire_fragment`] reserves nothing: inbound datagrams already
//! carry fully formed frames.
//!
//! Both hand out recycled windows as they are, since the caller overwrites them with
//! a read. Reserved bytes are always zeroed.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::{
    constants::{MAX_HEADER_LENGTH, MAX_PDU_LENGTH, MAX_TRAILER_LENGTH},
    error::FragmentErrorKind,
};

/// Result of a fragment window operation.
pub type WindowResult<T> = Result<T, FragmentErrorKind>;

/// Default number of released buffers kept for reuse.
pub const DEFAULT_POOL_SIZE: usize = 32;

/// Shared bookkeeping between an allocator and the fragments it handed out.
struct Ledger {
    allocated: AtomicUsize,
    released: AtomicUsize,
    free_tx: Sender<Vec<u8>>,
    free_rx: Receiver<Vec<u8>>,
}

/// Counters describing the fragments an allocator has handed out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FragmentStats {
    /// Fragments allocated so far.
    pub allocated: usize,
    /// Fragments released (dropped) so far.
    pub released: usize,
    /// Buffers currently waiting in the free list.
    pub pooled: usize,
}

impl FragmentStats {
    /// Fragments allocated and not released yet.
    pub fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.released)
    }
}

/// Allocates fragments with a consistent reservation policy and tracks their release.
///
/// Cloning is cheap; clones share the same free list and counters.
#[derive(Clone)]
pub struct FragmentAllocator {
    ledger: Arc<Ledger>,
}

impl FragmentAllocator {
    /// Creates an allocator that keeps up to `max_pool_size` released buffers for reuse.
    pub fn new(max_pool_size: usize) -> Self {
        let (free_tx, free_rx) = bounded(max_pool_size);
        Self {
            ledger: Arc::new(Ledger {
                allocated: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                free_tx,
                free_rx,
            }),
        }
    }

    /// Allocates a fragment whose data window is `length` bytes long, preceded by
    /// `head_room` and followed by `tail_room` reserved bytes. The window is zeroed.
    pub fn allocate(&self, length: usize, head_room: usize, tail_room: usize) -> VirtualFragment {
        let mut fragment = self.allocate_for_overwrite(length, head_room, tail_room);
        fragment.data_mut().fill(0);
        fragment
    }

    /// Like [`FragmentAllocator::allocate`], but the window of a reused buffer keeps
    /// whatever bytes it held. Only the reserved bytes are zeroed.
    fn allocate_for_overwrite(
        &self,
        length: usize,
        head_room: usize,
        tail_room: usize,
    ) -> VirtualFragment {
        let total = head_room + length + tail_room;
        let mut buffer = self.ledger.free_rx.try_recv().unwrap_or_default();
        if buffer.len() >= total {
            buffer.truncate(total);
        } else {
            buffer.resize(total, 0);
        }
        buffer[..head_room].fill(0);
        buffer[head_room + length..].fill(0);
        self.ledger.allocated.fetch_add(1, Ordering::Relaxed);
        VirtualFragment { buffer, start: head_room, len: length, ledger: Some(self.ledger.clone()) }
    }

    /// Allocates a fragment able to hold any PDU plus the largest header and trailer.
    ///
    /// The window content is unspecified: it is meant to be read into, then shrunk to
    /// the bytes actually read.
    pub fn pdu_fragment(&self) -> VirtualFragment {
        self.allocate_for_overwrite(MAX_PDU_LENGTH, MAX_HEADER_LENGTH, MAX_TRAILER_LENGTH)
    }

    /// Allocates a fragment for `capacity` bytes of inbound wire data, without reserve.
    ///
    /// The window content is unspecified, as for [`FragmentAllocator::pdu_fragment`].
    pub fn wire_fragment(&self, capacity: usize) -> VirtualFragment {
        self.allocate_for_overwrite(capacity, 0, 0)
    }

    /// Allocates a fragment holding a copy of `data`, without reserve.
    pub fn copy_from(&self, data: &[u8]) -> VirtualFragment {
        let mut fragment = self.wire_fragment(data.len());
        fragment.data_mut().copy_from_slice(data);
        fragment
    }

    /// Returns the allocation counters.
    pub fn stats(&self) -> FragmentStats {
        FragmentStats {
            allocated: self.ledger.allocated.load(Ordering::Relaxed),
            released: self.ledger.released.load(Ordering::Relaxed),
            pooled: self.ledger.free_rx.len(),
        }
    }

    /// Returns the number of fragments allocated and not released yet.
    pub fn outstanding(&self) -> usize {
        self.stats().outstanding()
    }
}

impl Default for FragmentAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl fmt::Debug for FragmentAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentAllocator").field("stats", &self.stats()).finish()
    }
}

/// An exclusively owned byte buffer with a movable data window.
pub struct VirtualFragment {
    buffer: Vec<u8>,
    start: usize,
    len: usize,
    ledger: Option<Arc<Ledger>>,
}

impl VirtualFragment {
    /// Wraps `data` in an untracked fragment without reserve.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self { buffer: data, start: 0, len, ledger: None }
    }

    /// Returns the data window.
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.start..self.start + self.len]
    }

    /// Returns the data window, mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.start..self.start + self.len]
    }

    /// Returns the length of the data window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the data window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes reserved in front of the data window.
    pub fn head_room(&self) -> usize {
        self.start
    }

    /// Bytes reserved after the data window.
    pub fn tail_room(&self) -> usize {
        self.buffer.len() - self.start - self.len
    }

    /// Sets the window length, keeping its start. The window must stay inside the buffer.
    pub fn set_len(&mut self, len: usize) -> WindowResult<()> {
        let available = self.buffer.len() - self.start;
        if len > available {
            return Err(FragmentErrorKind::WindowOverflow { requested: len, available });
        }
        self.len = len;
        Ok(())
    }

    /// Grows the window by `count` bytes at its front and returns them for writing.
    pub fn prepend(&mut self, count: usize) -> WindowResult<&mut [u8]> {
        if count > self.start {
            return Err(FragmentErrorKind::HeadRoom { requested: count, available: self.start });
        }
        self.start -= count;
        self.len += count;
        Ok(&mut self.buffer[self.start..self.start + count])
    }

    /// Grows the window by `count` bytes at its end and returns them for writing.
    pub fn append(&mut self, count: usize) -> WindowResult<&mut [u8]> {
        let available = self.tail_room();
        if count > available {
            return Err(FragmentErrorKind::TailRoom { requested: count, available });
        }
        let end = self.start + self.len;
        self.len += count;
        Ok(&mut self.buffer[end..end + count])
    }

    /// Drops `count` bytes from the front of the window.
    pub fn advance(&mut self, count: usize) -> WindowResult<()> {
        if count > self.len {
            return Err(FragmentErrorKind::Advance { requested: count, available: self.len });
        }
        self.start += count;
        self.len -= count;
        Ok(())
    }

    /// Extends the window to `target` bytes, filling the new tail with zeros.
    /// A window already at least `target` bytes long is left untouched.
    pub fn zero_pad_to(&mut self, target: usize) -> WindowResult<()> {
        if target <= self.len {
            return Ok(());
        }
        let pad = target - self.len;
        self.append(pad)?.fill(0);
        Ok(())
    }
}

impl AsRef<[u8]> for VirtualFragment {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl Drop for VirtualFragment {
    fn drop(&mut self) {
        if let Some(ledger) = self.ledger.take() {
            ledger.released.fetch_add(1, Ordering::Relaxed);
            // A full free list simply lets the buffer go.
            let _ = ledger.free_tx.try_send(std::mem::take(&mut self.buffer));
        }
    }
}

impl fmt::Debug for VirtualFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFragment")
            .field("len", &self.len)
            .field("head_room", &self.head_room())
            .field("tail_room", &self.tail_room())
            .field("tracked", &self.ledger.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_fragment_reserves_header_and_trailer() {
        let allocator = FragmentAllocator::default();
        let fragment = allocator.pdu_fragment();

        assert_eq!(fragment.len(), MAX_PDU_LENGTH);
        assert_eq!(fragment.head_room(), MAX_HEADER_LENGTH);
        assert_eq!(fragment.tail_room(), MAX_TRAILER_LENGTH);
    }

    #[test]
    fn test_wire_fragment_has_no_reserve() {
        let allocator = FragmentAllocator::default();
        let fragment = allocator.wire_fragment(2048);

        assert_eq!(fragment.len(), 2048);
        assert_eq!(fragment.head_room(), 0);
        assert_eq!(fragment.tail_room(), 0);
    }

    #[test]
    fn test_release_is_counted_once() {
        let allocator = FragmentAllocator::new(4);
        let a = allocator.allocate(10, 2, 2);
        let b = allocator.copy_from(&[1, 2, 3]);
        assert_eq!(allocator.outstanding(), 2);

        drop(a);
        assert_eq!(allocator.outstanding(), 1);
        drop(b);

        let stats = allocator.stats();
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.released, 2);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.pooled, 2);
    }

    #[test]
    fn test_pool_is_bounded() {
        let allocator = FragmentAllocator::new(1);
        let fragments: Vec<_> = (0..3).map(|_| allocator.allocate(8, 0, 0)).collect();
        drop(fragments);

        assert_eq!(allocator.stats().pooled, 1);
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_reused_buffer_is_zeroed() {
        let allocator = FragmentAllocator::new(1);
        let mut first = allocator.allocate(4, 0, 0);
        first.data_mut().copy_from_slice(&[9, 9, 9, 9]);
        drop(first);

        let second = allocator.allocate(6, 1, 1);
        assert_eq!(second.data(), &[0; 6]);
    }

    #[test]
    fn test_recycled_pdu_fragment_zeroes_only_the_reserve() {
        let allocator = FragmentAllocator::new(1);
        let mut first = allocator.pdu_fragment();
        first.data_mut().fill(0xAA);
        first.prepend(MAX_HEADER_LENGTH).unwrap().fill(0xAA);
        first.append(MAX_TRAILER_LENGTH).unwrap().fill(0xAA);
        drop(first);
        assert_eq!(allocator.stats().pooled, 1);

        let mut second = allocator.pdu_fragment();
        assert_eq!(allocator.stats().pooled, 0);
        assert_eq!(second.len(), MAX_PDU_LENGTH);
        // the window is handed out as it was left
        assert!(second.data().iter().all(|&byte| byte == 0xAA));
        assert_eq!(second.prepend(MAX_HEADER_LENGTH).unwrap(), &[0; MAX_HEADER_LENGTH]);
        assert_eq!(second.append(MAX_TRAILER_LENGTH).unwrap(), &[0; MAX_TRAILER_LENGTH]);
    }

    #[test]
    fn test_recycled_buffer_shrinks_and_grows() {
        let allocator = FragmentAllocator::new(1);
        drop(allocator.wire_fragment(64));
        let small = allocator.wire_fragment(8);
        assert_eq!(small.len(), 8);
        assert_eq!(small.tail_room(), 0);
        drop(small);

        let large = allocator.allocate(16, 2, 2);
        assert_eq!(large.len(), 16);
        assert_eq!(large.data(), &[0; 16]);
        assert_eq!(large.tail_room(), 2);
    }

    #[test]
    fn test_prepend_and_append_use_reserve() {
        let allocator = FragmentAllocator::default();
        let mut fragment = allocator.allocate(3, 2, 1);
        fragment.data_mut().copy_from_slice(&[1, 2, 3]);

        fragment.prepend(2).unwrap().copy_from_slice(&[0xA, 0xB]);
        fragment.append(1).unwrap()[0] = 0xC;

        assert_eq!(fragment.data(), &[0xA, 0xB, 1, 2, 3, 0xC]);
        assert_eq!(fragment.head_room(), 0);
        assert_eq!(fragment.tail_room(), 0);
        assert!(fragment.prepend(1).is_err());
        assert!(fragment.append(1).is_err());
    }

    #[test]
    fn test_advance_and_set_len() {
        let mut fragment = VirtualFragment::from_vec(vec![1, 2, 3, 4, 5]);
        fragment.advance(2).unwrap();
        assert_eq!(fragment.data(), &[3, 4, 5]);

        fragment.set_len(1).unwrap();
        assert_eq!(fragment.data(), &[3]);
        assert!(fragment.set_len(4).is_err());
        assert!(fragment.advance(2).is_err());

        fragment.advance(1).unwrap();
        assert!(fragment.is_empty());
    }

    #[test]
    fn test_zero_pad_to() {
        let allocator = FragmentAllocator::default();
        let mut fragment = allocator.allocate(2, 0, 8);
        fragment.data_mut().copy_from_slice(&[7, 7]);

        fragment.zero_pad_to(6).unwrap();
        assert_eq!(fragment.data(), &[7, 7, 0, 0, 0, 0]);

        fragment.zero_pad_to(3).unwrap();
        assert_eq!(fragment.len(), 6);

        assert!(fragment.zero_pad_to(20).is_err());
    }
}
