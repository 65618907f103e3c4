//! Length-prefixed framing over one byte ring.
//!
//! ## Frame layout
//!
//! Each item is stored as a `u32` little-endian length prefix followed by the
//! payload the codec produced. The reserved prefix `u32::MAX` is the **seal
//! sentinel**: the producer writes it as the final frame of a segment, and on
//! reading it the consumer latches the segment into a terminal end-of-segment
//! state.
//!
//! Offers always leave headroom for the sentinel, so sealing a segment that
//! accepted its configuration can never fail for lack of space.

use std::cell::UnsafeCell;
use std::fs;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::codec::DataCodec;
use crate::ring::MappedByteRing;

use super::QueueError;

/// Frame length prefix, little-endian `u32`.
const PREFIX_BYTES: u64 = 4;

/// Reserved prefix value marking the end of a sealed segment.
const SEAL_SENTINEL: u32 = u32::MAX;

/// Outcome of polling one framed segment.
#[derive(Debug)]
pub enum Frame<T> {
    /// The next buffered item, in offer order.
    Item(T),
    /// Nothing readable right now; retry after the producer publishes more.
    Empty,
    /// The segment is sealed and fully drained; no item will ever follow.
    Sealed,
}

/// A framed SPSC queue over one memory-mapped segment file.
///
/// The queue owns its backing file: [`close`](Self::close) unlinks it, and
/// the mapping itself is released when the queue drops, so a racing producer
/// never touches unmapped memory.
pub struct FramedQueue<T, C> {
    ring: MappedByteRing,
    path: PathBuf,
    codec: Arc<C>,

    /// Producer-side scratch holding prefix plus encoded payload.
    write_scratch: UnsafeCell<Vec<u8>>,

    /// Consumer-side scratch the payload is copied into before decoding.
    read_scratch: UnsafeCell<Vec<u8>>,

    /// Payload bytes accepted so far; producer side, drives size rollover.
    bytes_written: AtomicU64,

    /// Items accepted so far; producer side, drives count rollover.
    items_written: AtomicU64,

    /// Producer wrote the seal sentinel.
    sealed: AtomicBool,

    /// Consumer observed the seal sentinel; the segment is terminal.
    seal_seen: AtomicBool,

    /// The backing file was unlinked; offers and polls are inert.
    closed: AtomicBool,

    _marker: PhantomData<fn(T) -> T>,
}

// SAFETY: `write_scratch` is touched only by the single producer (offer/seal)
// and `read_scratch` only by the single consumer (poll); the ring itself
// enforces the same one-writer/one-reader contract. Everything else is atomic
// or immutable.
unsafe impl<T, C: Send + Sync> Send for FramedQueue<T, C> {}
// SAFETY: see above.
unsafe impl<T, C: Send + Sync> Sync for FramedQueue<T, C> {}

impl<T, C: DataCodec<T>> FramedQueue<T, C> {
    /// Creates a segment backed by a fresh file of `capacity` bytes at `path`.
    ///
    /// # Errors
    ///
    /// Returns a queue error when the file cannot be created or mapped.
    pub fn create(path: PathBuf, capacity: u64, codec: Arc<C>) -> Result<Self, QueueError> {
        let ring = MappedByteRing::create(&path, capacity)?;
        tracing::debug!(path = %path.display(), capacity, "created spool segment");

        Ok(Self {
            ring,
            path,
            codec,
            write_scratch: UnsafeCell::new(Vec::new()),
            read_scratch: UnsafeCell::new(Vec::new()),
            bytes_written: AtomicU64::new(0),
            items_written: AtomicU64::new(0),
            sealed: AtomicBool::new(false),
            seal_seen: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            _marker: PhantomData,
        })
    }

    /// Offers an item. Producer side only.
    ///
    /// Returns `Ok(false)` when the framed item (plus seal headroom) does not
    /// fit the remaining capacity.
    ///
    /// # Errors
    ///
    /// `QueueError::ItemTooLarge` when the framed item can never fit this
    /// segment size; `QueueError::Codec` when encoding fails.
    pub fn offer(&self, item: &T) -> Result<bool, QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }

        // SAFETY: single producer; nothing else touches `write_scratch`.
        let scratch = unsafe { &mut *self.write_scratch.get() };
        scratch.clear();
        scratch.extend_from_slice(&[0u8; PREFIX_BYTES as usize]);
        self.codec
            .encode(item, scratch)
            .map_err(QueueError::Codec)?;

        let payload = scratch.len() as u64 - PREFIX_BYTES;
        if payload >= u64::from(SEAL_SENTINEL) {
            return Err(QueueError::ItemTooLarge {
                frame: payload + PREFIX_BYTES,
                capacity: self.ring.capacity(),
            });
        }
        let frame = payload + PREFIX_BYTES;
        if frame + PREFIX_BYTES > self.ring.capacity() {
            return Err(QueueError::ItemTooLarge {
                frame,
                capacity: self.ring.capacity(),
            });
        }
        // Keep room for the seal sentinel so sealing can never fail.
        if frame + PREFIX_BYTES > self.ring.free() {
            return Ok(false);
        }

        #[allow(clippy::cast_possible_truncation)]
        let prefix = (payload as u32).to_le_bytes();
        scratch[..PREFIX_BYTES as usize].copy_from_slice(&prefix);

        if !self.ring.write(scratch) {
            return Ok(false);
        }
        self.bytes_written.fetch_add(payload, Ordering::Relaxed);
        self.items_written.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Writes the seal sentinel as the segment's final frame. Producer side
    /// only; at most once.
    pub fn seal(&self) {
        if self.sealed.swap(true, Ordering::AcqRel) {
            return;
        }
        let wrote = self.ring.write(&SEAL_SENTINEL.to_le_bytes());
        debug_assert!(wrote, "offer headroom must leave room for the sentinel");
        if !wrote {
            tracing::warn!(path = %self.path.display(), "no room to seal spool segment");
        }
    }

    /// Polls the next frame. Consumer side only.
    ///
    /// # Errors
    ///
    /// `QueueError::Codec` when the payload fails to decode.
    pub fn poll(&self) -> Result<Frame<T>, QueueError> {
        if self.seal_seen.load(Ordering::Relaxed) {
            return Ok(Frame::Sealed);
        }
        if self.closed.load(Ordering::Acquire) {
            return Ok(Frame::Empty);
        }

        let used = self.ring.used();
        if used < PREFIX_BYTES {
            return Ok(Frame::Empty);
        }

        let mut prefix = [0u8; PREFIX_BYTES as usize];
        self.ring.read_at(0, &mut prefix);
        let len = u32::from_le_bytes(prefix);
        if len == SEAL_SENTINEL {
            self.seal_seen.store(true, Ordering::Relaxed);
            self.ring.consume(PREFIX_BYTES);
            return Ok(Frame::Sealed);
        }

        let len = u64::from(len);
        if used < PREFIX_BYTES + len {
            // Writer is still publishing this frame; treat as empty and retry.
            return Ok(Frame::Empty);
        }

        // SAFETY: single consumer; nothing else touches `read_scratch`.
        let scratch = unsafe { &mut *self.read_scratch.get() };
        #[allow(clippy::cast_possible_truncation)]
        scratch.resize(len as usize, 0);
        self.ring.read_at(PREFIX_BYTES, scratch);
        self.ring.consume(PREFIX_BYTES + len);

        let item = self.codec.decode(scratch).map_err(QueueError::Codec)?;
        Ok(Frame::Item(item))
    }

    /// True when no published bytes remain. A sealed, drained segment is
    /// empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.used() == 0
    }

    /// Payload bytes accepted so far. Producer side.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Items accepted so far. Producer side.
    #[must_use]
    pub fn items_written(&self) -> u64 {
        self.items_written.load(Ordering::Relaxed)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Unlinks the backing file, surfacing deletion faults. Idempotent.
    ///
    /// # Errors
    ///
    /// `QueueError::Io` when the file exists but cannot be removed.
    pub fn close_checked(&self) -> Result<(), QueueError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(path = %self.path.display(), "retiring spool segment");
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Unlinks the backing file, logging deletion faults. Idempotent.
    pub fn close(&self) {
        if let Err(e) = self.close_checked() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to delete spool segment");
        }
    }
}

impl<T, C> std::fmt::Debug for FramedQueue<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedQueue")
            .field("path", &self.path)
            .field("capacity", &self.ring.capacity())
            .field("items_written", &self.items_written.load(Ordering::Relaxed))
            .field("sealed", &self.sealed.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
