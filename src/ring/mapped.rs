//! File-backed circular byte buffer for one writer and one reader.
//!
//! The cursors are *logical* byte counts that only ever grow; `used` space is
//! `write_pos - read_pos` and free space is `capacity - used`. Keeping the
//! cursors monotonic makes the space arithmetic immune to wrap-around and
//! leaves the physical offset as a single `% capacity`.
//!
//! ## Synchronization
//!
//! - The producer owns `write_pos`: it copies payload bytes into the mapping
//!   first, then publishes them with one Release store of the cursor.
//! - The consumer owns `read_pos`: it Acquires `write_pos` before reading, so
//!   every byte below the observed cursor is fully written; consuming is a
//!   Release store of `read_pos`, which hands the region back to the producer.
//!
//! This is the same acquire/release discipline as an in-memory SPSC ring; the
//! only difference is that the slots are bytes in a mapped file.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::MmapMut;

use super::padded::CachePadded;

/// Error type for byte-ring operations.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Creating, sizing, mapping, or flushing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fixed-capacity SPSC byte ring stored in one memory-mapped file.
///
/// # Safety
///
/// The ring is safe to share between threads as long as exactly one thread
/// calls the producer API (`free`, `write`) and exactly one thread calls the
/// consumer API (`used`, `read_at`, `consume`).
pub struct MappedByteRing {
    /// Base pointer into the mapping. All byte access goes through this.
    ptr: *mut u8,

    /// Ring capacity in bytes (the mapped file length).
    capacity: u64,

    /// Producer cursor. Monotonic; physical offset is `write_pos % capacity`.
    write_pos: CachePadded<AtomicU64>,

    /// Consumer cursor. Monotonic; physical offset is `read_pos % capacity`.
    read_pos: CachePadded<AtomicU64>,

    /// Keeps the mapping alive; dropped (unmapped) with the ring.
    mmap: MmapMut,

    /// Keeps the file handle alive for the lifetime of the mapping.
    _file: File,
}

// SAFETY: the raw pointer targets the mapping, which lives as long as `self`.
// Concurrent access is disciplined by the single-writer/single-reader contract
// and the acquire/release cursor protocol documented on each method.
unsafe impl Send for MappedByteRing {}
// SAFETY: see above.
unsafe impl Sync for MappedByteRing {}

impl MappedByteRing {
    /// Creates the backing file, sizes it to `capacity` bytes, and maps it.
    ///
    /// An existing file at `path` is truncated: the ring never recovers
    /// previous contents.
    ///
    /// # Errors
    ///
    /// Returns `RingError::Io` if the file cannot be created, sized, or
    /// mapped.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; configuration validation rejects that
    /// before a ring is ever constructed.
    pub fn create(path: &Path, capacity: u64) -> Result<Self, RingError> {
        assert!(capacity > 0, "ring capacity must be > 0");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity)?;

        // SAFETY: the file was just created with read/write access and sized
        // to `capacity`; nothing else maps it while this ring exists.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        let ptr = mmap.as_mut_ptr();

        Ok(Self {
            ptr,
            capacity,
            write_pos: CachePadded::new(AtomicU64::new(0)),
            read_pos: CachePadded::new(AtomicU64::new(0)),
            mmap,
            _file: file,
        })
    }

    /// Returns the ring capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the free space in bytes, from the producer's point of view.
    ///
    /// The producer owns `write_pos`, so a Relaxed load suffices there; the
    /// Acquire on `read_pos` synchronizes with the consumer's `consume` so
    /// reclaimed bytes are safe to overwrite.
    #[inline]
    #[must_use]
    pub fn free(&self) -> u64 {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);
        self.capacity - (write - read)
    }

    /// Returns the readable space in bytes, from the consumer's point of view.
    ///
    /// The Acquire on `write_pos` synchronizes with the producer's publishing
    /// store: every byte below the returned count is fully written.
    #[inline]
    #[must_use]
    pub fn used(&self) -> u64 {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Relaxed);
        write - read
    }

    /// Writes `bytes` at the producer cursor and publishes them.
    ///
    /// All-or-nothing: returns false without side effects when the ring does
    /// not have room for the whole slice. Producer side only.
    #[inline]
    pub fn write(&self, bytes: &[u8]) -> bool {
        let len = bytes.len() as u64;
        if len > self.free() {
            return false;
        }

        let write = self.write_pos.load(Ordering::Relaxed);
        self.copy_in(write, bytes);

        // Publish: the payload copy above happens-before this store, and the
        // consumer's Acquire load of `write_pos` picks both up together.
        self.write_pos.store(write + len, Ordering::Release);
        true
    }

    /// Copies `out.len()` bytes starting `offset` bytes past the consumer
    /// cursor, without consuming them. Consumer side only.
    ///
    /// The caller must have observed at least `offset + out.len()` bytes via
    /// [`used`](Self::used) first.
    #[inline]
    pub fn read_at(&self, offset: u64, out: &mut [u8]) {
        let read = self.read_pos.load(Ordering::Relaxed);
        debug_assert!(
            offset + out.len() as u64 <= self.used(),
            "read_at past published bytes"
        );
        self.copy_out(read + offset, out);
    }

    /// Consumes `n` bytes, returning their region to the producer.
    /// Consumer side only.
    #[inline]
    pub fn consume(&self, n: u64) {
        let read = self.read_pos.load(Ordering::Relaxed);
        debug_assert!(n <= self.used(), "consume past published bytes");
        // Release: the payload reads above happen-before the producer's
        // Acquire load of `read_pos`, so it never overwrites unread bytes.
        self.read_pos.store(read + n, Ordering::Release);
    }

    /// Flushes the mapping to disk.
    ///
    /// # Errors
    ///
    /// Returns `RingError::Io` when the flush faults; the ring must be
    /// considered unusable afterwards.
    pub fn flush(&self) -> Result<(), RingError> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Copies `src` into the mapping at logical position `pos`, splitting at
    /// the physical end of the file when the region wraps.
    #[inline]
    fn copy_in(&self, pos: u64, src: &[u8]) {
        #[allow(clippy::cast_possible_truncation)]
        let at = (pos % self.capacity) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let cap = self.capacity as usize;
        let first = src.len().min(cap - at);

        // SAFETY: `at + first <= cap` and the remainder lands at the start of
        // the mapping; the target region is free space owned by the producer
        // (checked against `free()` by the caller).
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(at), first);
            if first < src.len() {
                ptr::copy_nonoverlapping(src.as_ptr().add(first), self.ptr, src.len() - first);
            }
        }
    }

    /// Copies from the mapping at logical position `pos` into `out`,
    /// splitting at the physical end of the file when the region wraps.
    #[inline]
    fn copy_out(&self, pos: u64, out: &mut [u8]) {
        #[allow(clippy::cast_possible_truncation)]
        let at = (pos % self.capacity) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let cap = self.capacity as usize;
        let first = out.len().min(cap - at);

        // SAFETY: the source region holds published bytes owned by the
        // consumer (checked against `used()` by the caller).
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.add(at), out.as_mut_ptr(), first);
            if first < out.len() {
                ptr::copy_nonoverlapping(self.ptr, out.as_mut_ptr().add(first), out.len() - first);
            }
        }
    }
}

impl std::fmt::Debug for MappedByteRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedByteRing")
            .field("capacity", &self.capacity)
            .field("write_pos", &self.write_pos.load(Ordering::Relaxed))
            .field("read_pos", &self.read_pos.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn ring(capacity: u64) -> (tempfile::TempDir, MappedByteRing) {
        let dir = tempdir().unwrap();
        let ring = MappedByteRing::create(&dir.path().join("ring.buf"), capacity).unwrap();
        (dir, ring)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, ring) = ring(64);

        assert!(ring.write(b"hello"));
        assert_eq!(ring.used(), 5);
        assert_eq!(ring.free(), 59);

        let mut out = [0u8; 5];
        ring.read_at(0, &mut out);
        assert_eq!(&out, b"hello");

        ring.consume(5);
        assert_eq!(ring.used(), 0);
        assert_eq!(ring.free(), 64);
    }

    #[test]
    fn test_refuses_overfull_write() {
        let (_dir, ring) = ring(8);

        assert!(ring.write(&[1u8; 6]));
        assert!(!ring.write(&[2u8; 3]));
        // refused write has no side effects
        assert_eq!(ring.used(), 6);
        assert!(ring.write(&[2u8; 2]));
        assert_eq!(ring.free(), 0);
    }

    #[test]
    fn test_wrap_around() {
        let (_dir, ring) = ring(8);

        // advance the cursors so the next write straddles the physical end
        assert!(ring.write(&[0u8; 6]));
        ring.consume(6);

        let payload = [1, 2, 3, 4, 5];
        assert!(ring.write(&payload));

        let mut out = [0u8; 5];
        ring.read_at(0, &mut out);
        assert_eq!(out, payload);
        ring.consume(5);
        assert_eq!(ring.used(), 0);
    }

    #[test]
    fn test_read_at_offset() {
        let (_dir, ring) = ring(32);

        assert!(ring.write(&[9, 9, 9, 7, 7]));
        let mut out = [0u8; 2];
        ring.read_at(3, &mut out);
        assert_eq!(out, [7, 7]);
    }

    #[test]
    fn test_flush() {
        let (_dir, ring) = ring(16);
        assert!(ring.write(b"abcd"));
        ring.flush().unwrap();
    }

    #[test]
    fn test_concurrent_spsc() {
        const ROUNDS: u64 = 10_000;
        let (_dir, ring) = ring(256);
        let ring = Arc::new(ring);
        let producer_ring = Arc::clone(&ring);
        let consumer_ring = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            for i in 0..ROUNDS {
                let frame = i.to_le_bytes();
                while !producer_ring.write(&frame) {
                    thread::yield_now();
                }
            }
        });

        let consumer = thread::spawn(move || {
            let mut received = Vec::with_capacity(ROUNDS as usize);
            while received.len() < ROUNDS as usize {
                if consumer_ring.used() < 8 {
                    thread::yield_now();
                    continue;
                }
                let mut frame = [0u8; 8];
                consumer_ring.read_at(0, &mut frame);
                consumer_ring.consume(8);
                received.push(u64::from_le_bytes(frame));
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();

        assert_eq!(received.len(), ROUNDS as usize);
        for (i, &value) in received.iter().enumerate() {
            assert_eq!(value, i as u64);
        }
    }
}
