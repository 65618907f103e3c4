//! Rollover across framed segments.
//!
//! The rolling queue keeps an ordered list of [`FramedQueue`] segments: the
//! producer appends to the tail, the consumer drains the head. When the tail
//! reaches a rollover cap (or simply runs out of ring space) the producer
//! seals it and starts a fresh segment file; when the consumer drains a
//! sealed head it retires the segment, deleting its file.
//!
//! The seal sentinel inside each segment carries the end-of-segment signal
//! from producer to consumer. The segment list itself sits behind a mutex,
//! but the lock is only ever held to clone a segment handle or splice the
//! list, never across ring or file I/O, so neither end blocks on the other's
//! work.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::DataCodec;
use crate::config::FileFactory;

use super::framed::{Frame, FramedQueue};
use super::QueueError;

/// Produces fresh framed segments on demand.
pub struct SegmentFactory<C> {
    capacity: u64,
    file_factory: FileFactory,
    codec: Arc<C>,
}

impl<C> SegmentFactory<C> {
    /// Creates a factory producing segments of `capacity` bytes at paths from
    /// `file_factory`.
    pub fn new(capacity: u64, file_factory: FileFactory, codec: Arc<C>) -> Self {
        Self {
            capacity,
            file_factory,
            codec,
        }
    }

    fn create<T>(&self) -> Result<Arc<FramedQueue<T, C>>, QueueError>
    where
        C: DataCodec<T>,
    {
        let path: PathBuf = (self.file_factory)();
        Ok(Arc::new(FramedQueue::create(
            path,
            self.capacity,
            Arc::clone(&self.codec),
        )?))
    }
}

/// An SPSC queue that rolls over a sequence of segment files.
///
/// FIFO across rollovers: the segment list is FIFO and each segment is FIFO,
/// so the concatenation preserves offer order exactly.
pub struct RollingQueue<T, C> {
    /// Live segments, head = reader end, tail = writer end. Never empty while
    /// open unless the consumer retired the last sealed head before the
    /// producer appended its successor.
    segments: Mutex<std::collections::VecDeque<Arc<FramedQueue<T, C>>>>,

    factory: SegmentFactory<C>,

    /// Size cap in payload bytes; `u64::MAX` when disabled.
    rollover_size_bytes: u64,

    /// Item-count cap; `u64::MAX` when disabled.
    rollover_every: u64,

    /// Ordinal of the next segment, for the rollover log line.
    next_ordinal: AtomicU64,

    closed: AtomicBool,
}

impl<T: Send, C: DataCodec<T>> RollingQueue<T, C> {
    /// Creates the queue with its first live segment.
    ///
    /// # Errors
    ///
    /// Returns a queue error when the initial segment cannot be created.
    pub fn new(
        factory: SegmentFactory<C>,
        rollover_size_bytes: Option<u64>,
        rollover_every: Option<u64>,
    ) -> Result<Self, QueueError> {
        let first = factory.create::<T>()?;
        let mut segments = std::collections::VecDeque::with_capacity(2);
        segments.push_back(first);

        Ok(Self {
            segments: Mutex::new(segments),
            factory,
            rollover_size_bytes: rollover_size_bytes.unwrap_or(u64::MAX),
            rollover_every: rollover_every.unwrap_or(u64::MAX),
            next_ordinal: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Offers an item to the tail segment, rolling over first when a cap is
    /// reached or the tail is out of space. Producer side only.
    ///
    /// # Errors
    ///
    /// `QueueError::ItemTooLarge` when even a fresh segment cannot hold the
    /// framed item; codec and I/O errors are fatal to the stream.
    pub fn offer(&self, item: &T) -> Result<bool, QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }

        let tail = match self.segments.lock().back().cloned() {
            Some(tail) => tail,
            // The consumer retired the last sealed head before this producer
            // appended a successor; start fresh.
            None => self.push_fresh()?,
        };

        if tail.items_written() >= self.rollover_every
            || tail.bytes_written() >= self.rollover_size_bytes
        {
            tail.seal();
            let fresh = self.push_fresh()?;
            return fresh.offer(item);
        }

        if tail.offer(item)? {
            return Ok(true);
        }

        // Tail ring is out of raw space: seal and retry on a fresh segment.
        // A fresh segment refusing means the item can never fit, which the
        // framed queue reports as `ItemTooLarge` before this point.
        tail.seal();
        let fresh = self.push_fresh()?;
        fresh.offer(item)
    }

    /// Polls the next item across segments, retiring drained sealed heads.
    /// Consumer side only.
    ///
    /// Returns `Ok(None)` both when the queue is empty and in the transient
    /// window where the head is drained but its successor is not yet visible;
    /// callers retry on the next drain pass.
    ///
    /// # Errors
    ///
    /// Codec failures and segment deletion faults are fatal to the stream.
    pub fn poll(&self) -> Result<Option<T>, QueueError> {
        loop {
            let head = match self.segments.lock().front().cloned() {
                Some(head) => head,
                None => return Ok(None),
            };

            match head.poll()? {
                Frame::Item(item) => return Ok(Some(item)),
                Frame::Empty => return Ok(None),
                Frame::Sealed => {
                    {
                        let mut segments = self.segments.lock();
                        if segments
                            .front()
                            .is_some_and(|front| Arc::ptr_eq(front, &head))
                        {
                            segments.pop_front();
                        }
                    }
                    head.close_checked()?;
                    // advance to the successor segment
                }
            }
        }
    }

    /// True when a single live segment remains and it holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let segments = self.segments.lock();
        match segments.len() {
            0 => true,
            1 => segments.front().is_some_and(|only| only.is_empty()),
            _ => false,
        }
    }

    /// Closes and unlinks every live segment. Idempotent; later offers return
    /// `Ok(false)`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<_> = {
            let mut segments = self.segments.lock();
            segments.drain(..).collect()
        };
        tracing::debug!(segments = drained.len(), "closing rolling spool queue");
        for segment in drained {
            segment.close();
        }
    }

    /// Seals nothing; creates a fresh tail segment and appends it.
    fn push_fresh(&self) -> Result<Arc<FramedQueue<T, C>>, QueueError> {
        let fresh = self.factory.create::<T>()?;
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(ordinal, path = %fresh.path().display(), "rolling over to new spool segment");
        self.segments.lock().push_back(Arc::clone(&fresh));
        Ok(fresh)
    }

    #[cfg(test)]
    fn live_segments(&self) -> usize {
        self.segments.lock().len()
    }
}

impl<T, C> std::fmt::Debug for RollingQueue<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingQueue")
            .field("live_segments", &self.segments.lock().len())
            .field("rollover_size_bytes", &self.rollover_size_bytes)
            .field("rollover_every", &self.rollover_every)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
