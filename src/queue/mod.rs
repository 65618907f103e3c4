//! File-backed SPSC spool queues.
//!
//! Two layers over the byte ring:
//!
//! - [`FramedQueue`]: length-prefixed frames over one ring in one file, with
//!   a reserved seal sentinel that marks the end of a segment
//! - [`RollingQueue`]: an ordered sequence of framed segments with rollover
//!   (seal the tail, start a fresh file) and retirement (delete a drained
//!   head)
//!
//! The drain coordinator consumes both through [`SpoolQueue`]; seal handling
//! never leaks above the rolling queue.

mod framed;
mod rolling;

pub use framed::{Frame, FramedQueue};
pub use rolling::{RollingQueue, SegmentFactory};

use crate::ring::RingError;

/// Error type for spool queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The underlying byte ring faulted.
    #[error("ring failure: {0}")]
    Ring(#[from] RingError),

    /// Segment file creation or deletion failed.
    #[error("segment I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The user codec failed to encode or decode an item.
    #[error("codec failure: {0}")]
    Codec(#[source] crate::codec::CodecError),

    /// A single framed item can never fit a segment of this capacity.
    #[error("framed item of {frame} bytes can never fit a segment of {capacity} bytes")]
    ItemTooLarge {
        /// Total frame size (prefix plus payload) of the offending item.
        frame: u64,
        /// Per-segment ring capacity.
        capacity: u64,
    },
}

/// The contract the drain coordinator pulls from.
///
/// Exactly one thread offers and exactly one thread polls; both operations
/// are non-blocking.
pub trait SpoolQueue<T>: Send + Sync {
    /// Offers an item. `Ok(false)` means the queue had no room.
    ///
    /// # Errors
    ///
    /// Codec, ring, and oversize-item failures are fatal to the stream.
    fn offer(&self, item: &T) -> Result<bool, QueueError>;

    /// Polls the next item, or `None` when nothing is currently readable.
    ///
    /// # Errors
    ///
    /// Codec and segment I/O failures are fatal to the stream.
    fn poll(&self) -> Result<Option<T>, QueueError>;

    /// True when no buffered item remains.
    fn is_empty(&self) -> bool;

    /// Releases every resource the queue holds (mappings, files). Idempotent.
    fn close(&self);
}

/// Statically dispatched queue selection for the operator.
///
/// A single segment suffices when neither rollover cap is configured; the
/// rolling queue takes over otherwise.
pub enum SpoolQueueImpl<T, C> {
    /// One framed segment, never sealed.
    Single(FramedQueue<T, C>),
    /// Rollover across framed segments.
    Rolling(RollingQueue<T, C>),
}

impl<T: Send, C: crate::codec::DataCodec<T>> SpoolQueue<T> for SpoolQueueImpl<T, C> {
    fn offer(&self, item: &T) -> Result<bool, QueueError> {
        match self {
            Self::Single(queue) => queue.offer(item),
            Self::Rolling(queue) => queue.offer(item),
        }
    }

    fn poll(&self) -> Result<Option<T>, QueueError> {
        match self {
            Self::Single(queue) => match queue.poll()? {
                Frame::Item(item) => Ok(Some(item)),
                Frame::Empty | Frame::Sealed => Ok(None),
            },
            Self::Rolling(queue) => queue.poll(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Single(queue) => queue.is_empty(),
            Self::Rolling(queue) => queue.is_empty(),
        }
    }

    fn close(&self) {
        match self {
            Self::Single(queue) => queue.close(),
            Self::Rolling(queue) => queue.close(),
        }
    }
}
