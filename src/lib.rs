//! # spoolq
//!
//! A file-backed overflow buffer for pull-based streams.
//!
//! The crate provides an identity operator that sits between a fast producer
//! and a slower consumer. Items the consumer has not yet requested are spooled
//! to disk through memory-mapped segment files, so the in-memory footprint
//! stays bounded no matter how far the consumer lags.
//!
//! ## Design Principles
//!
//! 1. **Never block the producer** - offers are non-blocking; the disk absorbs
//!    the gap between production and consumption rates
//! 2. **No locks on the byte path** - a single-producer single-consumer ring
//!    over one mapped file, synchronized with acquire/release cursor stores
//! 3. **Bounded memory** - resident bytes are proportional to the per-segment
//!    capacity, not to the number of buffered items
//! 4. **Exactly-one drain** - emissions to the consumer run on one scheduler
//!    worker, gated so the drain task never overlaps itself
//!
//! ## Example
//!
//! ```rust,ignore
//! use spoolq::{BufferToFile, EventLoopScheduler, FnCodec, SpoolConfig, Subscriber};
//! use std::sync::Arc;
//!
//! let codec = FnCodec::new(
//!     |item: &u64, out: &mut Vec<u8>| Ok(out.extend_from_slice(&item.to_le_bytes())),
//!     |bytes| Ok(u64::from_le_bytes(bytes.try_into()?)),
//! );
//! let config = SpoolConfig::builder()
//!     .buffer_size_bytes(1 << 20)
//!     .rollover_every(100_000)
//!     .build()?;
//!
//! let operator = BufferToFile::new(codec, Arc::new(EventLoopScheduler::new()), config);
//! let child = Arc::new(Subscriber::new(my_consumer));
//! let parent = operator.apply(child)?;
//! // feed `parent` from the upstream source; `my_consumer` pulls at its own pace
//! ```
//!
//! ## Module Structure
//!
//! - [`ring`]: memory-mapped SPSC byte ring (the storage primitive)
//! - [`queue`]: length-prefixed framing and the rolling multi-segment queue
//! - [`stream`]: the reactive seams (observer, producer, scheduler, subscriber)
//! - [`operator`]: the drain coordinator and the operator facade
//! - [`config`]: spool options and validation
//! - [`codec`]: the user-supplied item encode/decode seam

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Unsafe is confined to the ring and queue modules for mapped-memory access
#![allow(unsafe_code)]

pub mod codec;
pub mod config;
pub mod operator;
pub mod queue;
pub mod ring;
pub mod stream;

pub use codec::{DataCodec, FnCodec};
pub use config::{SpoolConfig, SpoolConfigBuilder};
pub use operator::BufferToFile;
pub use stream::{
    EventLoopScheduler, Observer, Producer, Scheduler, StreamError, Subscriber, Worker, UNBOUNDED,
};

/// Result type for spoolq operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for spoolq.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation errors.
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Byte-ring storage errors.
    #[error("ring error: {0}")]
    Ring(#[from] ring::RingError),

    /// Spool queue errors.
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}
