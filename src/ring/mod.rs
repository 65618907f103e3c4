//! Memory-mapped SPSC byte ring.
//!
//! The storage primitive under the spool queue: a fixed-capacity circular
//! byte buffer physically stored in one file, shared between exactly one
//! writer thread and one reader thread.
//!
//! ## Design
//!
//! - One file, pre-sized to the configured capacity and mapped read-write
//! - Two monotonically increasing cursors (never wrapped); the physical
//!   offset is `cursor % capacity`
//! - Cache-padded cursors prevent false sharing between the two threads
//! - The writer publishes bytes with a single Release store of the write
//!   cursor; the reader Acquires it before touching payload bytes, so a
//!   partially written region is never observable

mod mapped;
mod padded;

pub use mapped::{MappedByteRing, RingError};
pub use padded::CachePadded;
