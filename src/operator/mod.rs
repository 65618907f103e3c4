//! The buffer-to-file operator.
//!
//! Couples the file-backed spool queue to a downstream consumer's demand:
//!
//! - [`drain`](self): the coordinator that moves items from the queue to the
//!   consumer on a single scheduler worker, honoring demand credit and the
//!   terminal-event policy
//! - [`BufferToFile`]: the facade that builds the queue, wires the producer
//!   and consumer, and registers the teardown chain
//!
//! ## Event flow
//!
//! ```text
//! upstream ──on_next──▶ parent Subscriber ──offer──▶ spool queue (files)
//!                                                        │ poll
//!                                                        ▼
//! consumer ◀──on_next── drain task (worker) ◀──schedule── drain gate
//!     │                                                     ▲
//!     └───────────────── request(n) ────────────────────────┘
//! ```

mod buffer_to_file;
mod drain;

pub use buffer_to_file::BufferToFile;
