//! Reactive seams the operator plugs into.
//!
//! A deliberately small pull-based contract:
//!
//! - [`Observer`]: receives `on_next` / `on_error` / `on_completed`
//! - [`Producer`]: receives `request(n)` demand from the consumer
//! - [`Subscriber`]: pairs an observer with an unsubscription chain and a
//!   one-shot producer slot
//! - [`Scheduler`] / [`Worker`]: a `schedule(task)` primitive and nothing
//!   more; drains run on exactly one worker
//!
//! Terminal errors travel as [`StreamError`], a cheaply cloneable wrapper so
//! one stored error can be observed from several code paths.

mod scheduler;
mod subscriber;

pub use scheduler::{EventLoopScheduler, Scheduler, Task, Worker};
pub use subscriber::Subscriber;

use std::fmt;
use std::sync::Arc;

/// Demand sentinel: the consumer (or upstream request) wants everything.
pub const UNBOUNDED: u64 = u64::MAX;

/// Receives stream events.
///
/// `on_error` and `on_completed` are terminal: a well-behaved caller emits at
/// most one of them, after the final `on_next`.
pub trait Observer<T>: Send + Sync {
    /// Called once per item, in stream order.
    fn on_next(&self, item: T);

    /// Called when the stream fails; no further events follow.
    fn on_error(&self, error: StreamError);

    /// Called when the stream completes; no further events follow.
    fn on_completed(&self);
}

/// Receives demand from the consumer.
pub trait Producer: Send + Sync {
    /// Adds `n` items of demand credit. `n == 0` is a no-op; [`UNBOUNDED`]
    /// removes the demand bound entirely.
    fn request(&self, n: u64);
}

/// A cloneable terminal error carried through `on_error`.
#[derive(Clone, Debug)]
pub struct StreamError(Arc<dyn std::error::Error + Send + Sync>);

impl StreamError {
    /// Wraps any error value.
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(error))
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Message-only error payload for [`StreamError::msg`].
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_message() {
        let error = StreamError::msg("queue gave up");
        assert_eq!(error.to_string(), "queue gave up");
        let clone = error.clone();
        assert_eq!(clone.to_string(), "queue gave up");
    }

    #[test]
    fn test_stream_error_wraps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let error = StreamError::new(io);
        assert!(error.to_string().contains("disk on fire"));
    }
}
