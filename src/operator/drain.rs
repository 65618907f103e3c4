//! The drain coordinator: demand credit, the drain gate, and terminal policy.
//!
//! ## State
//!
//! - `requested`: outstanding demand credit. Saturating adds; `u64::MAX` is
//!   the unbounded sentinel and is never decremented.
//! - `drain_requested`: pending drain counter. The 0→1 transition schedules
//!   the drain task; higher values tell a running drain to go around again.
//!   After a terminal event it is deliberately left positive so no further
//!   drain can ever be scheduled.
//! - `done` / `error`: upstream termination. The error slot is written before
//!   `done` is published.
//!
//! At most one drain task is ever active: only the 0→1 winner schedules, and
//! the task itself re-arms the gate by storing 1 at the top of each pass.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::queue::SpoolQueue;
use crate::stream::{Producer, StreamError, Subscriber, Worker, UNBOUNDED};

/// Operator-level state machine between the spool queue and the consumer.
pub(crate) struct DrainCoordinator<T, Q> {
    queue: Arc<Q>,
    child: Arc<Subscriber<T>>,
    worker: Arc<dyn Worker>,
    delay_error: bool,

    /// Outstanding demand credit from the consumer.
    requested: AtomicU64,

    /// Pending drain counter; see the module docs.
    drain_requested: AtomicUsize,

    /// Upstream terminated (completed or errored).
    done: AtomicBool,

    /// Terminal error; written before `done` is set.
    error: Mutex<Option<StreamError>>,

    /// Handle back to this coordinator for scheduling drain tasks.
    me: Weak<Self>,
}

impl<T, Q> DrainCoordinator<T, Q>
where
    T: Send + std::fmt::Debug + 'static,
    Q: SpoolQueue<T> + 'static,
{
    pub(crate) fn new(
        queue: Arc<Q>,
        child: Arc<Subscriber<T>>,
        worker: Arc<dyn Worker>,
        delay_error: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            queue,
            child,
            worker,
            delay_error,
            requested: AtomicU64::new(0),
            drain_requested: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
            me: me.clone(),
        })
    }

    /// Upstream item: spool it and trigger a drain. A refused offer is the
    /// fatal queue-full condition.
    pub(crate) fn on_next(&self, item: T) {
        let accepted = match self.queue.offer(&item) {
            Ok(accepted) => accepted,
            Err(error) => {
                self.on_error(StreamError::new(error));
                return;
            }
        };
        if accepted {
            self.drain();
        } else {
            self.on_error(StreamError::msg(format!(
                "could not place item on queue (offer returned false), item={item:?}"
            )));
        }
    }

    /// Upstream error: record it, mark done, trigger a drain.
    pub(crate) fn on_error(&self, error: StreamError) {
        // The error slot must be populated before `done` is published so the
        // drain's read after observing `done` sees it.
        *self.error.lock() = Some(error);
        self.done.store(true, Ordering::Release);
        self.drain();
    }

    /// Upstream completion: mark done, trigger a drain.
    pub(crate) fn on_completed(&self) {
        self.done.store(true, Ordering::Release);
        self.drain();
    }

    /// Schedules the drain task iff none is pending or running.
    fn drain(&self) {
        if self.child.is_unsubscribed() {
            return;
        }
        if self.drain_requested.fetch_add(1, Ordering::AcqRel) == 0 {
            if let Some(this) = self.me.upgrade() {
                self.worker.schedule(Box::new(move || this.run_drain()));
            }
        }
    }

    /// Drain task entry point; queue failures route to the consumer.
    fn run_drain(&self) {
        if let Err(error) = self.drain_now() {
            tracing::warn!(error = %error, "spool drain failed");
            self.queue.close();
            self.child.on_error(StreamError::new(error));
            self.child.unsubscribe();
        }
    }

    fn drain_now(&self) -> Result<(), crate::queue::QueueError> {
        loop {
            // Re-arm the gate: requests arriving from here on must loop us
            // around again rather than schedule a second task.
            self.drain_requested.store(1, Ordering::Release);
            if self.child.is_unsubscribed() {
                // Leave drain_requested positive: no more scheduling.
                return Ok(());
            }

            let mut requests = self.requested.load(Ordering::Acquire);
            let mut emitted: u64 = 0;
            while requests > 0 {
                match self.queue.poll()? {
                    None => {
                        if self.finished() {
                            return Ok(());
                        }
                        // Another drain was requested; refresh the counters
                        // on the outer loop.
                        break;
                    }
                    Some(item) => {
                        self.child.on_next(item);
                        requests -= 1;
                        emitted += 1;
                    }
                }
            }

            if emitted != 0 {
                requests = self.sub_requested(emitted);
            }
            if self.child.is_unsubscribed() || (requests == 0 && self.finished()) {
                return Ok(());
            }
        }
    }

    /// Termination policy, consulted when the queue looks empty or demand ran
    /// out. Returns true when the drain pass is over.
    fn finished(&self) -> bool {
        if !self.done.load(Ordering::Acquire) {
            // No more work iff nobody requested a drain since the gate was
            // re-armed.
            return self.try_disarm();
        }

        let error = self.error.lock().clone();
        if self.queue.is_empty() {
            self.terminate(error);
            return true;
        }
        if let Some(error) = error {
            if !self.delay_error {
                // Shortcut past the buffered items.
                self.terminate(Some(error));
                return true;
            }
        }
        // Buffered items must still be delivered (completion, or an error
        // with delay_error set); keep draining as demand allows.
        self.try_disarm()
    }

    /// Delivers the terminal event with the queue already closed, then runs
    /// the unsubscription chain. `drain_requested` stays positive so no drain
    /// is ever scheduled again.
    fn terminate(&self, error: Option<StreamError>) {
        self.queue.close();
        match error {
            Some(error) => self.child.on_error(error),
            None => self.child.on_completed(),
        }
        self.child.unsubscribe();
    }

    fn try_disarm(&self) -> bool {
        self.drain_requested
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Adds demand, saturating at the unbounded sentinel.
    fn add_requested(&self, n: u64) {
        let _ = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n))
            });
    }

    /// Subtracts emissions from the demand counter, returning the new value.
    /// Unbounded demand is never decremented.
    fn sub_requested(&self, emitted: u64) -> u64 {
        let previous = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == UNBOUNDED {
                    Some(current)
                } else {
                    Some(current.saturating_sub(emitted))
                }
            })
            .unwrap_or(0);
        if previous == UNBOUNDED {
            UNBOUNDED
        } else {
            previous.saturating_sub(emitted)
        }
    }
}

impl<T, Q> Producer for DrainCoordinator<T, Q>
where
    T: Send + std::fmt::Debug + 'static,
    Q: SpoolQueue<T> + 'static,
{
    fn request(&self, n: u64) {
        if n > 0 {
            self.add_requested(n);
            self.drain();
        }
    }
}
