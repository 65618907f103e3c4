//! Drain scheduling.
//!
//! The operator needs exactly one primitive from its environment: a worker
//! that runs queued tasks one at a time, in submission order. [`Scheduler`]
//! hands out such workers; [`EventLoopScheduler`] is the stock
//! implementation, one dedicated thread per worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

/// A task the worker runs to completion before taking the next one.
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs tasks strictly one at a time, in submission order.
pub trait Worker: Send + Sync {
    /// Enqueues a task. Tasks scheduled after [`unsubscribe`](Self::unsubscribe)
    /// are silently dropped.
    fn schedule(&self, task: Task);

    /// Stops the worker after the task currently running, if any. Idempotent,
    /// non-blocking, and safe to call from the worker's own thread.
    fn unsubscribe(&self);

    /// True once [`unsubscribe`](Self::unsubscribe) ran.
    fn is_unsubscribed(&self) -> bool;
}

/// Hands out independent [`Worker`]s.
pub trait Scheduler: Send + Sync {
    /// Creates a fresh worker. Each worker serializes its own tasks; distinct
    /// workers are independent.
    fn create_worker(&self) -> Arc<dyn Worker>;
}

/// A [`Scheduler`] backed by one dedicated thread per worker.
#[derive(Debug, Default)]
pub struct EventLoopScheduler;

impl EventLoopScheduler {
    /// Creates the scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for EventLoopScheduler {
    fn create_worker(&self) -> Arc<dyn Worker> {
        let (sender, receiver) = mpsc::channel::<Task>();
        thread::spawn(move || {
            while let Ok(task) = receiver.recv() {
                task();
            }
        });
        Arc::new(EventLoopWorker {
            sender: Mutex::new(Some(sender)),
            unsubscribed: AtomicBool::new(false),
        })
    }
}

/// Worker over one event-loop thread.
struct EventLoopWorker {
    /// Dropping the sender ends the thread's receive loop.
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    unsubscribed: AtomicBool,
}

impl Worker for EventLoopWorker {
    fn schedule(&self, task: Task) {
        if self.unsubscribed.load(Ordering::Acquire) {
            return;
        }
        if let Some(sender) = &*self.sender.lock() {
            // A send error means the thread is gone; the task is dropped,
            // matching the post-unsubscribe contract.
            let _ = sender.send(task);
        }
    }

    fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Never joins: the worker thread may be the caller. It exits on its
        // own once the channel disconnects.
        self.sender.lock().take();
    }

    fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, check: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::yield_now();
        }
        check()
    }

    #[test]
    fn test_runs_tasks_in_order() {
        let worker = EventLoopScheduler::new().create_worker();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10u64 {
            let log = Arc::clone(&log);
            worker.schedule(Box::new(move || log.lock().push(i)));
        }

        assert!(wait_until(Duration::from_secs(5), || log.lock().len() == 10));
        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
        worker.unsubscribe();
    }

    #[test]
    fn test_unsubscribe_drops_later_tasks() {
        let worker = EventLoopScheduler::new().create_worker();
        let ran = Arc::new(AtomicU64::new(0));

        {
            let ran = Arc::clone(&ran);
            worker.schedule(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(wait_until(Duration::from_secs(5), || {
            ran.load(Ordering::SeqCst) == 1
        }));

        worker.unsubscribe();
        assert!(worker.is_unsubscribed());
        {
            let ran = Arc::clone(&ran);
            worker.schedule(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_from_own_thread() {
        let worker = EventLoopScheduler::new().create_worker();
        let done = Arc::new(AtomicBool::new(false));

        {
            let worker_handle = Arc::clone(&worker);
            let done = Arc::clone(&done);
            worker.schedule(Box::new(move || {
                worker_handle.unsubscribe();
                done.store(true, Ordering::SeqCst);
            }));
        }

        assert!(wait_until(Duration::from_secs(5), || done
            .load(Ordering::SeqCst)));
        assert!(worker.is_unsubscribed());
    }

    #[test]
    fn test_workers_are_independent() {
        let scheduler = EventLoopScheduler::new();
        let first = scheduler.create_worker();
        let second = scheduler.create_worker();

        first.unsubscribe();
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            second.schedule(Box::new(move || ran.store(true, Ordering::SeqCst)));
        }
        assert!(wait_until(Duration::from_secs(5), || ran
            .load(Ordering::SeqCst)));
        second.unsubscribe();
    }
}
