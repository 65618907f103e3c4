//! Subscriber: an observer plus lifecycle plumbing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Observer, Producer, StreamError};

/// Pairs an [`Observer`] with an unsubscription chain and a producer slot.
///
/// The producer slot is one-shot: demand requested before a producer is
/// installed accumulates, and flows through the moment the subscription
/// wiring sets it. Cleanup actions registered with
/// [`add_cleanup`](Self::add_cleanup) run exactly once, in registration
/// order, when the subscriber unsubscribes.
pub struct Subscriber<T> {
    observer: Box<dyn Observer<T>>,
    unsubscribed: AtomicBool,
    cleanups: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    demand: Mutex<DemandSlot>,
}

enum DemandSlot {
    /// No producer yet; accumulated demand to forward when one arrives.
    Deferred(u64),
    /// Wired: demand flows straight through.
    Linked(Arc<dyn Producer>),
}

impl<T> Subscriber<T> {
    /// Wraps an observer.
    pub fn new(observer: impl Observer<T> + 'static) -> Self {
        Self {
            observer: Box::new(observer),
            unsubscribed: AtomicBool::new(false),
            cleanups: Mutex::new(Vec::new()),
            demand: Mutex::new(DemandSlot::Deferred(0)),
        }
    }

    /// Forwards an item unless unsubscribed.
    pub fn on_next(&self, item: T) {
        if !self.is_unsubscribed() {
            self.observer.on_next(item);
        }
    }

    /// Forwards a terminal error unless unsubscribed.
    pub fn on_error(&self, error: StreamError) {
        if !self.is_unsubscribed() {
            self.observer.on_error(error);
        }
    }

    /// Forwards completion unless unsubscribed.
    pub fn on_completed(&self) {
        if !self.is_unsubscribed() {
            self.observer.on_completed();
        }
    }

    /// Requests `n` more items from the producer, deferring until one is set.
    pub fn request(&self, n: u64) {
        let producer = {
            let mut slot = self.demand.lock();
            match &mut *slot {
                DemandSlot::Deferred(pending) => {
                    *pending = pending.saturating_add(n);
                    None
                }
                DemandSlot::Linked(producer) => Some(Arc::clone(producer)),
            }
        };
        if let Some(producer) = producer {
            producer.request(n);
        }
    }

    /// Installs the producer, forwarding any deferred demand. One-shot: a
    /// later call replaces the producer but deferred demand flows only once.
    pub fn set_producer(&self, producer: Arc<dyn Producer>) {
        let deferred = {
            let mut slot = self.demand.lock();
            let pending = match &*slot {
                DemandSlot::Deferred(pending) => *pending,
                DemandSlot::Linked(_) => 0,
            };
            *slot = DemandSlot::Linked(Arc::clone(&producer));
            pending
        };
        if deferred > 0 {
            producer.request(deferred);
        }
    }

    /// Registers a cleanup action. Runs immediately when the subscriber is
    /// already unsubscribed.
    pub fn add_cleanup(&self, action: Box<dyn FnOnce() + Send>) {
        {
            let mut cleanups = self.cleanups.lock();
            if !self.unsubscribed.load(Ordering::Acquire) {
                cleanups.push(action);
                return;
            }
        }
        action();
    }

    /// Unsubscribes: suppresses further events and runs the cleanup chain in
    /// registration order. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        let actions = {
            let mut cleanups = self.cleanups.lock();
            std::mem::take(&mut *cleanups)
        };
        for action in actions {
            action();
        }
    }

    /// True once [`unsubscribe`](Self::unsubscribe) ran.
    #[must_use]
    pub fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct Recorder {
        items: Mutex<Vec<u32>>,
        errors: Mutex<Vec<String>>,
        completions: AtomicU64,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
                completions: AtomicU64::new(0),
            })
        }
    }

    impl Observer<u32> for Arc<Recorder> {
        fn on_next(&self, item: u32) {
            self.items.lock().push(item);
        }

        fn on_error(&self, error: StreamError) {
            self.errors.lock().push(error.to_string());
        }

        fn on_completed(&self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingProducer(AtomicU64);

    impl Producer for Arc<CountingProducer> {
        fn request(&self, n: u64) {
            self.0.fetch_add(n, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_forwards_events() {
        let recorder = Recorder::new();
        let subscriber = Subscriber::new(Arc::clone(&recorder));

        subscriber.on_next(1);
        subscriber.on_next(2);
        subscriber.on_completed();

        assert_eq!(*recorder.items.lock(), vec![1, 2]);
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_suppresses_after_unsubscribe() {
        let recorder = Recorder::new();
        let subscriber = Subscriber::new(Arc::clone(&recorder));

        subscriber.on_next(1);
        subscriber.unsubscribe();
        subscriber.on_next(2);
        subscriber.on_error(StreamError::msg("late"));
        subscriber.on_completed();

        assert_eq!(*recorder.items.lock(), vec![1]);
        assert!(recorder.errors.lock().is_empty());
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deferred_demand_flows_on_set_producer() {
        let recorder = Recorder::new();
        let subscriber = Subscriber::new(Arc::clone(&recorder));

        subscriber.request(3);
        subscriber.request(4);

        let producer = Arc::new(CountingProducer(AtomicU64::new(0)));
        subscriber.set_producer(Arc::new(Arc::clone(&producer)));
        assert_eq!(producer.0.load(Ordering::SeqCst), 7);

        subscriber.request(5);
        assert_eq!(producer.0.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_cleanup_runs_in_order_once() {
        let recorder = Recorder::new();
        let subscriber = Subscriber::new(Arc::clone(&recorder));

        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["parent", "queue", "worker"] {
            let order = Arc::clone(&order);
            subscriber.add_cleanup(Box::new(move || order.lock().push(tag)));
        }

        subscriber.unsubscribe();
        subscriber.unsubscribe();
        assert_eq!(*order.lock(), vec!["parent", "queue", "worker"]);
    }

    #[test]
    fn test_cleanup_after_unsubscribe_runs_immediately() {
        let recorder = Recorder::new();
        let subscriber = Subscriber::new(Arc::clone(&recorder));
        subscriber.unsubscribe();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        subscriber.add_cleanup(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }
}
