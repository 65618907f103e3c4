//! The operator facade: installs the spool into a reactive chain.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::DataCodec;
use crate::config::SpoolConfig;
use crate::queue::{FramedQueue, QueueError, RollingQueue, SegmentFactory, SpoolQueueImpl};
use crate::stream::{Observer, Scheduler, StreamError, Subscriber, UNBOUNDED};

use super::drain::DrainCoordinator;

/// An identity transform on a demand-driven stream that spools the gap
/// between producer and consumer to disk.
///
/// Applying the operator to a downstream subscriber yields the subscriber to
/// hand upstream: items flow through unchanged and in order, terminal events
/// are preserved (modulo the `delay_error` policy), and the consumer's
/// `request(n)` credit is respected. Upstream stays free-running, because the
/// file-backed queue, not memory, absorbs the difference.
pub struct BufferToFile<T, C> {
    codec: Arc<C>,
    scheduler: Arc<dyn Scheduler>,
    config: SpoolConfig,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T, C> BufferToFile<T, C>
where
    T: Send + std::fmt::Debug + 'static,
    C: DataCodec<T>,
{
    /// Creates the operator from a codec, a scheduler, and a validated
    /// configuration.
    pub fn new(codec: C, scheduler: Arc<dyn Scheduler>, config: SpoolConfig) -> Self {
        Self {
            codec: Arc::new(codec),
            scheduler,
            config,
            _marker: PhantomData,
        }
    }

    /// Subscribes `child` through the spool and returns the subscriber to
    /// feed from upstream.
    ///
    /// On success the child's producer is installed (deferred demand flows
    /// immediately), the teardown chain is registered on the child in release
    /// order (upstream link, then queue, then worker), and the returned
    /// parent has already requested unbounded demand from upstream.
    ///
    /// # Errors
    ///
    /// Returns the error when the initial segment file cannot be created or
    /// mapped.
    pub fn apply(&self, child: Arc<Subscriber<T>>) -> crate::Result<Arc<Subscriber<T>>> {
        let queue = Arc::new(self.build_queue()?);
        let worker = self.scheduler.create_worker();
        let coordinator = DrainCoordinator::new(
            Arc::clone(&queue),
            Arc::clone(&child),
            Arc::clone(&worker),
            self.config.delay_error,
        );

        child.set_producer(coordinator.clone());

        let parent = Arc::new(Subscriber::new(DrainObserver {
            coordinator: Arc::clone(&coordinator),
        }));

        // Release order: stop the upstream link first, then delete the
        // segment files, and only then let the worker go, so terminal events
        // already in flight can still be delivered.
        {
            let parent = Arc::clone(&parent);
            child.add_cleanup(Box::new(move || parent.unsubscribe()));
        }
        {
            let queue = Arc::clone(&queue);
            child.add_cleanup(Box::new(move || {
                crate::queue::SpoolQueue::close(queue.as_ref());
            }));
        }
        {
            let worker = Arc::clone(&worker);
            child.add_cleanup(Box::new(move || worker.unsubscribe()));
        }

        // The spool is the bound, not upstream demand.
        parent.request(UNBOUNDED);

        Ok(parent)
    }

    fn build_queue(&self) -> Result<SpoolQueueImpl<T, C>, QueueError> {
        if self.config.rolls_over() {
            let factory = SegmentFactory::new(
                self.config.buffer_size_bytes,
                Arc::clone(&self.config.file_factory),
                Arc::clone(&self.codec),
            );
            Ok(SpoolQueueImpl::Rolling(RollingQueue::new(
                factory,
                self.config.rollover_size_bytes,
                self.config.rollover_every,
            )?))
        } else {
            let path = (self.config.file_factory)();
            Ok(SpoolQueueImpl::Single(FramedQueue::create(
                path,
                self.config.buffer_size_bytes,
                Arc::clone(&self.codec),
            )?))
        }
    }
}

/// Upstream-facing observer forwarding into the drain coordinator.
struct DrainObserver<T, C>
where
    T: Send + std::fmt::Debug + 'static,
    C: DataCodec<T>,
{
    coordinator: Arc<DrainCoordinator<T, SpoolQueueImpl<T, C>>>,
}

impl<T, C> Observer<T> for DrainObserver<T, C>
where
    T: Send + std::fmt::Debug + 'static,
    C: DataCodec<T>,
{
    fn on_next(&self, item: T) {
        self.coordinator.on_next(item);
    }

    fn on_error(&self, error: StreamError) {
        self.coordinator.on_error(error);
    }

    fn on_completed(&self) {
        self.coordinator.on_completed();
    }
}
