use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Bounded, fire-and-forget executor for cache rebuilds.
///
/// Work only starts once a slot has been reserved with [`RebuildDispatcher::try_reserve`],
/// which never waits. When all `max_concurrent_rebuilds` slots are busy the caller is told
/// so and nothing is queued, so neither running nor parked rebuilds can pile up behind a
/// slow store.
#[derive(Clone)]
pub struct RebuildDispatcher {
    semaphore: Arc<Semaphore>,
}

/// A reserved worker slot. Dropping it without spawning frees the slot.
#[derive(Debug)]
pub struct RebuildSlot {
    _permit: OwnedSemaphorePermit,
}

impl RebuildDispatcher {
    pub fn new(max_concurrent_rebuilds: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_rebuilds)),
        }
    }

    /// `None` when every slot is taken.
    pub fn try_reserve(&self) -> Option<RebuildSlot> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| RebuildSlot { _permit: permit })
    }

    /// Run `work` on a reserved slot, which stays taken until `work` finishes or panics.
    /// The handle can be awaited in tests; production callers drop it.
    pub fn spawn<F>(&self, slot: RebuildSlot, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(async move {
            let _slot = slot;
            work.await
        })
    }

    /// Slots not currently reserved
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
