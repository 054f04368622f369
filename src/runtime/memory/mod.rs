//! Memory accounting and fixed-capacity object pools
//!
//! All runtime objects live in pools sized once, when the node is
//! initialized. Nothing grows afterwards: an empty free list is reported as
//! [`Error::Exhausted`](crate::Error::Exhausted) to the caller.
//!
//! Every pool, the job table and the per-worker ready buffers report the
//! storage they reserve to a shared [`MemoryTracker`]. Storage is returned
//! when the owning structure is dropped, so after a node has been finalized
//! the tracker must read zero. This is the leak check used by the test
//! suite.

mod pool;

pub use pool::{Handle, Pool, Poolable, MAX_CAPACITY};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TrackerInner {
    /// Bytes of storage reserved by live pools and buffers.
    allocated: AtomicUsize,
    /// Bytes occupied by objects currently acquired from a pool.
    in_use: AtomicUsize,
}

/// Byte accounting shared by a node and everything it allocates.
///
/// Cloning is cheap; all clones observe the same counters, so a caller can
/// keep a clone past [`Node::finalize`](crate::Node::finalize) and check it.
#[derive(Clone, Default)]
pub struct MemoryTracker {
    inner: Arc<TrackerInner>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes reserved by pools and buffers that are still alive.
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::SeqCst)
    }

    /// Bytes held by objects currently acquired from pools.
    #[inline]
    pub fn bytes_in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::SeqCst)
    }

    /// Reserve `bytes` of storage, returned when the reservation drops.
    pub fn reserve(
        &self,
        bytes: usize,
    ) -> MemoryReservation {
        self.inner.allocated.fetch_add(bytes, Ordering::SeqCst);
        MemoryReservation {
            tracker: self.clone(),
            bytes,
        }
    }

    #[inline]
    pub(crate) fn record_acquire(
        &self,
        bytes: usize,
    ) {
        self.inner.in_use.fetch_add(bytes, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn record_release(
        &self,
        bytes: usize,
    ) {
        self.inner.in_use.fetch_sub(bytes, Ordering::SeqCst);
    }
}

impl fmt::Debug for MemoryTracker {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("allocated", &self.bytes_allocated())
            .field("in_use", &self.bytes_in_use())
            .finish()
    }
}

/// A block of tracked storage; un-reserved on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    tracker: MemoryTracker,
    bytes: usize,
}

impl MemoryReservation {
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.tracker
            .inner
            .allocated
            .fetch_sub(self.bytes, Ordering::SeqCst);
    }
}
