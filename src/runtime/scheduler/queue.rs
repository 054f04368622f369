//! Ready structures for the scheduler
//!
//! Each worker owns a [`PriorityTaskQueue`] with one FIFO band per priority.
//! Runnable ordered queues are announced through a [`HandleQueue`], either
//! the one of the worker they are bound to or the shared one.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::task::{TaskHandle, TaskPriority};
use crate::runtime::affinity::Affinity;

/// A task waiting in a worker's ready structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEntry {
    pub task: TaskHandle,
    /// Cores allowed to run it; consulted when stealing.
    pub affinity: Affinity,
}

/// A thread-safe FIFO of copyable handles.
#[derive(Debug)]
pub struct HandleQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T: Copy + PartialEq> HandleQueue<T> {
    /// Create a queue with room for `capacity` entries.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Push to the back of the queue.
    #[inline]
    pub fn push(
        &self,
        item: T,
    ) {
        self.inner.lock().push_back(item);
    }

    /// Pop from the front of the queue.
    #[inline]
    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Remove every occurrence of `item`.
    pub fn remove(
        &self,
        item: T,
    ) {
        self.inner.lock().retain(|queued| *queued != item);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Priority-aware ready queue.
///
/// Higher bands are drained first; within a band tasks run in FIFO order.
#[derive(Debug)]
pub struct PriorityTaskQueue {
    bands: [Mutex<VecDeque<ReadyEntry>>; TaskPriority::COUNT],
}

impl PriorityTaskQueue {
    /// Create a queue whose bands each start with room for `capacity` tasks.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bands: std::array::from_fn(|_| Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Push a task with the given priority.
    pub fn push(
        &self,
        entry: ReadyEntry,
        priority: TaskPriority,
    ) {
        self.bands[priority.band()].lock().push_back(entry);
    }

    /// Pop the highest priority task available.
    pub fn pop(&self) -> Option<ReadyEntry> {
        self.bands
            .iter()
            .rev()
            .find_map(|band| band.lock().pop_front())
    }

    /// Take a task on behalf of another core.
    ///
    /// Less important tasks are stolen first, from the back of their band,
    /// and only tasks whose affinity admits `thief` are eligible.
    pub fn steal_for(
        &self,
        thief: usize,
    ) -> Option<ReadyEntry> {
        self.bands.iter().find_map(|band| {
            let mut band = band.lock();
            let position = band.iter().rposition(|entry| entry.affinity.contains(thief))?;
            band.remove(position)
        })
    }

    /// Take a task out wherever it waits. Returns whether it was found.
    pub fn remove(
        &self,
        task: TaskHandle,
    ) -> bool {
        self.bands.iter().any(|band| {
            let mut band = band.lock();
            match band.iter().position(|entry| entry.task == task) {
                Some(position) => band.remove(position).is_some(),
                None => false,
            }
        })
    }

    /// Get total number of tasks.
    pub fn len(&self) -> usize {
        self.bands.iter().map(|band| band.lock().len()).sum()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bands.iter().all(|band| band.lock().is_empty())
    }
}
