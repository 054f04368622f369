//! Ordered queues
//!
//! Tasks started into a queue run one at a time, in start order. The queue
//! is pulled by workers: while it has pending tasks and none is active, it
//! is announced to the scheduler once; the worker that picks it up runs the
//! head, and finishing the head announces the queue again.

use std::collections::VecDeque;
use std::fmt;
use std::mem;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::duration::Timeout;
use crate::error::{Error, ObjectKind, Result};
use crate::runtime::memory::{Handle, Poolable};
use crate::runtime::scheduler::TaskHandle;

/// Handle to an ordered queue.
pub type QueueHandle = Handle<Queue>;

/// Options for `queue_create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueAttributes {
    /// Worker that runs every member; any worker when `None`.
    pub core: Option<usize>,
    /// Keep pending members when the queue is disabled instead of
    /// cancelling them.
    pub retain: bool,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            core: None,
            retain: true,
        }
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    attributes: QueueAttributes,
    pending: VecDeque<TaskHandle>,
    active: Option<TaskHandle>,
    enabled: bool,
    /// Announced to the scheduler and not yet claimed.
    scheduled: bool,
    next_sequence: u64,
}

impl QueueInner {
    #[inline]
    fn is_idle(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }

    /// Announce the queue if its head can run now.
    fn wants_schedule(&mut self) -> bool {
        if self.active.is_none() && !self.pending.is_empty() && !self.scheduled {
            self.scheduled = true;
            true
        } else {
            false
        }
    }
}

/// A queue record.
pub struct Queue {
    inner: Mutex<QueueInner>,
    idle: Condvar,
    limit: usize,
}

impl Queue {
    /// Queue holding at most `limit` pending tasks.
    pub fn with_limit(limit: usize) -> Self {
        let inner = QueueInner {
            pending: VecDeque::with_capacity(limit),
            ..QueueInner::default()
        };
        Self {
            inner: Mutex::new(inner),
            idle: Condvar::new(),
            limit,
        }
    }

    pub(crate) fn configure(
        &self,
        attributes: QueueAttributes,
    ) {
        let mut inner = self.inner.lock();
        inner.attributes = attributes;
        inner.enabled = true;
        inner.next_sequence = 0;
    }

    /// Append a task. Returns its sequence number and whether the queue
    /// must be announced to the scheduler.
    pub(crate) fn enqueue(
        &self,
        task: TaskHandle,
    ) -> Result<(u64, bool)> {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return Err(Error::QueueDisabled);
        }
        if inner.pending.len() >= self.limit {
            return Err(Error::Exhausted(ObjectKind::Queue));
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.pending.push_back(task);
        Ok((sequence, inner.wants_schedule()))
    }

    /// Take the head for execution.
    pub(crate) fn claim(&self) -> Option<TaskHandle> {
        let mut inner = self.inner.lock();
        inner.scheduled = false;
        if inner.active.is_some() {
            return None;
        }
        let head = inner.pending.pop_front()?;
        inner.active = Some(head);
        Some(head)
    }

    /// The claimed head turned out not to be runnable (cancelled or stale).
    pub(crate) fn skip(
        &self,
        task: TaskHandle,
    ) {
        let mut inner = self.inner.lock();
        if inner.active == Some(task) {
            inner.active = None;
        }
        if inner.is_idle() {
            self.idle.notify_all();
        }
    }

    /// A member reached a terminal state. Returns whether the queue must be
    /// announced again.
    pub(crate) fn finish(
        &self,
        task: TaskHandle,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.active == Some(task) {
            inner.active = None;
        } else if let Some(position) = inner.pending.iter().position(|&p| p == task) {
            inner.pending.remove(position);
        }
        if inner.is_idle() {
            self.idle.notify_all();
        }
        inner.wants_schedule()
    }

    pub(crate) fn enable(&self) {
        self.inner.lock().enabled = true;
    }

    /// Reject new tasks. Unless the queue retains its members, pending ones
    /// are removed and returned for cancellation.
    pub(crate) fn disable(&self) -> Vec<TaskHandle> {
        let mut inner = self.inner.lock();
        inner.enabled = false;
        if inner.attributes.retain {
            Vec::new()
        } else {
            inner.pending.drain(..).collect()
        }
    }

    /// Block until nothing is pending or active.
    pub(crate) fn wait_idle(
        &self,
        timeout: Timeout,
    ) -> Result<()> {
        let deadline = timeout.deadline();
        let mut inner = self.inner.lock();
        while !inner.is_idle() {
            match deadline {
                None => self.idle.wait(&mut inner),
                Some(deadline) => {
                    if self.idle.wait_until(&mut inner, deadline).timed_out() && !inner.is_idle() {
                        return Err(Error::Timeout);
                    }
                },
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    #[inline]
    pub fn bound_core(&self) -> Option<usize> {
        self.inner.lock().attributes.core
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    #[inline]
    pub fn active(&self) -> Option<TaskHandle> {
        self.inner.lock().active
    }
}

impl Poolable for Queue {
    const KIND: ObjectKind = ObjectKind::Queue;

    fn reset(&self) {
        let mut inner = self.inner.lock();
        let mut pending = mem::take(&mut inner.pending);
        pending.clear();
        *inner = QueueInner {
            pending,
            ..QueueInner::default()
        };
        self.idle.notify_all();
    }

    fn reserved_bytes(&self) -> usize {
        mem::size_of::<Self>() + self.limit * mem::size_of::<TaskHandle>()
    }
}

impl fmt::Debug for Queue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Queue")
            .field("core", &inner.attributes.core)
            .field("enabled", &inner.enabled)
            .field("pending", &inner.pending.len())
            .field("active", &inner.active)
            .finish()
    }
}
