//! Task groups
//!
//! A group collects tasks started into it so the caller can wait for all of
//! them, or take them one at a time in completion order.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::duration::Timeout;
use crate::error::{Error, ObjectKind, Result};
use crate::runtime::memory::{Handle, Poolable};
use crate::runtime::scheduler::{TaskHandle, TaskState};

/// Handle to a group.
pub type GroupHandle = Handle<Group>;

/// A finished member returned by `group_wait_any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember {
    pub task: TaskHandle,
    pub state: TaskState,
}

/// A member that finished but was not reported yet.
#[derive(Debug, Clone)]
pub(crate) struct Finished {
    pub task: TaskHandle,
    pub state: TaskState,
    pub error: Option<String>,
}

impl Finished {
    /// The member's outcome as a call result.
    pub fn outcome(&self) -> Result<()> {
        match self.state {
            TaskState::Error => Err(Error::ActionFailed(
                self.error.clone().unwrap_or_default(),
            )),
            TaskState::Cancelled => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    pub fn member(&self) -> GroupMember {
        GroupMember {
            task: self.task,
            state: self.state,
        }
    }
}

/// A group record.
#[derive(Default)]
pub struct Group {
    /// Members started and not yet finished.
    outstanding: AtomicUsize,
    finished: Mutex<VecDeque<Finished>>,
    changed: Condvar,
}

impl Group {
    /// A task is about to be dispatched into the group.
    pub(crate) fn join(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Undo [`join`](Self::join) for a task that was never dispatched.
    pub(crate) fn leave(&self) {
        let _finished = self.finished.lock();
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.changed.notify_all();
    }

    pub(crate) fn member_finished(
        &self,
        member: Finished,
    ) {
        let mut finished = self.finished.lock();
        finished.push_back(member);
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.changed.notify_all();
    }

    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Finished members not yet reported.
    #[inline]
    pub fn unreported(&self) -> usize {
        self.finished.lock().len()
    }

    /// Wait until no member is outstanding, then hand every unreported
    /// member to `report` in completion order.
    pub(crate) fn wait_all(
        &self,
        timeout: Timeout,
        mut report: impl FnMut(Finished),
    ) -> Result<()> {
        let deadline = timeout.deadline();
        let mut finished = self.finished.lock();
        while self.outstanding() > 0 {
            match deadline {
                None => self.changed.wait(&mut finished),
                Some(deadline) => {
                    if self.changed.wait_until(&mut finished, deadline).timed_out()
                        && self.outstanding() > 0
                    {
                        return Err(Error::Timeout);
                    }
                },
            }
        }
        finished.drain(..).for_each(&mut report);
        Ok(())
    }

    /// Take the next finished member.
    pub(crate) fn wait_any(
        &self,
        timeout: Timeout,
    ) -> Result<Finished> {
        let deadline = timeout.deadline();
        let mut finished = self.finished.lock();
        loop {
            if let Some(member) = finished.pop_front() {
                return Ok(member);
            }
            if self.outstanding() == 0 {
                return Err(Error::GroupCompleted);
            }
            match deadline {
                None => self.changed.wait(&mut finished),
                Some(deadline) => {
                    if self.changed.wait_until(&mut finished, deadline).timed_out()
                        && finished.is_empty()
                        && self.outstanding() > 0
                    {
                        return Err(Error::Timeout);
                    }
                },
            }
        }
    }

    /// Drop every unreported member, handing each to `release`.
    pub(crate) fn drain(
        &self,
        release: impl FnMut(Finished),
    ) {
        self.finished.lock().drain(..).for_each(release);
    }
}

impl Poolable for Group {
    const KIND: ObjectKind = ObjectKind::Group;

    fn reset(&self) {
        self.finished.lock().clear();
        self.outstanding.store(0, Ordering::SeqCst);
    }
}

impl fmt::Debug for Group {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Group")
            .field("outstanding", &self.outstanding())
            .field("unreported", &self.unreported())
            .finish()
    }
}
