//! Jobs
//!
//! A job is an abstract unit of work identified by a number. Actions
//! implement jobs; starting a task names a job and the node resolves it to
//! one of the actions currently bound to that id. The table is sized once,
//! at initialization, to `max_jobs` entries of `max_actions_per_job` slots.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, ObjectKind, Result};
use crate::runtime::action::ActionHandle;
use crate::runtime::memory::{MemoryReservation, MemoryTracker};

/// Application-chosen job number, `0..max_jobs`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "job {}", self.0)
    }
}

impl From<u32> for JobId {
    fn from(id: u32) -> Self {
        JobId(id)
    }
}

/// Reference to a job obtained from [`Node::job_get`](crate::Node::job_get).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle {
    id: JobId,
}

impl JobHandle {
    #[inline]
    pub(crate) fn new(id: JobId) -> Self {
        Self { id }
    }

    #[inline]
    pub fn id(&self) -> JobId {
        self.id
    }
}

/// Actions bound to one job id.
pub(crate) type Candidates = SmallVec<[ActionHandle; 4]>;

#[derive(Debug)]
struct JobEntry {
    actions: RwLock<Candidates>,
    /// Rotates resolution among multiple actions.
    cursor: AtomicUsize,
}

/// Fixed table of jobs.
#[derive(Debug)]
pub(crate) struct JobTable {
    entries: Box<[JobEntry]>,
    max_actions_per_job: usize,
    _storage: MemoryReservation,
}

impl JobTable {
    pub fn new(
        max_jobs: usize,
        max_actions_per_job: usize,
        tracker: &MemoryTracker,
    ) -> Self {
        let entries: Box<[_]> = (0..max_jobs)
            .map(|_| JobEntry {
                actions: RwLock::new(SmallVec::with_capacity(max_actions_per_job)),
                cursor: AtomicUsize::new(0),
            })
            .collect();

        let spilled = if max_actions_per_job > 4 {
            max_actions_per_job * mem::size_of::<ActionHandle>()
        } else {
            0
        };
        let bytes = max_jobs * (mem::size_of::<JobEntry>() + spilled);

        Self {
            entries,
            max_actions_per_job,
            _storage: tracker.reserve(bytes),
        }
    }

    fn entry(
        &self,
        id: JobId,
    ) -> Result<&JobEntry> {
        self.entries.get(id.0 as usize).ok_or(Error::InvalidJob(id))
    }

    /// Check that `id` names a job of this node.
    pub fn check(
        &self,
        id: JobId,
    ) -> Result<()> {
        self.entry(id).map(|_| ())
    }

    pub fn bind(
        &self,
        id: JobId,
        action: ActionHandle,
    ) -> Result<()> {
        let mut actions = self.entry(id)?.actions.write();
        if actions.len() >= self.max_actions_per_job {
            return Err(Error::Exhausted(ObjectKind::Job));
        }
        actions.push(action);
        Ok(())
    }

    pub fn unbind(
        &self,
        id: JobId,
        action: ActionHandle,
    ) {
        if let Ok(entry) = self.entry(id) {
            entry.actions.write().retain(|bound| *bound != action);
        }
    }

    /// Actions bound to `id`, starting at a rotating offset.
    pub fn candidates(
        &self,
        id: JobId,
    ) -> Result<Candidates> {
        let entry = self.entry(id)?;
        let actions = entry.actions.read();
        if actions.is_empty() {
            return Ok(Candidates::new());
        }
        let start = entry.cursor.fetch_add(1, Ordering::Relaxed) % actions.len();
        Ok(actions[start..]
            .iter()
            .chain(&actions[..start])
            .copied()
            .collect())
    }

    /// Number of actions bound to `id`.
    pub fn action_count(
        &self,
        id: JobId,
    ) -> Result<usize> {
        Ok(self.entry(id)?.actions.read().len())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
