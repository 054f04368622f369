//! Actions
//!
//! An action is a concrete implementation bound to a job id. Its function is
//! either a native closure, run on a worker thread, or an [`ActionPlugin`]
//! that takes over execution and reports completion itself.
//!
//! # Lifecycle
//! ```text
//! Vacant --action_create--> Active { in_flight }
//! Active --action_delete--> DeletionPending { in_flight }
//! DeletionPending { 0 } --release--> Vacant
//! ```
//! `in_flight` counts tasks that resolved to the action and have not
//! finished. New tasks never resolve to an action pending deletion.

use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::duration::Timeout;
use crate::error::{Error, ObjectKind, Result};
use crate::runtime::affinity::Affinity;
use crate::runtime::job::JobId;
use crate::runtime::memory::{Handle, Poolable};
use crate::runtime::plugin::PluginTask;
use crate::runtime::scheduler::{TaskContext, TaskHandle};

/// Handle to a registered action.
pub type ActionHandle = Handle<Action>;

/// Body of a native action.
pub type NativeFn = dyn Fn(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + Sync;

/// Externally executed action.
///
/// `start` is called once per task, already in the `Running` state. The
/// plugin owns the [`PluginTask`] until it reports an outcome; dropping it
/// unreported fails the task.
pub trait ActionPlugin: Send + Sync {
    /// Begin executing a task.
    fn start(
        &self,
        task: PluginTask,
    ) -> anyhow::Result<()>;

    /// A running task was asked to cancel.
    fn cancel(
        &self,
        _task: TaskHandle,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// The action is being deleted or the node finalized.
    fn finalize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What an action runs.
#[derive(Clone)]
pub enum ActionFunction {
    Native(Arc<NativeFn>),
    Plugin(Arc<dyn ActionPlugin>),
}

impl ActionFunction {
    /// Wrap a closure as a native action body.
    pub fn native<F>(body: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        ActionFunction::Native(Arc::new(body))
    }

    pub fn plugin<P: ActionPlugin + 'static>(plugin: P) -> Self {
        ActionFunction::Plugin(Arc::new(plugin))
    }

    #[inline]
    pub fn is_plugin(&self) -> bool {
        matches!(self, ActionFunction::Plugin(_))
    }
}

impl fmt::Debug for ActionFunction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ActionFunction::Native(_) => f.write_str("Native(..)"),
            ActionFunction::Plugin(_) => f.write_str("Plugin(..)"),
        }
    }
}

/// Options for `action_create`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionAttributes {
    /// Cores allowed to run tasks of this action.
    pub affinity: Affinity,
}

/// Deletion state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionLifecycle {
    #[default]
    Vacant,
    Active {
        in_flight: usize,
    },
    DeletionPending {
        in_flight: usize,
    },
}

/// Everything a task needs from its action.
#[derive(Debug, Clone)]
pub(crate) struct ActionBinding {
    pub job: JobId,
    pub function: ActionFunction,
    pub node_local: Arc<[u8]>,
    pub affinity: Affinity,
}

/// A registered action.
#[derive(Default)]
pub struct Action {
    binding: RwLock<Option<ActionBinding>>,
    lifecycle: Mutex<ActionLifecycle>,
    drained: Condvar,
}

impl Action {
    pub(crate) fn bind(
        &self,
        binding: ActionBinding,
    ) {
        *self.binding.write() = Some(binding);
        *self.lifecycle.lock() = ActionLifecycle::Active { in_flight: 0 };
    }

    pub(crate) fn binding(&self) -> Option<ActionBinding> {
        self.binding.read().clone()
    }

    #[inline]
    pub fn lifecycle(&self) -> ActionLifecycle {
        *self.lifecycle.lock()
    }

    #[inline]
    pub fn job(&self) -> Option<JobId> {
        self.binding.read().as_ref().map(|b| b.job)
    }

    #[inline]
    pub fn affinity(&self) -> Affinity {
        self.binding
            .read()
            .as_ref()
            .map_or(Affinity::none(), |b| b.affinity)
    }

    /// Count a new task against the action; fails unless it is active.
    pub(crate) fn try_reference(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            ActionLifecycle::Active { in_flight } => {
                *lifecycle = ActionLifecycle::Active {
                    in_flight: in_flight + 1,
                };
                true
            },
            _ => false,
        }
    }

    /// A task counted by [`try_reference`](Self::try_reference) finished.
    pub(crate) fn drop_reference(&self) {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            ActionLifecycle::Active { in_flight } => {
                *lifecycle = ActionLifecycle::Active {
                    in_flight: in_flight.saturating_sub(1),
                };
            },
            ActionLifecycle::DeletionPending { in_flight } => {
                let in_flight = in_flight.saturating_sub(1);
                *lifecycle = ActionLifecycle::DeletionPending { in_flight };
                if in_flight == 0 {
                    self.drained.notify_all();
                }
            },
            ActionLifecycle::Vacant => {},
        }
    }

    /// Stop resolving new tasks to this action.
    pub(crate) fn begin_delete(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            ActionLifecycle::Active { in_flight } => {
                *lifecycle = ActionLifecycle::DeletionPending { in_flight };
                Ok(())
            },
            ActionLifecycle::DeletionPending { .. } => Ok(()),
            ActionLifecycle::Vacant => Err(Error::InvalidHandle(ObjectKind::Action)),
        }
    }

    /// Wait for in-flight tasks to finish.
    ///
    /// An immediate timeout reports `Busy` when tasks are still running; a
    /// bounded one reports `Timeout` once it elapses. Deletion stays pending
    /// either way.
    pub(crate) fn wait_drained(
        &self,
        timeout: Timeout,
    ) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        let outstanding = |l: &ActionLifecycle| match *l {
            ActionLifecycle::Active { in_flight } | ActionLifecycle::DeletionPending { in_flight } => {
                in_flight
            },
            ActionLifecycle::Vacant => 0,
        };
        if outstanding(&lifecycle) == 0 {
            return Ok(());
        }
        let deadline = match timeout {
            Timeout::Immediate => return Err(Error::Busy(ObjectKind::Action)),
            other => other.deadline(),
        };
        while outstanding(&lifecycle) > 0 {
            match deadline {
                None => self.drained.wait(&mut lifecycle),
                Some(deadline) => {
                    if self.drained.wait_until(&mut lifecycle, deadline).timed_out()
                        && outstanding(&lifecycle) > 0
                    {
                        return Err(Error::Timeout);
                    }
                },
            }
        }
        Ok(())
    }
}

impl Poolable for Action {
    const KIND: ObjectKind = ObjectKind::Action;

    fn reset(&self) {
        *self.binding.write() = None;
        *self.lifecycle.lock() = ActionLifecycle::Vacant;
    }

    fn reserved_bytes(&self) -> usize {
        mem::size_of::<Self>()
    }
}

impl fmt::Debug for Action {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Action")
            .field("job", &self.job())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
