//! Completion handle given to plugin actions
//!
//! A [`PluginTask`] stands for a running task whose action is an
//! [`ActionPlugin`](crate::ActionPlugin). The plugin may move it to another
//! thread or device queue and report the outcome whenever it is ready.
//!
//! A [`ControlPlugin`] hooks the life of a whole node instead: it is brought
//! up with the node and taken down after every action is gone.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::runtime::node::{DomainId, NodeId, Runtime};
use crate::runtime::scheduler::{ResultBuffer, TaskHandle, TaskState};

/// Node-wide hooks, typically bringing an accelerator or a remote
/// transport up and down together with the node.
pub trait ControlPlugin: Send + Sync {
    /// The node's workers are running; actions can be registered from here.
    fn initialize(
        &self,
        domain_id: DomainId,
        node_id: NodeId,
    ) -> anyhow::Result<()>;

    /// The node has stopped and released every object.
    fn finalize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A running plugin task awaiting its outcome.
pub struct PluginTask {
    runtime: Arc<Runtime>,
    task: TaskHandle,
    node_local: Arc<[u8]>,
    reported: bool,
}

impl PluginTask {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        task: TaskHandle,
        node_local: Arc<[u8]>,
    ) -> Self {
        Self {
            runtime,
            task,
            node_local,
            reported: false,
        }
    }

    #[inline]
    pub fn handle(&self) -> TaskHandle {
        self.task
    }

    /// Read the argument bytes copied at start time.
    pub fn with_args<R>(
        &self,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R> {
        Ok(self.runtime.tasks.get(self.task)?.with_args(f))
    }

    /// Result buffer supplied at start time.
    pub fn result(&self) -> Option<ResultBuffer> {
        self.runtime
            .tasks
            .get(self.task)
            .ok()
            .and_then(|task| task.result_buffer())
    }

    /// Data registered with the action.
    #[inline]
    pub fn node_local_data(&self) -> &[u8] {
        &self.node_local
    }

    /// Whether `task_cancel` was called for this task.
    pub fn is_cancel_requested(&self) -> bool {
        self.runtime
            .tasks
            .get(self.task)
            .map_or(true, |task| task.cancel_flag().load(Ordering::Acquire))
    }

    /// The task finished successfully.
    pub fn complete(mut self) {
        self.report(TaskState::Completed, None);
    }

    /// The task failed with `message`.
    pub fn fail(
        mut self,
        message: impl Into<String>,
    ) {
        self.report(TaskState::Error, Some(message.into()));
    }

    /// The task honoured a cancellation request.
    pub fn cancelled(mut self) {
        self.report(TaskState::Cancelled, None);
    }

    fn report(
        &mut self,
        state: TaskState,
        error: Option<String>,
    ) {
        self.reported = true;
        self.runtime.complete_task(self.task, state, error);
    }
}

impl Drop for PluginTask {
    fn drop(&mut self) {
        if !self.reported {
            warn!(task = %self.task, "plugin dropped a task without reporting it");
            self.report(
                TaskState::Error,
                Some("plugin dropped the task without reporting an outcome".to_string()),
            );
        }
    }
}

impl fmt::Debug for PluginTask {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PluginTask")
            .field("task", &self.task)
            .field("reported", &self.reported)
            .finish()
    }
}
