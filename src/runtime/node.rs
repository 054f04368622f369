//! The node: an explicitly constructed runtime context
//!
//! [`Node::initialize`] sizes every pool, starts one worker per core and
//! returns the owner of the runtime. All registration and execution calls go
//! through it. [`Node::finalize`] (or dropping the node) stops the workers,
//! cancels what is left, runs plugin `finalize` hooks and frees every slot.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::duration::Timeout;
use crate::error::{Error, ObjectKind, Result};
use crate::runtime::action::{
    Action, ActionAttributes, ActionBinding, ActionFunction, ActionHandle, ActionPlugin,
};
use crate::runtime::affinity::Affinity;
use crate::runtime::group::{Finished, Group, GroupHandle, GroupMember};
use crate::runtime::job::{JobHandle, JobId, JobTable};
use crate::runtime::memory::{MemoryTracker, Pool};
use crate::runtime::plugin::{ControlPlugin, PluginTask};
use crate::runtime::queue::{Queue, QueueAttributes, QueueHandle};
use crate::runtime::scheduler::task::{CancelRequest, Completion, TaskSetup};
use crate::runtime::scheduler::worker;
use crate::runtime::scheduler::{
    ReadyEntry, ResultBuffer, Scheduler, SchedulerConfig, SchedulerStats, Task, TaskAttributes,
    TaskBuilder, TaskContext, TaskHandle, TaskIdGenerator, TaskState,
};
use crate::util::config::NodeAttributes;

/// Domain a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DomainId(pub u32);

/// Node number within its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub u32);

/// Static facts about an initialized node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Crate version.
    pub version: &'static str,
    pub domain_id: DomainId,
    pub node_id: NodeId,
    /// Worker threads started.
    pub core_count: usize,
    /// Cores reported by the operating system.
    pub hardware_concurrency: usize,
    /// Bytes reserved for pools and buffers at initialization.
    pub bytes_reserved: usize,
    pub attributes: NodeAttributes,
}

/// State shared by the node, its workers and plugin task handles.
pub(crate) struct Runtime {
    pub(crate) attributes: NodeAttributes,
    pub(crate) memory: MemoryTracker,
    pub(crate) actions: Pool<Action>,
    pub(crate) jobs: JobTable,
    pub(crate) tasks: Pool<Task>,
    pub(crate) groups: Pool<Group>,
    pub(crate) queues: Pool<Queue>,
    pub(crate) scheduler: Scheduler,
    task_ids: TaskIdGenerator,
}

impl Runtime {
    fn new(attributes: NodeAttributes) -> Self {
        let memory = MemoryTracker::new();
        let arg_capacity = attributes.max_argument_bytes;
        let queue_limit = attributes.queue_limit;

        Self {
            actions: Pool::new(attributes.max_actions, &memory, Action::default),
            jobs: JobTable::new(attributes.max_jobs, attributes.max_actions_per_job, &memory),
            tasks: Pool::new(attributes.max_tasks, &memory, || {
                Task::with_arg_capacity(arg_capacity)
            }),
            groups: Pool::new(attributes.max_groups, &memory, Group::default),
            queues: Pool::new(attributes.max_queues, &memory, || Queue::with_limit(queue_limit)),
            scheduler: Scheduler::new(SchedulerConfig::from(&attributes), &memory),
            task_ids: TaskIdGenerator::new(),
            memory,
            attributes,
        }
    }

    #[inline]
    fn core_count(&self) -> usize {
        self.attributes.core_count
    }

    // ---------------------------------------------------------------------
    // Actions and jobs
    // ---------------------------------------------------------------------

    fn register_action(
        &self,
        job: JobId,
        function: ActionFunction,
        node_local: &[u8],
        attributes: ActionAttributes,
    ) -> Result<ActionHandle> {
        self.jobs.check(job)?;
        let affinity = attributes.affinity.limit(self.core_count());
        if affinity.is_empty() {
            return Err(Error::InvalidArgument(
                "action affinity excludes every worker".to_string(),
            ));
        }

        let handle = self.actions.acquire()?;
        let plugin = function.is_plugin();
        self.actions.get(handle)?.bind(ActionBinding {
            job,
            function,
            node_local: Arc::from(node_local),
            affinity,
        });
        if let Err(err) = self.jobs.bind(job, handle) {
            let _ = self.actions.release(handle);
            return Err(err);
        }

        debug!(action = %handle, %job, plugin, "action created");
        Ok(handle)
    }

    fn delete_action(
        &self,
        handle: ActionHandle,
        timeout: Timeout,
    ) -> Result<()> {
        let action = self.actions.get(handle)?;
        action.begin_delete()?;
        action.wait_drained(timeout)?;

        let binding = action.binding();
        if let Some(binding) = &binding {
            self.jobs.unbind(binding.job, handle);
        }
        self.actions.release(handle)?;
        debug!(action = %handle, "action deleted");

        match binding.map(|b| b.function) {
            Some(ActionFunction::Plugin(plugin)) => plugin
                .finalize()
                .map_err(|err| Error::Unknown(format!("plugin finalize failed: {:#}", err))),
            _ => Ok(()),
        }
    }

    /// Pick an action for `job` whose affinity overlaps `requested` and
    /// count the new task against it.
    fn resolve(
        &self,
        job: JobId,
        requested: Affinity,
    ) -> Result<(ActionHandle, ActionBinding)> {
        for handle in self.jobs.candidates(job)? {
            let Ok(action) = self.actions.get(handle) else {
                continue;
            };
            let Some(binding) = action.binding() else {
                continue;
            };
            if binding.affinity.intersect(requested).is_empty() || !action.try_reference() {
                continue;
            }
            // The slot may have been recycled between the lookup and the
            // reference.
            if !self.actions.contains(handle) {
                action.drop_reference();
                continue;
            }
            return Ok((handle, binding));
        }
        Err(Error::InvalidJob(job))
    }

    fn release_action(
        &self,
        handle: ActionHandle,
    ) {
        if let Ok(action) = self.actions.get(handle) {
            action.drop_reference();
        }
    }

    // ---------------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------------

    pub(crate) fn start_task(
        self: &Arc<Self>,
        job: JobHandle,
        args: &[u8],
        result: Option<ResultBuffer>,
        attributes: &TaskAttributes,
        group: Option<GroupHandle>,
        queue: Option<QueueHandle>,
    ) -> Result<TaskHandle> {
        if !self.scheduler.is_running() {
            return Err(Error::ShuttingDown);
        }
        if args.len() > self.attributes.max_argument_bytes {
            return Err(Error::InvalidArgument(format!(
                "{} argument bytes exceed the limit of {}",
                args.len(),
                self.attributes.max_argument_bytes
            )));
        }
        let group_ref = group.map(|g| self.groups.get(g)).transpose()?;
        let queue_ref = match queue {
            Some(q) => Some((q, self.queues.get(q)?)),
            None => None,
        };
        let requested = attributes.affinity.limit(self.core_count());
        if requested.is_empty() {
            return Err(Error::InvalidArgument(
                "task affinity excludes every worker".to_string(),
            ));
        }

        let (action, binding) = self.resolve(job.id(), requested)?;
        let (handle, task) = match self.acquire_task() {
            Ok(acquired) => acquired,
            Err(err) => {
                self.release_action(action);
                return Err(err);
            },
        };

        let id = attributes.id.unwrap_or_else(|| self.task_ids.next());
        let affinity = requested.intersect(binding.affinity);
        task.prepare(TaskSetup {
            id,
            job: job.id(),
            action,
            args,
            result,
            priority: attributes.priority,
            affinity,
            group,
            queue,
            detached: attributes.detached,
        });
        if let Some(group) = group_ref {
            group.join();
        }
        task.mark_scheduled();

        let dispatched = match (queue_ref, &binding.function) {
            (Some((queue, queue_ref)), _) => {
                queue_ref.enqueue(handle).map(|(sequence, announce)| {
                    task.set_sequence(sequence);
                    self.scheduler.stats().record_scheduled();
                    if announce {
                        self.scheduler.schedule_queue(queue, queue_ref.bound_core());
                    }
                })
            },
            (None, ActionFunction::Native(_)) => self
                .scheduler
                .place(ReadyEntry { task: handle, affinity }, attributes.priority)
                .map(|_| ()),
            (None, ActionFunction::Plugin(plugin)) => {
                self.scheduler.stats().record_scheduled();
                self.launch_plugin(handle, task, None, plugin.clone(), binding.node_local.clone());
                Ok(())
            },
        };

        if let Err(err) = dispatched {
            if let Some(group) = group_ref {
                group.leave();
            }
            let _ = self.tasks.release(handle);
            self.release_action(action);
            return Err(err);
        }

        trace!(task = %handle, %id, job = %job.id(), "task started");
        Ok(handle)
    }

    fn acquire_task(&self) -> Result<(TaskHandle, &Task)> {
        let handle = self.tasks.acquire()?;
        match self.tasks.get(handle) {
            Ok(task) => Ok((handle, task)),
            Err(err) => {
                let _ = self.tasks.release(handle);
                Err(err)
            },
        }
    }

    /// Move a scheduled task to `Running` and hand it to its plugin.
    pub(crate) fn launch_plugin(
        self: &Arc<Self>,
        handle: TaskHandle,
        task: &Task,
        core: Option<usize>,
        plugin: Arc<dyn ActionPlugin>,
        node_local: Arc<[u8]>,
    ) -> bool {
        let Some(ticket) = task.begin(core) else {
            return false;
        };
        task.restore_args(ticket.args);

        let plugin_task = PluginTask::new(self.clone(), handle, node_local);
        if let Err(err) = plugin.start(plugin_task) {
            warn!(task = %handle, error = %err, "plugin failed to start task");
            self.complete_task(handle, TaskState::Error, Some(format!("{:#}", err)));
        }
        true
    }

    /// Move a task to a terminal state and run its completion bookkeeping.
    /// Returns `false` if it had already finished.
    pub(crate) fn complete_task(
        &self,
        handle: TaskHandle,
        state: TaskState,
        error: Option<String>,
    ) -> bool {
        let Ok(task) = self.tasks.get(handle) else {
            return false;
        };
        match task.finish(state, error) {
            Some(done) => {
                self.settle(handle, task, done);
                true
            },
            None => false,
        }
    }

    fn settle(
        &self,
        handle: TaskHandle,
        task: &Task,
        done: Completion,
    ) {
        if let Some(action) = done.action {
            self.release_action(action);
        }
        task.settle();
        trace!(task = %handle, state = ?done.state, "task finished");

        // The slot may be released by a waiter from here on; only the
        // handles captured in `done` are used.
        if let Some(queue) = done.queue {
            self.advance_queue(queue, handle);
        }
        if let Some(group) = done.group {
            if let Ok(group) = self.groups.get(group) {
                group.member_finished(Finished {
                    task: handle,
                    state: done.state,
                    error: done.error,
                });
            }
        }
        if done.detached {
            let _ = self.tasks.release(handle);
        }
    }

    fn wait_task(
        &self,
        handle: TaskHandle,
        timeout: Timeout,
    ) -> Result<()> {
        let task = self.tasks.get(handle)?;
        if task.is_detached() {
            return Err(Error::InvalidArgument(
                "detached tasks cannot be waited on".to_string(),
            ));
        }
        let (state, error) = task.wait(timeout)?;
        let _ = self.tasks.release(handle);
        Finished {
            task: handle,
            state,
            error,
        }
        .outcome()
    }

    fn cancel_task(
        &self,
        handle: TaskHandle,
    ) -> Result<()> {
        let task = self.tasks.get(handle)?;
        match task.request_cancel() {
            CancelRequest::Cancelled(done) => {
                debug!(task = %handle, "task cancelled before running");
                // Queue members are dropped from their queue when settled.
                if done.queue.is_none() {
                    self.scheduler.withdraw(handle);
                }
                self.settle(handle, task, done);
            },
            CancelRequest::Running(Some(action)) => {
                let function = self
                    .actions
                    .get(action)
                    .ok()
                    .and_then(Action::binding)
                    .map(|b| b.function);
                if let Some(ActionFunction::Plugin(plugin)) = function {
                    plugin
                        .cancel(handle)
                        .map_err(|err| Error::Unknown(format!("plugin cancel failed: {:#}", err)))?;
                }
            },
            CancelRequest::Running(None) | CancelRequest::Finished => {},
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------

    fn delete_group(
        &self,
        handle: GroupHandle,
    ) -> Result<()> {
        let group = self.groups.get(handle)?;
        if group.outstanding() > 0 {
            return Err(Error::Busy(ObjectKind::Group));
        }
        group.drain(|member| {
            let _ = self.tasks.release(member.task);
        });
        self.groups.release(handle)
    }

    fn wait_group_all(
        &self,
        handle: GroupHandle,
        timeout: Timeout,
    ) -> Result<()> {
        let group = self.groups.get(handle)?;
        let mut outcome = Ok(());
        group.wait_all(timeout, |member| {
            if outcome.is_ok() {
                outcome = member.outcome();
            }
            let _ = self.tasks.release(member.task);
        })?;
        outcome
    }

    fn wait_group_any(
        &self,
        handle: GroupHandle,
        timeout: Timeout,
    ) -> Result<GroupMember> {
        let member = self.groups.get(handle)?.wait_any(timeout)?;
        let _ = self.tasks.release(member.task);
        Ok(member.member())
    }

    // ---------------------------------------------------------------------
    // Queues
    // ---------------------------------------------------------------------

    fn create_queue(
        &self,
        attributes: QueueAttributes,
    ) -> Result<QueueHandle> {
        if let Some(core) = attributes.core {
            if core >= self.core_count() {
                return Err(Error::InvalidArgument(format!(
                    "queue bound to core {} of {}",
                    core,
                    self.core_count()
                )));
            }
        }
        let handle = self.queues.acquire()?;
        self.queues.get(handle)?.configure(attributes);
        debug!(queue = %handle, core = ?attributes.core, "queue created");
        Ok(handle)
    }

    fn disable_queue(
        &self,
        handle: QueueHandle,
        timeout: Timeout,
    ) -> Result<()> {
        let queue = self.queues.get(handle)?;
        for task in queue.disable() {
            let _ = self.cancel_task(task);
        }
        queue.wait_idle(timeout)
    }

    fn delete_queue(
        &self,
        handle: QueueHandle,
        timeout: Timeout,
    ) -> Result<()> {
        self.disable_queue(handle, timeout)?;
        self.scheduler.forget_queue(handle);
        self.queues.release(handle)?;
        debug!(queue = %handle, "queue deleted");
        Ok(())
    }

    pub(crate) fn advance_queue(
        &self,
        handle: QueueHandle,
        finished: TaskHandle,
    ) {
        if let Ok(queue) = self.queues.get(handle) {
            if queue.finish(finished) {
                self.scheduler.schedule_queue(handle, queue.bound_core());
            }
        }
    }

    // ---------------------------------------------------------------------
    // Teardown
    // ---------------------------------------------------------------------

    /// Cancel and release everything. Workers must have stopped.
    fn teardown(&self) {
        for handle in self.tasks.live_handles() {
            if let Ok(TaskState::Running) = self.tasks.get(handle).map(Task::state) {
                let _ = self.cancel_task(handle);
            }
            if self.complete_task(handle, TaskState::Cancelled, None) {
                warn!(task = %handle, "task cancelled by finalize");
            }
        }
        for handle in self.tasks.live_handles() {
            let _ = self.tasks.release(handle);
        }
        for handle in self.groups.live_handles() {
            let _ = self.groups.release(handle);
        }
        for handle in self.queues.live_handles() {
            let _ = self.queues.release(handle);
        }
        for handle in self.actions.live_handles() {
            let binding = self.actions.get(handle).ok().and_then(Action::binding);
            if let Some(binding) = &binding {
                self.jobs.unbind(binding.job, handle);
            }
            let _ = self.actions.release(handle);
            if let Some(ActionFunction::Plugin(plugin)) = binding.map(|b| b.function) {
                if let Err(err) = plugin.finalize() {
                    warn!(action = %handle, error = %err, "plugin finalize failed");
                }
            }
        }
    }
}

/// A runtime node.
///
/// # Example
///
/// ```rust
/// use tasknode::{JobId, Node, NodeAttributes, Timeout, ActionAttributes};
/// use tasknode::runtime::node::{DomainId, NodeId};
///
/// let node = Node::initialize(DomainId(1), NodeId(1), NodeAttributes::with_cores(2)).unwrap();
/// node.action_create(JobId(0), |_| Ok(()), &[], ActionAttributes::default()).unwrap();
///
/// let job = node.job_get(JobId(0)).unwrap();
/// let task = node.task(job).start().unwrap();
/// node.task_wait(task, Timeout::Infinite).unwrap();
///
/// let memory = node.memory();
/// node.finalize().unwrap();
/// assert_eq!(memory.bytes_allocated(), 0);
/// ```
pub struct Node {
    runtime: Arc<Runtime>,
    workers: Vec<JoinHandle<()>>,
    /// Control plugins whose `initialize` succeeded, in order.
    controls: Vec<Arc<dyn ControlPlugin>>,
    info: NodeInfo,
    finalized: bool,
}

impl Node {
    /// Size every pool and start the workers.
    pub fn initialize(
        domain_id: DomainId,
        node_id: NodeId,
        attributes: NodeAttributes,
    ) -> Result<Self> {
        Self::initialize_with(domain_id, node_id, attributes, Vec::new())
    }

    /// Like [`initialize`](Self::initialize), then bring up `controls` in
    /// order.
    ///
    /// If a control plugin fails, the ones already initialized are
    /// finalized in reverse order, the node is shut down and the failure is
    /// returned.
    pub fn initialize_with(
        domain_id: DomainId,
        node_id: NodeId,
        attributes: NodeAttributes,
        controls: Vec<Arc<dyn ControlPlugin>>,
    ) -> Result<Self> {
        attributes
            .validate()
            .map_err(|err| Error::InvalidArgument(err.to_string()))?;

        let runtime = Arc::new(Runtime::new(attributes.clone()));
        let workers = worker::spawn_workers(&runtime)?;

        let info = NodeInfo {
            version: crate::VERSION,
            domain_id,
            node_id,
            core_count: attributes.core_count,
            hardware_concurrency: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            bytes_reserved: runtime.memory.bytes_allocated(),
            attributes,
        };
        debug!(
            domain = domain_id.0,
            node = node_id.0,
            cores = info.core_count,
            bytes = info.bytes_reserved,
            "node initialized"
        );

        let mut node = Self {
            runtime,
            workers,
            controls: Vec::with_capacity(controls.len()),
            info,
            finalized: false,
        };
        for control in controls {
            if let Err(err) = control.initialize(domain_id, node_id) {
                warn!(error = %err, "control plugin failed to initialize");
                // Dropping the node finalizes the plugins brought up so far.
                return Err(Error::Unknown(format!(
                    "control plugin initialize failed: {:#}",
                    err
                )));
            }
            node.controls.push(control);
        }
        Ok(node)
    }

    /// Stop the workers and free everything.
    pub fn finalize(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        self.runtime.scheduler.shutdown();
        let mut result = Ok(());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                result = Err(Error::Unknown("worker thread panicked".to_string()));
            }
        }
        self.runtime.teardown();
        for control in self.controls.drain(..).rev() {
            if let Err(err) = control.finalize() {
                warn!(error = %err, "control plugin finalize failed");
                if result.is_ok() {
                    result = Err(Error::Unknown(format!(
                        "control plugin finalize failed: {:#}",
                        err
                    )));
                }
            }
        }
        debug!(
            domain = self.info.domain_id.0,
            node = self.info.node_id.0,
            "node finalized"
        );
        result
    }

    #[inline]
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// Byte accounting for this node; reads zero once the node is gone.
    #[inline]
    pub fn memory(&self) -> MemoryTracker {
        self.runtime.memory.clone()
    }

    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        self.runtime.scheduler.stats()
    }

    /// Tasks sitting in worker ready queues.
    #[inline]
    pub fn ready_tasks(&self) -> usize {
        self.runtime.scheduler.pending()
    }

    /// Register a native action for `job`.
    pub fn action_create<F>(
        &self,
        job: JobId,
        body: F,
        node_local: &[u8],
        attributes: ActionAttributes,
    ) -> Result<ActionHandle>
    where
        F: Fn(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.runtime
            .register_action(job, ActionFunction::native(body), node_local, attributes)
    }

    /// Register a plugin-backed action for `job`.
    pub fn plugin_action_create<P>(
        &self,
        job: JobId,
        plugin: P,
        node_local: &[u8],
        attributes: ActionAttributes,
    ) -> Result<ActionHandle>
    where
        P: ActionPlugin + 'static,
    {
        self.runtime
            .register_action(job, ActionFunction::plugin(plugin), node_local, attributes)
    }

    /// Stop resolving tasks to the action and release it once its tasks
    /// have finished.
    pub fn action_delete(
        &self,
        action: ActionHandle,
        timeout: Timeout,
    ) -> Result<()> {
        self.runtime.delete_action(action, timeout)
    }

    pub fn job_get(
        &self,
        job: JobId,
    ) -> Result<JobHandle> {
        self.runtime.jobs.check(job)?;
        Ok(JobHandle::new(job))
    }

    /// Start a task of `job`.
    pub fn task_start(
        &self,
        job: JobHandle,
        args: &[u8],
        result: Option<ResultBuffer>,
        attributes: &TaskAttributes,
        group: Option<GroupHandle>,
        queue: Option<QueueHandle>,
    ) -> Result<TaskHandle> {
        self.runtime
            .start_task(job, args, result, attributes, group, queue)
    }

    /// Fluent front end to [`task_start`](Self::task_start).
    #[inline]
    pub fn task(
        &self,
        job: JobHandle,
    ) -> TaskBuilder<'_> {
        TaskBuilder::new(self, job)
    }

    /// Wait for a task to finish and release it.
    pub fn task_wait(
        &self,
        task: TaskHandle,
        timeout: Timeout,
    ) -> Result<()> {
        self.runtime.wait_task(task, timeout)
    }

    pub fn task_cancel(
        &self,
        task: TaskHandle,
    ) -> Result<()> {
        self.runtime.cancel_task(task)
    }

    pub fn task_state(
        &self,
        task: TaskHandle,
    ) -> Result<TaskState> {
        Ok(self.runtime.tasks.get(task)?.state())
    }

    pub fn group_create(&self) -> Result<GroupHandle> {
        self.runtime.groups.acquire()
    }

    pub fn group_delete(
        &self,
        group: GroupHandle,
    ) -> Result<()> {
        self.runtime.delete_group(group)
    }

    /// Wait until every member has finished, release them all and report
    /// the first failure.
    pub fn group_wait_all(
        &self,
        group: GroupHandle,
        timeout: Timeout,
    ) -> Result<()> {
        self.runtime.wait_group_all(group, timeout)
    }

    /// Take the next finished member.
    pub fn group_wait_any(
        &self,
        group: GroupHandle,
        timeout: Timeout,
    ) -> Result<GroupMember> {
        self.runtime.wait_group_any(group, timeout)
    }

    pub fn queue_create(
        &self,
        attributes: QueueAttributes,
    ) -> Result<QueueHandle> {
        self.runtime.create_queue(attributes)
    }

    pub fn queue_enable(
        &self,
        queue: QueueHandle,
    ) -> Result<()> {
        self.runtime.queues.get(queue)?.enable();
        Ok(())
    }

    /// Reject new tasks and wait until the queue is idle.
    pub fn queue_disable(
        &self,
        queue: QueueHandle,
        timeout: Timeout,
    ) -> Result<()> {
        self.runtime.disable_queue(queue, timeout)
    }

    pub fn queue_delete(
        &self,
        queue: QueueHandle,
        timeout: Timeout,
    ) -> Result<()> {
        self.runtime.delete_queue(queue, timeout)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "node shutdown failed");
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Node")
            .field("domain_id", &self.info.domain_id)
            .field("node_id", &self.info.node_id)
            .field("core_count", &self.info.core_count)
            .field("controls", &self.controls.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}
