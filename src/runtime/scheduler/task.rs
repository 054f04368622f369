//! Task definitions for the scheduler.
//!
//! A [`Task`] is one scheduled execution of a job. Task records live in the
//! node's task pool and are reused; everything a task carries is reset when
//! its slot is released.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::duration::Timeout;
use crate::error::{Error, ObjectKind, Result};
use crate::runtime::action::ActionHandle;
use crate::runtime::affinity::Affinity;
use crate::runtime::group::GroupHandle;
use crate::runtime::job::{JobHandle, JobId};
use crate::runtime::memory::{Handle, Poolable};
use crate::runtime::node::Node;
use crate::runtime::queue::QueueHandle;

/// Handle to a started task.
pub type TaskHandle = Handle<Task>;

/// Application-level task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskId(pub usize);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> usize {
        self.0
    }
}

impl From<usize> for TaskId {
    fn from(val: usize) -> Self {
        Self(val)
    }
}

impl fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Allocated, not yet visible to any worker.
    #[default]
    Created,
    /// Waiting in a worker's ready structure or a queue.
    Scheduled,
    /// A worker (or plugin) is executing the action body.
    Running,
    /// The body returned successfully.
    Completed,
    /// The body failed or panicked.
    Error,
    /// Cancelled before it ran, or the body acknowledged cancellation.
    Cancelled,
}

impl TaskState {
    /// Terminal states are final.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Error | TaskState::Cancelled
        )
    }
}

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Default, Hash)]
pub enum TaskPriority {
    /// Low priority tasks.
    Low = 0,
    /// Normal priority (default).
    #[default]
    Normal = 1,
    /// High priority tasks.
    High = 2,
    /// Critical priority tasks.
    Critical = 3,
}

impl TaskPriority {
    /// Number of priority levels.
    pub const COUNT: usize = 4;

    /// Index of this priority's ready band.
    #[inline]
    pub fn band(&self) -> usize {
        *self as usize
    }
}

/// Per-task start options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskAttributes {
    /// Application id; generated when absent.
    pub id: Option<TaskId>,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Cores allowed to run the task, further restricted by the action.
    pub affinity: Affinity,
    /// Release the task as soon as it finishes; it cannot be waited on.
    pub detached: bool,
}

/// Caller-owned buffer the action body writes its result into.
#[derive(Clone, Default)]
pub struct ResultBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ResultBuffer {
    /// Zero-filled buffer of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0; len])),
        }
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the contents in place.
    pub fn read<R>(
        &self,
        f: impl FnOnce(&[u8]) -> R,
    ) -> R {
        f(&self.bytes.lock())
    }

    /// Write the contents in place.
    pub fn write<R>(
        &self,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> R {
        f(&mut self.bytes.lock())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock()
    }
}

impl fmt::Debug for ResultBuffer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ResultBuffer")
            .field("len", &self.len())
            .finish()
    }
}

/// Execution context handed to a native action body.
pub struct TaskContext<'a> {
    pub(crate) core: usize,
    pub(crate) task: TaskHandle,
    pub(crate) args: &'a [u8],
    pub(crate) result: &'a mut [u8],
    pub(crate) node_local: &'a [u8],
    pub(crate) cancel: &'a AtomicBool,
    pub(crate) cancel_acknowledged: bool,
}

impl<'a> TaskContext<'a> {
    /// Index of the worker core running the body.
    #[inline]
    pub fn core_num(&self) -> usize {
        self.core
    }

    #[inline]
    pub fn task(&self) -> TaskHandle {
        self.task
    }

    /// Argument bytes copied at start time.
    #[inline]
    pub fn args(&self) -> &[u8] {
        self.args
    }

    /// Result buffer supplied at start time (empty when none was given).
    #[inline]
    pub fn result_mut(&mut self) -> &mut [u8] {
        self.result
    }

    /// Data registered with the action.
    #[inline]
    pub fn node_local_data(&self) -> &[u8] {
        self.node_local
    }

    /// Whether `task_cancel` was called while the body runs.
    #[inline]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Report the task as cancelled once the body returns.
    #[inline]
    pub fn acknowledge_cancel(&mut self) {
        self.cancel_acknowledged = true;
    }
}

/// Everything `task_start` records on a fresh task.
pub(crate) struct TaskSetup<'a> {
    pub id: TaskId,
    pub job: JobId,
    pub action: ActionHandle,
    pub args: &'a [u8],
    pub result: Option<ResultBuffer>,
    pub priority: TaskPriority,
    pub affinity: Affinity,
    pub group: Option<GroupHandle>,
    pub queue: Option<QueueHandle>,
    pub detached: bool,
}

/// What a worker needs to run the body, taken out of the task for the
/// duration of the call.
pub(crate) struct RunTicket {
    pub args: Vec<u8>,
    pub result: Option<ResultBuffer>,
}

/// Bookkeeping left to do after a task reached a terminal state.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub state: TaskState,
    pub error: Option<String>,
    pub action: Option<ActionHandle>,
    pub group: Option<GroupHandle>,
    pub queue: Option<QueueHandle>,
    pub detached: bool,
}

/// Result of a cancellation request.
pub(crate) enum CancelRequest {
    /// The task never ran; it is now cancelled.
    Cancelled(Completion),
    /// The body is executing; the flag is set.
    Running(Option<ActionHandle>),
    /// Already terminal.
    Finished,
}

#[derive(Default)]
struct TaskInner {
    id: TaskId,
    job: JobId,
    action: Option<ActionHandle>,
    args: Vec<u8>,
    result: Option<ResultBuffer>,
    priority: TaskPriority,
    affinity: Affinity,
    group: Option<GroupHandle>,
    queue: Option<QueueHandle>,
    sequence: u64,
    detached: bool,
    state: TaskState,
    /// Terminal and all completion bookkeeping visible to waiters is done.
    settled: bool,
    error: Option<String>,
    core: Option<usize>,
    /// Bumped every time the slot is prepared for a new task.
    epoch: usize,
}

/// A task record.
pub struct Task {
    inner: Mutex<TaskInner>,
    settled: Condvar,
    cancel: AtomicBool,
    epoch: AtomicUsize,
    arg_capacity: usize,
}

impl Task {
    /// Task record with an argument buffer preallocated to `arg_capacity`.
    pub fn with_arg_capacity(arg_capacity: usize) -> Self {
        let inner = TaskInner {
            args: Vec::with_capacity(arg_capacity),
            ..TaskInner::default()
        };
        Self {
            inner: Mutex::new(inner),
            settled: Condvar::new(),
            cancel: AtomicBool::new(false),
            epoch: AtomicUsize::new(0),
            arg_capacity,
        }
    }

    pub(crate) fn prepare(
        &self,
        setup: TaskSetup<'_>,
    ) {
        let mut inner = self.inner.lock();
        inner.id = setup.id;
        inner.job = setup.job;
        inner.action = Some(setup.action);
        inner.args.clear();
        inner.args.extend_from_slice(setup.args);
        inner.result = setup.result;
        inner.priority = setup.priority;
        inner.affinity = setup.affinity;
        inner.group = setup.group;
        inner.queue = setup.queue;
        inner.detached = setup.detached;
        inner.state = TaskState::Created;
        inner.settled = false;
        inner.error = None;
        inner.core = None;
        inner.epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_sequence(
        &self,
        sequence: u64,
    ) {
        self.inner.lock().sequence = sequence;
    }

    pub(crate) fn mark_scheduled(&self) {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Created {
            inner.state = TaskState::Scheduled;
        }
    }

    /// Scheduled → Running. `None` if the task was cancelled meanwhile.
    pub(crate) fn begin(
        &self,
        core: Option<usize>,
    ) -> Option<RunTicket> {
        let mut inner = self.inner.lock();
        if inner.state != TaskState::Scheduled || inner.action.is_none() {
            return None;
        }
        inner.state = TaskState::Running;
        inner.core = core;
        Some(RunTicket {
            args: mem::take(&mut inner.args),
            result: inner.result.clone(),
        })
    }

    /// Hand the argument buffer back after the body returned.
    pub(crate) fn restore_args(
        &self,
        args: Vec<u8>,
    ) {
        self.inner.lock().args = args;
    }

    pub(crate) fn with_args<R>(
        &self,
        f: impl FnOnce(&[u8]) -> R,
    ) -> R {
        f(&self.inner.lock().args)
    }

    pub(crate) fn result_buffer(&self) -> Option<ResultBuffer> {
        self.inner.lock().result.clone()
    }

    /// Move to a terminal state. `None` if already terminal.
    pub(crate) fn finish(
        &self,
        state: TaskState,
        error: Option<String>,
    ) -> Option<Completion> {
        debug_assert!(state.is_terminal());
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return None;
        }
        Some(Self::terminate(&mut inner, state, error))
    }

    fn terminate(
        inner: &mut TaskInner,
        state: TaskState,
        error: Option<String>,
    ) -> Completion {
        inner.state = state;
        inner.error = error.clone();
        Completion {
            state,
            error,
            action: inner.action,
            group: inner.group,
            queue: inner.queue,
            detached: inner.detached,
        }
    }

    /// Make the terminal state visible to waiters.
    pub(crate) fn settle(&self) {
        let mut inner = self.inner.lock();
        inner.settled = true;
        self.settled.notify_all();
    }

    pub(crate) fn request_cancel(&self) -> CancelRequest {
        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Created | TaskState::Scheduled => {
                CancelRequest::Cancelled(Self::terminate(&mut inner, TaskState::Cancelled, None))
            },
            TaskState::Running => {
                self.cancel.store(true, Ordering::Release);
                CancelRequest::Running(inner.action)
            },
            _ => CancelRequest::Finished,
        }
    }

    /// Block until the task settles or the timeout elapses.
    pub(crate) fn wait(
        &self,
        timeout: Timeout,
    ) -> Result<(TaskState, Option<String>)> {
        let deadline = timeout.deadline();
        let mut inner = self.inner.lock();
        let epoch = inner.epoch;
        loop {
            if inner.epoch != epoch {
                return Err(Error::InvalidHandle(ObjectKind::Task));
            }
            if inner.settled {
                return Ok((inner.state, inner.error.clone()));
            }
            match deadline {
                None => self.settled.wait(&mut inner),
                Some(deadline) => {
                    if self.settled.wait_until(&mut inner, deadline).timed_out()
                        && !inner.settled
                    {
                        return Err(Error::Timeout);
                    }
                },
            }
        }
    }

    pub(crate) fn action_handle(&self) -> Option<ActionHandle> {
        self.inner.lock().action
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    /// Get the current state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.inner.lock().id
    }

    #[inline]
    pub fn job(&self) -> JobId {
        self.inner.lock().job
    }

    #[inline]
    pub fn priority(&self) -> TaskPriority {
        self.inner.lock().priority
    }

    #[inline]
    pub fn affinity(&self) -> Affinity {
        self.inner.lock().affinity
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.inner.lock().detached
    }

    /// Position within its queue, if it was started into one.
    #[inline]
    pub fn sequence(&self) -> Option<u64> {
        let inner = self.inner.lock();
        inner.queue.map(|_| inner.sequence)
    }

    /// Core the task ran on.
    #[inline]
    pub fn core(&self) -> Option<usize> {
        self.inner.lock().core
    }
}

impl Poolable for Task {
    const KIND: ObjectKind = ObjectKind::Task;

    fn reset(&self) {
        let mut inner = self.inner.lock();
        let args = mem::take(&mut inner.args);
        let epoch = inner.epoch;
        *inner = TaskInner {
            args,
            epoch: epoch.wrapping_add(1),
            ..TaskInner::default()
        };
        inner.args.clear();
        self.epoch.store(inner.epoch, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
        // Wake stale waiters so they notice the epoch change.
        self.settled.notify_all();
    }

    fn reserved_bytes(&self) -> usize {
        mem::size_of::<Self>() + self.arg_capacity
    }
}

impl fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Task")
            .field("id", &inner.id)
            .field("job", &inner.job)
            .field("state", &inner.state)
            .field("priority", &inner.priority)
            .field("affinity", &inner.affinity)
            .finish()
    }
}

/// Iterator for generating task IDs.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next_id: AtomicUsize,
}

impl TaskIdGenerator {
    /// Create a new task ID generator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next task ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// Builder for starting tasks.
///
/// ```rust
/// # use tasknode::{ActionAttributes, JobId, Node, NodeAttributes, ResultBuffer, TaskPriority, Timeout};
/// # use tasknode::runtime::node::{DomainId, NodeId};
/// # let node = Node::initialize(DomainId(0), NodeId(0), NodeAttributes::with_cores(1)).unwrap();
/// node.action_create(JobId(3), |ctx| {
///     let doubled = ctx.args()[0] * 2;
///     ctx.result_mut()[0] = doubled;
///     Ok(())
/// }, &[], ActionAttributes::default()).unwrap();
///
/// let result = ResultBuffer::with_len(1);
/// let task = node
///     .task(node.job_get(JobId(3)).unwrap())
///     .args(&[21])
///     .result(result.clone())
///     .priority(TaskPriority::High)
///     .start()
///     .unwrap();
/// node.task_wait(task, Timeout::Infinite).unwrap();
/// assert_eq!(result.to_vec(), vec![42]);
/// ```
#[derive(Debug)]
pub struct TaskBuilder<'a> {
    node: &'a Node,
    job: JobHandle,
    args: &'a [u8],
    result: Option<ResultBuffer>,
    attributes: TaskAttributes,
    group: Option<GroupHandle>,
    queue: Option<QueueHandle>,
}

impl<'a> TaskBuilder<'a> {
    /// Create a new task builder.
    #[inline]
    pub fn new(
        node: &'a Node,
        job: JobHandle,
    ) -> Self {
        Self {
            node,
            job,
            args: &[],
            result: None,
            attributes: TaskAttributes::default(),
            group: None,
            queue: None,
        }
    }

    /// Set the argument bytes.
    #[inline]
    pub fn args(
        mut self,
        args: &'a [u8],
    ) -> Self {
        self.args = args;
        self
    }

    /// Set the result buffer.
    #[inline]
    pub fn result(
        mut self,
        result: ResultBuffer,
    ) -> Self {
        self.result = Some(result);
        self
    }

    /// Set the task ID.
    #[inline]
    pub fn id(
        mut self,
        id: TaskId,
    ) -> Self {
        self.attributes.id = Some(id);
        self
    }

    /// Set the task priority.
    #[inline]
    pub fn priority(
        mut self,
        priority: TaskPriority,
    ) -> Self {
        self.attributes.priority = priority;
        self
    }

    /// Restrict the cores allowed to run the task.
    #[inline]
    pub fn affinity(
        mut self,
        affinity: Affinity,
    ) -> Self {
        self.attributes.affinity = affinity;
        self
    }

    /// Release the task as soon as it finishes.
    #[inline]
    pub fn detached(mut self) -> Self {
        self.attributes.detached = true;
        self
    }

    #[inline]
    pub fn group(
        mut self,
        group: GroupHandle,
    ) -> Self {
        self.group = Some(group);
        self
    }

    #[inline]
    pub fn queue(
        mut self,
        queue: QueueHandle,
    ) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Start the task.
    pub fn start(self) -> Result<TaskHandle> {
        self.node.task_start(
            self.job,
            self.args,
            self.result,
            &self.attributes,
            self.group,
            self.queue,
        )
    }
}
