//! Task scheduler for multicore execution
//!
//! The scheduler owns the per-worker ready queues, the lists announcing
//! runnable ordered queues, and one parker per worker. It decides where a
//! task goes; the workers themselves live in [`worker`].
//!
//! A worker looks for work in this order:
//! 1. its own ready queue, highest priority band first
//! 2. ordered queues bound to its core
//! 3. unbound ordered queues
//! 4. a task stolen from another worker (if enabled)
//!
//! and parks when all four come up empty.

pub mod queue;
pub mod task;
pub mod work_stealer;
pub(crate) mod worker;

pub use queue::{HandleQueue, PriorityTaskQueue, ReadyEntry};
pub use task::{
    ResultBuffer, Task, TaskAttributes, TaskBuilder, TaskContext, TaskHandle, TaskId,
    TaskIdGenerator, TaskPriority, TaskState,
};
pub use work_stealer::{StealStats, WorkStealer};

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{Error, Result};
use crate::runtime::memory::{MemoryReservation, MemoryTracker};
use crate::runtime::queue::QueueHandle;
use crate::util::config::NodeAttributes;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Worker thread stack size.
    pub stack_size: usize,
    /// Initial room per priority band of each worker's ready queue.
    pub ready_capacity: usize,
    /// Initial room of the lists announcing runnable ordered queues.
    pub queue_capacity: usize,
    /// Whether idle workers steal from busy ones.
    pub use_work_stealing: bool,
    /// Longest a parked worker sleeps before looking for work again.
    pub idle_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&NodeAttributes::default())
    }
}

impl From<&NodeAttributes> for SchedulerConfig {
    fn from(attributes: &NodeAttributes) -> Self {
        Self {
            num_workers: attributes.core_count,
            stack_size: attributes.worker_stack_size,
            ready_capacity: attributes.max_tasks,
            queue_capacity: attributes.max_queues,
            use_work_stealing: attributes.use_work_stealing,
            idle_timeout: Duration::from_millis(attributes.idle_timeout_ms),
        }
    }
}

/// Scheduler statistics.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Total tasks scheduled.
    pub tasks_scheduled: AtomicUsize,
    /// Total tasks whose body ran to completion.
    pub tasks_completed: AtomicUsize,
    /// Total tasks stolen.
    pub tasks_stolen: AtomicUsize,
    /// Total execution time in microseconds.
    pub total_exec_time_us: AtomicUsize,
    /// Peak number of bodies running at once.
    pub peak_parallelism: AtomicUsize,
    running: AtomicUsize,
}

impl SchedulerStats {
    /// Record a scheduled task.
    #[inline]
    pub fn record_scheduled(&self) {
        self.tasks_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a body starting.
    #[inline]
    pub fn record_started(&self) {
        let current = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.update_parallelism(current);
    }

    /// Record a completed body.
    #[inline]
    pub fn record_completed(
        &self,
        duration_us: usize,
    ) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.total_exec_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    /// Record a steal.
    #[inline]
    pub fn record_steal(&self) {
        self.tasks_stolen.fetch_add(1, Ordering::Relaxed);
    }

    /// Update parallelism.
    #[inline]
    pub fn update_parallelism(
        &self,
        current: usize,
    ) {
        self.peak_parallelism.fetch_max(current, Ordering::SeqCst);
    }
}

/// Per-worker sleep slot.
#[derive(Debug, Default)]
struct Parker {
    notified: Mutex<bool>,
    condvar: Condvar,
    sleeping: AtomicBool,
}

impl Parker {
    fn park(
        &self,
        timeout: Duration,
    ) {
        let mut notified = self.notified.lock();
        if !*notified {
            self.sleeping.store(true, Ordering::SeqCst);
            self.condvar.wait_for(&mut notified, timeout);
            self.sleeping.store(false, Ordering::SeqCst);
        }
        *notified = false;
    }

    fn unpark(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.condvar.notify_one();
    }

    #[inline]
    fn is_sleeping(&self) -> bool {
        self.sleeping.load(Ordering::SeqCst)
    }
}

/// Work found by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Work {
    /// A task from a ready queue.
    Task(ReadyEntry),
    /// An ordered queue whose head may run.
    Queue(QueueHandle),
}

/// Placement and work discovery for the node's workers.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    locals: Box<[PriorityTaskQueue]>,
    bound_queues: Box<[HandleQueue<QueueHandle>]>,
    shared_queues: HandleQueue<QueueHandle>,
    parkers: Box<[Parker]>,
    running: AtomicBool,
    next_worker: AtomicUsize,
    stealer: WorkStealer,
    stats: SchedulerStats,
    _buffers: MemoryReservation,
}

impl Scheduler {
    /// Create the scheduler; no threads are started here.
    pub fn new(
        config: SchedulerConfig,
        tracker: &MemoryTracker,
    ) -> Self {
        let workers = config.num_workers;
        let locals: Box<[_]> = (0..workers)
            .map(|_| PriorityTaskQueue::with_capacity(config.ready_capacity))
            .collect();
        let bound_queues: Box<[_]> = (0..workers)
            .map(|_| HandleQueue::with_capacity(config.queue_capacity))
            .collect();
        let parkers: Box<[_]> = (0..workers).map(|_| Parker::default()).collect();

        let ready_bytes =
            workers * TaskPriority::COUNT * config.ready_capacity * mem::size_of::<ReadyEntry>();
        let queue_bytes = (workers + 1) * config.queue_capacity * mem::size_of::<QueueHandle>();
        let buffers = tracker.reserve(ready_bytes + queue_bytes);

        Self {
            locals,
            bound_queues,
            shared_queues: HandleQueue::with_capacity(config.queue_capacity),
            parkers,
            running: AtomicBool::new(true),
            next_worker: AtomicUsize::new(0),
            stealer: WorkStealer::new(),
            stats: SchedulerStats::default(),
            _buffers: buffers,
            config,
        }
    }

    /// Put a task on the ready queue of a worker its affinity allows.
    ///
    /// Single-core affinity pins the task; otherwise allowed workers are
    /// picked round-robin. Returns the chosen worker.
    pub fn place(
        &self,
        entry: ReadyEntry,
        priority: TaskPriority,
    ) -> Result<usize> {
        if !self.is_running() {
            return Err(Error::ShuttingDown);
        }
        let allowed = entry.affinity.limit(self.config.num_workers);
        let target = match allowed.single_core() {
            Some(core) => core,
            None => {
                let count = allowed.count();
                if count == 0 {
                    return Err(Error::InvalidArgument(
                        "affinity excludes every worker".to_string(),
                    ));
                }
                let turn = self.next_worker.fetch_add(1, Ordering::Relaxed) % count;
                allowed
                    .nth(turn)
                    .ok_or_else(|| Error::Unknown("affinity mask changed".to_string()))?
            },
        };

        self.locals[target].push(entry, priority);
        self.stats.record_scheduled();
        trace!(task = %entry.task, worker = target, "task placed");

        self.unpark(target);
        if allowed.count() > 1 {
            // Another idle worker allowed to run it may steal it sooner.
            if let Some(peer) = allowed
                .cores()
                .find(|&core| core != target && self.parkers[core].is_sleeping())
            {
                self.unpark(peer);
            }
        }
        Ok(target)
    }

    /// Announce that an ordered queue has a runnable head.
    pub(crate) fn schedule_queue(
        &self,
        queue: QueueHandle,
        core: Option<usize>,
    ) {
        match core.filter(|&core| core < self.config.num_workers) {
            Some(core) => {
                self.bound_queues[core].push(queue);
                self.unpark(core);
            },
            None => {
                self.shared_queues.push(queue);
                self.wake_idle();
            },
        }
    }

    /// Forget announcements for a queue being deleted.
    pub(crate) fn forget_queue(
        &self,
        queue: QueueHandle,
    ) {
        self.shared_queues.remove(queue);
        for bound in self.bound_queues.iter() {
            bound.remove(queue);
        }
    }

    /// Drop the ready entry of a task that will not run.
    pub(crate) fn withdraw(
        &self,
        task: TaskHandle,
    ) -> bool {
        self.locals.iter().any(|local| local.remove(task))
    }

    /// Next piece of work for `worker`, if any.
    pub(crate) fn next_work(
        &self,
        worker: usize,
    ) -> Option<Work> {
        if let Some(entry) = self.locals[worker].pop() {
            return Some(Work::Task(entry));
        }
        if let Some(queue) = self.bound_queues[worker].pop_front() {
            return Some(Work::Queue(queue));
        }
        if let Some(queue) = self.shared_queues.pop_front() {
            return Some(Work::Queue(queue));
        }
        if self.config.use_work_stealing {
            if let Some(entry) = self.stealer.steal(worker, &self.locals) {
                self.stats.record_steal();
                trace!(task = %entry.task, worker, "task stolen");
                return Some(Work::Task(entry));
            }
        }
        None
    }

    /// Sleep until woken or the idle timeout elapses.
    pub(crate) fn park(
        &self,
        worker: usize,
    ) {
        if self.is_running() {
            self.parkers[worker].park(self.config.idle_timeout);
        }
    }

    #[inline]
    pub(crate) fn unpark(
        &self,
        worker: usize,
    ) {
        if let Some(parker) = self.parkers.get(worker) {
            parker.unpark();
        }
    }

    fn wake_idle(&self) {
        match self.parkers.iter().position(Parker::is_sleeping) {
            Some(worker) => self.unpark(worker),
            None => self.unpark(0),
        }
    }

    /// Stop accepting work and wake every worker so it can exit.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        for parker in self.parkers.iter() {
            parker.unpark();
        }
    }

    /// Check if the scheduler is running.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get statistics.
    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    #[inline]
    pub fn steal_stats(&self) -> &StealStats {
        self.stealer.stats()
    }

    /// Entries waiting in ready queues.
    pub fn pending(&self) -> usize {
        self.locals.iter().map(PriorityTaskQueue::len).sum()
    }
}
