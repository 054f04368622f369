//! Per-core worker threads

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, warn};

use super::task::{RunTicket, Task, TaskContext, TaskHandle, TaskState};
use super::Work;
use crate::error::{Error, Result};
use crate::runtime::action::{Action, ActionFunction, NativeFn};
use crate::runtime::node::Runtime;
use crate::runtime::queue::QueueHandle;

/// Start one worker thread per configured core.
pub(crate) fn spawn_workers(runtime: &Arc<Runtime>) -> Result<Vec<JoinHandle<()>>> {
    let config = runtime.scheduler.config().clone();
    let mut workers = Vec::with_capacity(config.num_workers);

    for index in 0..config.num_workers {
        let worker = Worker {
            index,
            runtime: runtime.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("tasknode-worker-{}", index))
            .stack_size(config.stack_size)
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => workers.push(handle),
            Err(err) => {
                runtime.scheduler.shutdown();
                for handle in workers {
                    let _ = handle.join();
                }
                return Err(Error::Unknown(format!(
                    "failed to spawn worker {}: {}",
                    index, err
                )));
            },
        }
    }

    Ok(workers)
}

struct Worker {
    index: usize,
    runtime: Arc<Runtime>,
}

impl Worker {
    /// Worker thread main loop.
    fn run(self) {
        debug!(worker = self.index, "worker started");
        let scheduler = &self.runtime.scheduler;

        while scheduler.is_running() {
            match scheduler.next_work(self.index) {
                Some(Work::Task(entry)) => {
                    self.runtime.execute(self.index, entry.task);
                },
                Some(Work::Queue(queue)) => self.runtime.run_queue_head(self.index, queue),
                None => scheduler.park(self.index),
            }
        }

        debug!(worker = self.index, "worker stopped");
    }
}

impl Runtime {
    /// Run a scheduled task on `worker`. Returns `false` if the task was no
    /// longer runnable (cancelled, or its slot released).
    pub(crate) fn execute(
        self: &Arc<Self>,
        worker: usize,
        handle: TaskHandle,
    ) -> bool {
        let Ok(task) = self.tasks.get(handle) else {
            return false;
        };
        let action = task
            .action_handle()
            .and_then(|action| self.actions.get(action).ok())
            .and_then(Action::binding);
        let Some(binding) = action else {
            // Resolution holds a reference, so this is only reachable for a
            // task that finished meanwhile.
            return false;
        };

        match binding.function {
            ActionFunction::Native(body) => {
                let Some(ticket) = task.begin(Some(worker)) else {
                    return false;
                };
                self.run_native(worker, handle, task, ticket, &body, &binding.node_local);
                true
            },
            ActionFunction::Plugin(plugin) => {
                self.launch_plugin(handle, task, Some(worker), plugin, binding.node_local)
            },
        }
    }

    fn run_native(
        &self,
        worker: usize,
        handle: TaskHandle,
        task: &Task,
        ticket: RunTicket,
        body: &Arc<NativeFn>,
        node_local: &[u8],
    ) {
        let stats = self.scheduler.stats();
        stats.record_started();
        let started = Instant::now();

        let (state, error) = {
            let mut result = ticket.result.as_ref().map(|buffer| buffer.lock());
            let mut ctx = TaskContext {
                core: worker,
                task: handle,
                args: &ticket.args,
                result: match result.as_mut() {
                    Some(bytes) => bytes.as_mut_slice(),
                    None => &mut [],
                },
                node_local,
                cancel: task.cancel_flag(),
                cancel_acknowledged: false,
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut ctx)));
            let acknowledged = ctx.cancel_acknowledged;

            match outcome {
                Ok(_) if acknowledged => (TaskState::Cancelled, None),
                Ok(Ok(())) => (TaskState::Completed, None),
                Ok(Err(err)) => (TaskState::Error, Some(format!("{:#}", err))),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(task = %handle, worker, %message, "action body panicked");
                    (TaskState::Error, Some(message))
                },
            }
        };

        stats.record_completed(started.elapsed().as_micros() as usize);
        task.restore_args(ticket.args);
        self.complete_task(handle, state, error);
    }

    /// Run the head of an ordered queue, skipping members that were
    /// cancelled while pending.
    pub(crate) fn run_queue_head(
        self: &Arc<Self>,
        worker: usize,
        handle: QueueHandle,
    ) {
        let Ok(queue) = self.queues.get(handle) else {
            return;
        };
        while let Some(head) = queue.claim() {
            if self.execute(worker, head) {
                return;
            }
            queue.skip(head);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("action panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("action panicked: {}", message)
    } else {
        "action panicked".to_string()
    }
}
