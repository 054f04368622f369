//! tasknode: a multicore task-execution runtime
//!
//! Applications register executable units (actions) under job ids, start
//! tasks that name a job plus argument bytes and an optional result buffer,
//! and the node distributes those tasks across a fixed set of worker cores,
//! honouring priority, core affinity and submission order.
//!
//! # Example
//!
//! ```rust
//! use tasknode::{ActionAttributes, JobId, Node, NodeAttributes, ResultBuffer, Timeout};
//! use tasknode::runtime::node::{DomainId, NodeId};
//!
//! fn main() -> tasknode::Result<()> {
//!     let node = Node::initialize(DomainId(0), NodeId(0), NodeAttributes::with_cores(2))?;
//!     node.action_create(
//!         JobId(1),
//!         |ctx| {
//!             let sum: u8 = ctx.args().iter().sum();
//!             ctx.result_mut()[0] = sum;
//!             Ok(())
//!         },
//!         &[],
//!         ActionAttributes::default(),
//!     )?;
//!
//!     let result = ResultBuffer::with_len(1);
//!     let job = node.job_get(JobId(1))?;
//!     let task = node.task(job).args(&[1, 2, 3]).result(result.clone()).start()?;
//!     node.task_wait(task, Timeout::Infinite)?;
//!     assert_eq!(result.to_vec(), vec![6]);
//!
//!     node.finalize()
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/tasknode")]
#![warn(rust_2018_idioms)]

pub mod duration;
pub mod error;
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use duration::{
    Duration, DurationError, Microseconds, Milliseconds, Nanoseconds, Seconds, Tick, Timeout,
};
pub use error::{Error, ObjectKind, Result, Status};
pub use runtime::action::{
    ActionAttributes, ActionFunction, ActionHandle, ActionLifecycle, ActionPlugin,
};
pub use runtime::affinity::Affinity;
pub use runtime::group::{GroupHandle, GroupMember};
pub use runtime::job::{JobHandle, JobId};
pub use runtime::memory::MemoryTracker;
pub use runtime::node::{DomainId, Node, NodeId, NodeInfo};
pub use runtime::plugin::{ControlPlugin, PluginTask};
pub use runtime::queue::{QueueAttributes, QueueHandle};
pub use runtime::scheduler::{
    ResultBuffer, TaskAttributes, TaskBuilder, TaskContext, TaskHandle, TaskId, TaskPriority,
    TaskState,
};
pub use util::config::NodeAttributes;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
