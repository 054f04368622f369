//! Node configuration
//!
//! [`NodeAttributes`] fixes everything a node sizes at initialization: the
//! number of worker cores and the capacity of every object pool.
//!
//! # Usage
//!
//! ```rust
//! use tasknode::util::config::NodeAttributes;
//!
//! let attributes = NodeAttributes::from_ron_str("(core_count: 2, max_tasks: 64)").unwrap();
//! assert_eq!(attributes.core_count, 2);
//! assert_eq!(attributes.max_tasks, 64);
//! // Fields left out keep their defaults.
//! assert_eq!(attributes.max_queues, NodeAttributes::default().max_queues);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::affinity::MAX_CORES;
use crate::runtime::memory::MAX_CAPACITY;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid node attributes: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("{field} {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Sizing and behavior of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAttributes {
    /// Worker threads, one per core.
    pub core_count: usize,
    /// Action pool capacity.
    pub max_actions: usize,
    /// Actions that may implement one job at the same time.
    pub max_actions_per_job: usize,
    /// Valid job ids are `0..max_jobs`.
    pub max_jobs: usize,
    /// Task pool capacity.
    pub max_tasks: usize,
    /// Group pool capacity.
    pub max_groups: usize,
    /// Queue pool capacity.
    pub max_queues: usize,
    /// Pending tasks one queue can hold.
    pub queue_limit: usize,
    /// Largest argument blob a task may carry.
    pub max_argument_bytes: usize,
    /// Whether idle workers steal from busy ones.
    pub use_work_stealing: bool,
    /// Longest a parked worker sleeps before looking for work again.
    pub idle_timeout_ms: u64,
    /// Worker thread stack size in bytes.
    pub worker_stack_size: usize,
}

impl Default for NodeAttributes {
    fn default() -> Self {
        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            core_count: cores.min(MAX_CORES),
            max_actions: 64,
            max_actions_per_job: 4,
            max_jobs: 256,
            max_tasks: 1024,
            max_groups: 128,
            max_queues: 64,
            queue_limit: 1024,
            max_argument_bytes: 256,
            use_work_stealing: true,
            idle_timeout_ms: 10,
            worker_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl NodeAttributes {
    /// Defaults with `core_count` workers.
    pub fn with_cores(core_count: usize) -> Self {
        Self {
            core_count,
            ..Self::default()
        }
    }

    /// Parse attributes from RON text; missing fields take their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let attributes: Self = ron::from_str(text)?;
        attributes.validate()?;
        Ok(attributes)
    }

    /// Load attributes from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&text)
    }

    /// Check the attributes describe a node that can be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.core_count == 0 || self.core_count > MAX_CORES {
            return Err(ConfigError::Invalid {
                field: "core_count",
                reason: format!("must be between 1 and {}", MAX_CORES),
            });
        }
        let capacities = [
            ("max_actions", self.max_actions),
            ("max_actions_per_job", self.max_actions_per_job),
            ("max_jobs", self.max_jobs),
            ("max_tasks", self.max_tasks),
            ("max_groups", self.max_groups),
            ("max_queues", self.max_queues),
            ("queue_limit", self.queue_limit),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be zero".to_string(),
                });
            }
            if value > MAX_CAPACITY {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "does not fit a handle index".to_string(),
                });
            }
        }
        Ok(())
    }
}
