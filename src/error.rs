//! Runtime errors
//!
//! Every runtime operation reports failure through [`Error`]; the closed
//! [`Status`] enumeration is the coarse, out-of-band view of the same result.

use std::fmt;

use thiserror::Error;

use crate::runtime::job::JobId;

/// Runtime result
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of runtime object, used to qualify pool and handle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Action,
    Job,
    Task,
    Group,
    Queue,
}

impl fmt::Display for ObjectKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ObjectKind::Action => "action",
            ObjectKind::Job => "job",
            ObjectKind::Task => "task",
            ObjectKind::Group => "group",
            ObjectKind::Queue => "queue",
        };
        f.write_str(name)
    }
}

/// Runtime errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0} pool exhausted")]
    Exhausted(ObjectKind),

    #[error("invalid {0} handle")]
    InvalidHandle(ObjectKind),

    #[error("no eligible action for job {0}")]
    InvalidJob(JobId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation timed out")]
    Timeout,

    #[error("{0} is still in use")]
    Busy(ObjectKind),

    #[error("queue is disabled")]
    QueueDisabled,

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("task was cancelled")]
    Cancelled,

    #[error("group has no outstanding tasks")]
    GroupCompleted,

    #[error("node is shutting down")]
    ShuttingDown,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Closed status code for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::Exhausted(_) => Status::Exhausted,
            Error::InvalidHandle(_) | Error::InvalidJob(_) => Status::InvalidHandle,
            Error::InvalidArgument(_) => Status::InvalidArgument,
            Error::Timeout => Status::Timeout,
            Error::Busy(_) => Status::Busy,
            Error::QueueDisabled => Status::Disabled,
            Error::ActionFailed(_) => Status::ActionFailed,
            Error::Cancelled => Status::Cancelled,
            Error::GroupCompleted => Status::GroupCompleted,
            Error::ShuttingDown | Error::Unknown(_) => Status::Unknown,
        }
    }

    /// Whether the caller may retry the same call later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.status(),
            Status::Exhausted | Status::Timeout | Status::Busy
        )
    }
}

/// Status codes reported by every runtime call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Exhausted,
    InvalidHandle,
    InvalidArgument,
    Timeout,
    Busy,
    Disabled,
    ActionFailed,
    Cancelled,
    GroupCompleted,
    Unknown,
}

impl Status {
    /// Status of a finished call.
    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}
