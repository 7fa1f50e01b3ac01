//! Error types shared across the kernel.

use std::time::Duration;

use agent_core::TaskKind;
use thiserror::Error;

/// Failure of a single call into the world-interaction surface.
///
/// All variants are transient from the kernel's point of view: perception turns
/// them into a stale snapshot, handlers turn them into a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("world did not answer within {0:?}")]
    Timeout(Duration),

    #[error("world unavailable: {0}")]
    Unavailable(String),

    #[error("target unreachable: {0}")]
    Unreachable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("action rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("invalid params for {kind}: {reason}")]
    InvalidParams { kind: TaskKind, reason: String },

    #[error("task queue full ({0} tasks queued)")]
    QueueFull(usize),

    #[error("preempted by {0}")]
    Preempted(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    World(#[from] WorldError),
}

/// Configuration rejected by validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid config value for {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
