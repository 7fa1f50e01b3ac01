//! Task record and its lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// The fixed capability set tasks are dispatched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Mine,
    Explore,
    Build,
    Gather,
    Goto,
    Follow,
    Craft,
    Deposit,
    Patrol,
    Defend,
}

impl TaskKind {
    pub const ALL: [TaskKind; 10] = [
        Self::Mine,
        Self::Explore,
        Self::Build,
        Self::Gather,
        Self::Goto,
        Self::Follow,
        Self::Craft,
        Self::Deposit,
        Self::Patrol,
        Self::Defend,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mine => "mine",
            Self::Explore => "explore",
            Self::Build => "build",
            Self::Gather => "gather",
            Self::Goto => "goto",
            Self::Follow => "follow",
            Self::Craft => "craft",
            Self::Deposit => "deposit",
            Self::Patrol => "patrol",
            Self::Defend => "defend",
        }
    }

    /// Parse task kind from name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task type: {0}")]
pub struct UnknownTaskKind(pub String);

impl FromStr for TaskKind {
    type Err = UnknownTaskKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownTaskKind(s.to_string()))
    }
}

/// Who asked for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    /// Command surface (player or operator).
    External,
    /// Routine decision translated by the control bus.
    Decision,
    /// The agent's active goal.
    Goal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Queued -> Executing -> {Completed | Failed | Cancelled}; a queued task may
    /// also end without running (cancelled, or failed at dispatch).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Queued, Executing)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Executing, Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal task transition {from:?} -> {to:?} for {id}")]
pub struct TransitionError {
    pub id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    #[serde(default)]
    pub params: serde_json::Value,
    pub priority: i32,
    pub origin: TaskOrigin,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        params: serde_json::Value,
        priority: i32,
        origin: TaskOrigin,
    ) -> Self {
        Self {
            id,
            kind,
            params,
            priority,
            origin,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    fn advance(&mut self, next: TaskStatus) -> Result<DateTime<Utc>, TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        if next == TaskStatus::Executing {
            self.started_at = Some(now);
        } else {
            self.completed_at = Some(now);
        }
        Ok(now)
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.advance(TaskStatus::Executing).map(|_| ())
    }

    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), TransitionError> {
        self.advance(TaskStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.advance(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), TransitionError> {
        self.advance(TaskStatus::Cancelled)?;
        self.error = reason;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            TaskId(1),
            TaskKind::Mine,
            serde_json::Value::Null,
            5,
            TaskOrigin::External,
        )
    }

    #[test]
    fn lifecycle_is_monotonic() {
        let mut t = task();
        t.start().unwrap();
        assert!(t.started_at.is_some());
        t.complete(serde_json::json!({"mined": 3})).unwrap();
        assert!(t.completed_at.is_some());

        let err = t.start().unwrap_err();
        assert_eq!(err.from, TaskStatus::Completed);
        assert_eq!(err.to, TaskStatus::Executing);
    }

    #[test]
    fn nothing_re_enters_queued() {
        for from in [
            TaskStatus::Queued,
            TaskStatus::Executing,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert!(!from.can_transition_to(TaskStatus::Queued));
        }
    }

    #[test]
    fn queued_task_can_fail_at_dispatch() {
        let mut t = task();
        t.fail("unknown task type: mine").unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.started_at.is_none());
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.name().parse::<TaskKind>(), Ok(kind));
        }
        assert_eq!(" Goto ".parse::<TaskKind>(), Ok(TaskKind::Goto));
        assert!("fly".parse::<TaskKind>().is_err());
    }
}
