use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::inventory::ToolClass;
use crate::task::{Task, TaskKind, TaskOrigin, TaskStatus};

/// Operating mode of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Passive: survives and works, never picks fights.
    #[default]
    Basic,
    /// Defends itself and ticks on the alert period.
    Advanced,
    /// Passive idle variant; keeps the session alive with small movements.
    Afk,
}

impl AgentMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
            Self::Afk => "afk",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" | "passive" => Ok(Self::Basic),
            "advanced" | "player" => Ok(Self::Advanced),
            "afk" => Ok(Self::Afk),
            other => Err(format!("unknown agent mode: {other}")),
        }
    }
}

/// Long-running objective the agent works towards through its task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default = "default_goal_priority")]
    pub priority: i32,
    #[serde(default)]
    pub required_tool: Option<ToolClass>,
}

fn default_goal_priority() -> i32 {
    5
}

impl Goal {
    pub fn new(description: impl Into<String>, kind: TaskKind, params: serde_json::Value) -> Self {
        Self {
            description: description.into(),
            kind,
            params,
            priority: default_goal_priority(),
            required_tool: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn requiring(mut self, tool: ToolClass) -> Self {
        self.required_tool = Some(tool);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Consecutive failures of goal tasks.
    pub goal_failures: u32,
    pub last_kind: Option<TaskKind>,
    pub last_status: Option<TaskStatus>,
}

/// Mutable agent record, owned by the decision engine.
///
/// Readers get `&AgentState`; writes go through the engine's setters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    mode: AgentMode,
    goal: Option<Goal>,
    in_combat: bool,
    stats: OutcomeStats,
}

impl AgentState {
    pub fn new(mode: AgentMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    pub fn in_combat(&self) -> bool {
        self.in_combat
    }

    pub fn stats(&self) -> &OutcomeStats {
        &self.stats
    }

    pub(crate) fn set_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }

    pub(crate) fn set_goal(&mut self, goal: Option<Goal>) {
        self.goal = goal;
        self.stats.goal_failures = 0;
    }

    pub(crate) fn set_combat(&mut self, in_combat: bool) {
        self.in_combat = in_combat;
    }

    /// Fold a finished task into the counters.
    ///
    /// Returns true when the active goal was resolved (completed, or dropped
    /// after `max_goal_failures` consecutive failures).
    pub(crate) fn record_outcome(&mut self, task: &Task, max_goal_failures: u32) -> bool {
        match task.status {
            TaskStatus::Completed => self.stats.completed += 1,
            TaskStatus::Failed => self.stats.failed += 1,
            TaskStatus::Cancelled => self.stats.cancelled += 1,
            TaskStatus::Queued | TaskStatus::Executing => return false,
        }
        self.stats.last_kind = Some(task.kind);
        self.stats.last_status = Some(task.status);

        if task.origin != TaskOrigin::Goal {
            return false;
        }
        let Some(goal) = self.goal.as_ref() else {
            return false;
        };
        if goal.kind != task.kind {
            return false;
        }

        match task.status {
            TaskStatus::Completed => {
                self.goal = None;
                self.stats.goal_failures = 0;
                true
            }
            TaskStatus::Failed => {
                self.stats.goal_failures += 1;
                if self.stats.goal_failures >= max_goal_failures.max(1) {
                    self.goal = None;
                    self.stats.goal_failures = 0;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}
