//! Priority rules and the default catalog.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{HazardKind, WorldSnapshot};
use crate::state::{AgentMode, AgentState};
use crate::threat;

/// What the agent should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    Retreat,
    FindFood,
    Defend,
    Escape,
    DepositItems,
    CraftTools,
    ExecuteGoal,
    AntiIdle,
    Wander,
    Idle,
}

impl ActionId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retreat => "retreat",
            Self::FindFood => "find_food",
            Self::Defend => "defend",
            Self::Escape => "escape",
            Self::DepositItems => "deposit_items",
            Self::CraftTools => "craft_tools",
            Self::ExecuteGoal => "execute_goal",
            Self::AntiIdle => "anti_idle",
            Self::Wander => "wander",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bookkeeping group; evaluation order is by priority alone, with group order
/// only breaking ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGroup {
    Survival,
    Task,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("snapshot field unavailable: {0}")]
    MissingData(&'static str),

    #[error("{0}")]
    Failed(String),
}

pub type Condition = dyn Fn(&WorldSnapshot, &AgentState) -> Result<bool, RuleError> + Send + Sync;

pub struct Rule {
    pub name: &'static str,
    pub group: RuleGroup,
    pub action: ActionId,
    pub priority: i32,
    condition: Box<Condition>,
}

impl Rule {
    pub fn new(
        name: &'static str,
        group: RuleGroup,
        action: ActionId,
        priority: i32,
        condition: impl Fn(&WorldSnapshot, &AgentState) -> Result<bool, RuleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            group,
            action,
            priority,
            condition: Box::new(condition),
        }
    }

    pub fn evaluate(&self, snapshot: &WorldSnapshot, state: &AgentState) -> Result<bool, RuleError> {
        (self.condition)(snapshot, state)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("action", &self.action)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Tunable thresholds for the default catalog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub low_health: f32,
    pub low_hunger: f32,
    pub defend_radius: f64,
    /// Burning hazards closer than this count as adjacent.
    pub hazard_adjacency: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            low_health: 6.0,
            low_hunger: 6.0,
            defend_radius: 8.0,
            hazard_adjacency: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePriorities {
    pub retreat: i32,
    pub find_food: i32,
    pub defend: i32,
    pub escape: i32,
    pub deposit_items: i32,
    pub craft_tools: i32,
    pub execute_goal: i32,
    pub anti_idle: i32,
    pub wander: i32,
}

impl Default for RulePriorities {
    fn default() -> Self {
        Self {
            retreat: 10,
            find_food: 9,
            defend: 8,
            escape: 8,
            deposit_items: 7,
            craft_tools: 6,
            execute_goal: 5,
            anti_idle: 1,
            wander: 0,
        }
    }
}

/// The survival, task and idle groups, in source order.
pub fn default_rules(t: RuleThresholds, p: RulePriorities) -> Vec<Rule> {
    vec![
        // survival
        Rule::new("low_health", RuleGroup::Survival, ActionId::Retreat, p.retreat, move |s, _| {
            Ok(s.health < t.low_health)
        }),
        Rule::new("low_hunger", RuleGroup::Survival, ActionId::FindFood, p.find_food, move |s, _| {
            Ok(s.hunger < t.low_hunger)
        }),
        Rule::new("hostile_close", RuleGroup::Survival, ActionId::Defend, p.defend, move |s, a| {
            if a.mode() != AgentMode::Advanced {
                return Ok(false);
            }
            Ok(threat::nearest_threat(s).is_some_and(|n| n.distance <= t.defend_radius))
        }),
        Rule::new("unsafe_footing", RuleGroup::Survival, ActionId::Escape, p.escape, move |s, _| {
            Ok(s.hazards.iter().any(|h| {
                h.kind == HazardKind::Void
                    || (h.kind.is_burning() && h.distance <= t.hazard_adjacency)
            }))
        }),
        // task continuation
        Rule::new("inventory_full", RuleGroup::Task, ActionId::DepositItems, p.deposit_items, |s, _| {
            Ok(s.inventory.is_full())
        }),
        Rule::new("missing_tool", RuleGroup::Task, ActionId::CraftTools, p.craft_tools, |s, a| {
            Ok(a.goal()
                .and_then(|g| g.required_tool)
                .is_some_and(|tool| !s.inventory.has_tool(tool)))
        }),
        Rule::new("active_goal", RuleGroup::Task, ActionId::ExecuteGoal, p.execute_goal, |_, a| {
            Ok(a.goal().is_some())
        }),
        // idle
        Rule::new("afk_mode", RuleGroup::Idle, ActionId::AntiIdle, p.anti_idle, |_, a| {
            Ok(a.mode() == AgentMode::Afk)
        }),
        Rule::new("fallback", RuleGroup::Idle, ActionId::Wander, p.wander, |_, _| Ok(true)),
    ]
}
