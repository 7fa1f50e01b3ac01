//! Priority rule evaluation: one decision per tick.

use std::cmp::Reverse;
use std::f64::consts::TAU;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Position;
use crate::history::History;
use crate::rng::{DeterministicRng, SplitMix64};
use crate::rule::{default_rules, ActionId, Rule, RulePriorities, RuleThresholds};
use crate::snapshot::{ThreatEntry, WorldSnapshot};
use crate::state::{AgentMode, AgentState, Goal};
use crate::task::Task;
use crate::threat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub thresholds: RuleThresholds,
    pub priorities: RulePriorities,
    pub history_capacity: usize,
    pub seed: u64,
    pub initial_mode: AgentMode,
    pub wander_radius: f64,
    pub anti_idle_radius: f64,
    pub retreat_distance: f64,
    pub escape_distance: f64,
    /// Consecutive goal-task failures before the goal is dropped.
    pub max_goal_failures: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            thresholds: RuleThresholds::default(),
            priorities: RulePriorities::default(),
            history_capacity: 10,
            seed: 0x5EED,
            initial_mode: AgentMode::Basic,
            wander_radius: 16.0,
            anti_idle_radius: 2.0,
            retreat_distance: 20.0,
            escape_distance: 4.0,
            max_goal_failures: 3,
        }
    }
}

/// One tick's outcome. Never mutated after it is emitted.
#[derive(Debug, Clone)]
pub struct Decision {
    pub tick: u64,
    pub action: ActionId,
    /// Matched rule; `None` for the built-in idle fallback.
    pub rule: Option<&'static str>,
    pub priority: Option<i32>,
    pub timestamp: DateTime<Utc>,
    pub snapshot: Arc<WorldSnapshot>,
    /// Where to go for movement actions.
    pub target: Option<Position>,
    /// Threat to engage for Defend.
    pub focus: Option<ThreatEntry>,
}

impl Decision {
    pub fn summary(&self) -> DecisionSummary {
        DecisionSummary {
            tick: self.tick,
            action: self.action,
            rule: self.rule.map(str::to_string),
            priority: self.priority,
            timestamp: self.timestamp,
            snapshot_tick: self.snapshot.tick,
            stale: self.snapshot.stale,
            target: self.target,
        }
    }
}

/// Serializable view of a decision for status and history queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub tick: u64,
    pub action: ActionId,
    pub rule: Option<String>,
    pub priority: Option<i32>,
    pub timestamp: DateTime<Utc>,
    pub snapshot_tick: u64,
    pub stale: bool,
    pub target: Option<Position>,
}

pub struct DecisionEngine {
    rules: Vec<Rule>,
    state: AgentState,
    history: History<Decision>,
    rng: Box<dyn DeterministicRng + Send>,
    config: DecisionConfig,
    ticks: u64,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        let rng = Box::new(SplitMix64::new(config.seed));
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: DecisionConfig, rng: Box<dyn DeterministicRng + Send>) -> Self {
        let rules = default_rules(config.thresholds, config.priorities);
        let mut engine = Self {
            rules: Vec::new(),
            state: AgentState::new(config.initial_mode),
            history: History::new(config.history_capacity),
            rng,
            config,
            ticks: 0,
        };
        engine.set_rules(rules);
        engine
    }

    /// Replace the catalog. Rules are kept in evaluation order: descending
    /// priority, then group, then the order given here.
    pub fn set_rules(&mut self, mut rules: Vec<Rule>) {
        rules.sort_by_key(|r| (Reverse(r.priority), r.group));
        self.rules = rules;
    }

    pub fn add_rule(&mut self, rule: Rule) {
        let rules = std::mem::take(&mut self.rules);
        let mut rules: Vec<Rule> = rules.into_iter().chain(std::iter::once(rule)).collect();
        rules.sort_by_key(|r| (Reverse(r.priority), r.group));
        self.rules = rules;
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn history(&self) -> &History<Decision> {
        &self.history
    }

    pub fn last_decision(&self) -> Option<&Decision> {
        self.history.latest()
    }

    pub fn decide(&mut self, snapshot: Arc<WorldSnapshot>) -> Decision {
        self.ticks += 1;

        let matched = self.select(&snapshot).map(|r| (r.action, r.name, r.priority));
        let (action, rule, priority) = match matched {
            Some((action, name, priority)) => (action, Some(name), Some(priority)),
            None => {
                tracing::warn!(tick = self.ticks, "no rule matched; idling");
                (ActionId::Idle, None, None)
            }
        };

        let (target, focus) = self.resolve_target(action, &snapshot);
        let decision = Decision {
            tick: self.ticks,
            action,
            rule,
            priority,
            timestamp: Utc::now(),
            snapshot,
            target,
            focus,
        };

        tracing::debug!(
            tick = decision.tick,
            action = %decision.action,
            rule = decision.rule.unwrap_or("none"),
            stale = decision.snapshot.stale,
            "Decision made"
        );

        self.history.push(decision.clone());
        decision
    }

    fn select(&self, snapshot: &WorldSnapshot) -> Option<&Rule> {
        for rule in &self.rules {
            match rule.evaluate(snapshot, &self.state) {
                Ok(true) => return Some(rule),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(rule = rule.name, error = %e, "Rule condition failed, skipping");
                }
            }
        }
        None
    }

    fn resolve_target(
        &mut self,
        action: ActionId,
        snapshot: &WorldSnapshot,
    ) -> (Option<Position>, Option<ThreatEntry>) {
        let here = snapshot.position;
        match action {
            ActionId::Retreat => {
                let angle = self.random_angle();
                let target = match threat::nearest_threat(snapshot) {
                    Some(t) => threat::flee_point(&here, &t.position, self.config.retreat_distance, angle),
                    None => threat::flee_point(&here, &here, self.config.retreat_distance, angle),
                };
                (Some(target), None)
            }
            ActionId::Escape => {
                let angle = self.random_angle();
                let danger = threat::nearest_hazard(snapshot)
                    .map(|h| h.position.center())
                    .unwrap_or(here);
                let target = threat::flee_point(&here, &danger, self.config.escape_distance, angle);
                (Some(target), None)
            }
            ActionId::Defend => {
                let focus = threat::nearest_threat(snapshot).cloned();
                (focus.as_ref().map(|t| t.position), focus)
            }
            ActionId::Wander => (Some(self.jitter(&here, self.config.wander_radius)), None),
            ActionId::AntiIdle => (Some(self.jitter(&here, self.config.anti_idle_radius)), None),
            _ => (None, None),
        }
    }

    fn random_angle(&mut self) -> f64 {
        self.rng.next_f64_unit() * TAU
    }

    fn jitter(&mut self, here: &Position, radius: f64) -> Position {
        let dx = (self.rng.next_f64_unit() * 2.0 - 1.0) * radius;
        let dz = (self.rng.next_f64_unit() * 2.0 - 1.0) * radius;
        here.offset(dx, 0.0, dz)
    }

    pub fn set_mode(&mut self, mode: AgentMode) {
        if self.state.mode() != mode {
            tracing::info!(from = %self.state.mode(), to = %mode, "Agent mode changed");
        }
        self.state.set_mode(mode);
    }

    pub fn set_goal(&mut self, goal: Goal) {
        tracing::info!(goal = %goal.description, kind = %goal.kind, "Goal set");
        self.state.set_goal(Some(goal));
    }

    pub fn clear_goal(&mut self) {
        self.state.set_goal(None);
    }

    pub fn set_combat(&mut self, in_combat: bool) {
        self.state.set_combat(in_combat);
    }

    /// Returns true when the outcome resolved the active goal.
    pub fn record_task_outcome(&mut self, task: &Task) -> bool {
        let description = self.state.goal().map(|g| g.description.clone());
        let resolved = self
            .state
            .record_outcome(task, self.config.max_goal_failures);
        if resolved {
            tracing::info!(
                goal = description.as_deref().unwrap_or(""),
                task_id = %task.id,
                status = ?task.status,
                "Goal resolved"
            );
        }
        resolved
    }
}
