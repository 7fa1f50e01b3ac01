//! Warden configuration loading and validation.

use std::path::Path;
use std::time::Duration;

use agent_core::{DecisionConfig, ThreatTable, MAX_HEALTH};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main configuration, loaded from .warden/config.yaml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Config version
    pub version: Option<String>,

    /// Tick periods
    pub ticks: TickConfig,

    /// Snapshot sampling
    pub perception: PerceptionConfig,

    /// Rule thresholds, priorities and engine tuning
    pub decision: DecisionConfig,

    /// Task queue limits
    pub scheduler: SchedulerConfig,

    /// Immediate action execution
    pub overrides: OverrideConfig,

    /// Built-in handler tuning
    pub handlers: HandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Period in basic and afk modes
    pub normal_period_ms: u64,

    /// Period while in advanced mode or in combat
    pub alert_period_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            normal_period_ms: 4_000,
            alert_period_ms: 2_000,
        }
    }
}

impl TickConfig {
    pub fn normal_period(&self) -> Duration {
        Duration::from_millis(self.normal_period_ms)
    }

    pub fn alert_period(&self) -> Duration {
        Duration::from_millis(self.alert_period_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Upper bound on one full sample; past it the previous snapshot is reused
    pub sample_timeout_ms: u64,

    /// Hazard scan half-width around the agent's block
    pub hazard_horizontal: i32,

    /// Hazard scan half-height around the agent's block
    pub hazard_vertical: i32,

    /// Cap on hazard blocks kept from the scan box, nearest first
    pub max_hazards: usize,

    pub resource_radius: f64,

    /// Only the nearest N resource blocks are kept
    pub resource_limit: usize,

    pub resource_kinds: Vec<String>,

    /// Hostile kinds and danger table
    pub threats: ThreatTable,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            sample_timeout_ms: 1_500,
            hazard_horizontal: 8,
            hazard_vertical: 3,
            max_hazards: 64,
            resource_radius: 32.0,
            resource_limit: 20,
            resource_kinds: [
                "coal_ore",
                "iron_ore",
                "copper_ore",
                "gold_ore",
                "diamond_ore",
                "oak_log",
                "birch_log",
                "spruce_log",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            threats: ThreatTable::default(),
        }
    }
}

impl PerceptionConfig {
    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Submissions beyond this many queued tasks are rejected
    pub max_queue: usize,

    /// Finished tasks kept for status and history queries
    pub history_capacity: usize,

    /// Finished tasks included in a status report
    pub recent_window: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue: 100,
            history_capacity: 100,
            recent_window: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideConfig {
    /// Cancel the executing task before an immediate action touches the world
    pub preempt_running_task: bool,

    /// How long an immediate action waits for the execution slot to clear
    pub preempt_grace_ms: u64,

    /// Upper bound on one immediate action
    pub override_timeout_ms: u64,

    /// Eat after a retreat when food is carried
    pub eat_after_retreat: bool,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            preempt_running_task: true,
            preempt_grace_ms: 500,
            override_timeout_ms: 10_000,
            eat_after_retreat: true,
        }
    }
}

impl OverrideConfig {
    pub fn preempt_grace(&self) -> Duration {
        Duration::from_millis(self.preempt_grace_ms)
    }

    pub fn override_timeout(&self) -> Duration {
        Duration::from_millis(self.override_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// How far handlers look for blocks, containers and crafting tables
    pub search_radius: f64,

    /// Distance from which the agent can dig, place and strike
    pub reach: f64,

    pub move_tolerance: f64,
    pub follow_distance: f64,

    /// Radius of random exploration when no target is given
    pub explore_radius: f64,

    /// Strikes before a defend task gives up on its target
    pub strike_budget: u32,
    pub strike_interval_ms: u64,

    /// Block kinds that accept deposits
    pub containers: Vec<String>,

    /// Hostile table used when a handler picks its own target. Filled from
    /// `perception.threats` by [`WardenConfig::handler_settings`].
    #[serde(skip)]
    pub threats: ThreatTable,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            search_radius: 64.0,
            reach: 4.0,
            move_tolerance: 1.0,
            follow_distance: 2.0,
            explore_radius: 16.0,
            strike_budget: 10,
            strike_interval_ms: 500,
            containers: vec!["chest".to_string(), "barrel".to_string()],
            threats: ThreatTable::default(),
        }
    }
}

impl HandlerConfig {
    pub fn strike_interval(&self) -> Duration {
        Duration::from_millis(self.strike_interval_ms)
    }
}

impl WardenConfig {
    /// Handler settings carrying the configured threat table.
    pub fn handler_settings(&self) -> HandlerConfig {
        HandlerConfig {
            threats: self.perception.threats.clone(),
            ..self.handlers.clone()
        }
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Load from project root (looks for .warden/config.yaml)
    pub fn load_from_project(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".warden/config.yaml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.ticks.normal_period_ms == 0 {
            return Err(ConfigError::new("ticks.normal_period_ms", "must be positive"));
        }
        if self.ticks.alert_period_ms == 0 {
            return Err(ConfigError::new("ticks.alert_period_ms", "must be positive"));
        }
        if self.ticks.alert_period_ms > self.ticks.normal_period_ms {
            return Err(ConfigError::new(
                "ticks.alert_period_ms",
                "must not exceed ticks.normal_period_ms",
            ));
        }
        if self.perception.sample_timeout_ms == 0 {
            return Err(ConfigError::new("perception.sample_timeout_ms", "must be positive"));
        }
        if self.perception.threats.scan_radius <= 0.0 {
            return Err(ConfigError::new("perception.threats.scan_radius", "must be positive"));
        }
        if self.perception.hazard_horizontal < 0 || self.perception.hazard_vertical < 0 {
            return Err(ConfigError::new("perception.hazard_*", "must not be negative"));
        }
        if self.decision.history_capacity == 0 {
            return Err(ConfigError::new("decision.history_capacity", "must be positive"));
        }
        let low_health = self.decision.thresholds.low_health;
        if !(0.0..=MAX_HEALTH).contains(&low_health) {
            return Err(ConfigError::new(
                "decision.thresholds.low_health",
                format!("{low_health} is outside [0, {MAX_HEALTH}]"),
            ));
        }
        if self.decision.wander_radius <= 0.0 || self.decision.retreat_distance <= 0.0 {
            return Err(ConfigError::new(
                "decision.wander_radius/retreat_distance",
                "must be positive",
            ));
        }
        if self.scheduler.max_queue == 0 {
            return Err(ConfigError::new("scheduler.max_queue", "must be positive"));
        }
        if self.scheduler.history_capacity == 0 {
            return Err(ConfigError::new("scheduler.history_capacity", "must be positive"));
        }
        if self.handlers.reach <= 0.0 {
            return Err(ConfigError::new("handlers.reach", "must be positive"));
        }
        Ok(())
    }
}
