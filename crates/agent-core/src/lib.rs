//! Deterministic perception, threat and decision primitives for the warden agent.
//!
//! Nothing in this crate performs I/O or spawns tasks; the async kernel lives in
//! `warden-core` and drives these types once per tick.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod engine;
pub mod geometry;
pub mod history;
pub mod inventory;
pub mod rng;
pub mod rule;
pub mod snapshot;
pub mod state;
pub mod task;
pub mod threat;

pub use engine::{Decision, DecisionConfig, DecisionEngine, DecisionSummary};
pub use geometry::{BlockPos, Position};
pub use history::History;
pub use inventory::{Inventory, ToolClass, DEFAULT_SLOT_CAPACITY};
pub use rng::{derive_seed, DeterministicRng, SplitMix64};
pub use rule::{default_rules, ActionId, Rule, RuleError, RuleGroup, RulePriorities, RuleThresholds};
pub use snapshot::{
    EntityId, Hazard, HazardKind, ResourceSighting, ThreatEntry, WorldSnapshot, MAX_HEALTH,
    MAX_HUNGER,
};
pub use state::{AgentMode, AgentState, Goal, OutcomeStats};
pub use task::{Task, TaskId, TaskKind, TaskOrigin, TaskStatus, TransitionError, UnknownTaskKind};
pub use threat::{EntityObservation, ThreatTable};
