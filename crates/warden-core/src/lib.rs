//! Warden Core - async control kernel for a game-world agent
//!
//! This crate wires the deterministic decision engine from `agent-core` to a
//! live world: it samples perception snapshots, routes decisions either into
//! immediate overrides or onto a single-flight task scheduler, and runs the
//! task handlers against the [`WorldSurface`] capability trait.

pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod kernel;
pub mod perception;
pub mod sim;
pub mod world;

pub use config::WardenConfig;
pub use controller::{AgentStatus, Controller, ControllerHandle, TickReport};
pub use error::{ConfigError, TaskError, WorldError};
pub use kernel::{HandlerRegistry, OverrideController, OverrideOutcome, Route, Scheduler};
pub use perception::PerceptionBuilder;
pub use sim::{Scenario, ScriptedWorld};
pub use world::WorldSurface;
