use agent_core::{derive_seed, DeterministicRng, EntityId, Position, SplitMix64, TaskKind};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{TaskContext, TaskHandler};
use crate::error::TaskError;

#[derive(Debug, Deserialize)]
struct GotoParams {
    x: f64,
    y: f64,
    z: f64,
    #[serde(default)]
    tolerance: Option<f64>,
}

pub struct GotoHandler;

#[async_trait]
impl TaskHandler for GotoHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Goto
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: GotoParams = ctx.params()?;
        let target = Position::new(p.x, p.y, p.z);
        let tolerance = p.tolerance.unwrap_or(ctx.settings.move_tolerance);
        ctx.world.move_near(target, tolerance).await?;

        let position = ctx.world.status().await?.position;
        Ok(json!({ "position": position }))
    }
}

#[derive(Debug, Deserialize)]
struct FollowParams {
    entity: u64,
    #[serde(default)]
    distance: Option<f64>,
}

pub struct FollowHandler;

#[async_trait]
impl TaskHandler for FollowHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Follow
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: FollowParams = ctx.params()?;
        let distance = p.distance.unwrap_or(ctx.settings.follow_distance);
        ctx.world.follow(EntityId(p.entity), distance).await?;
        Ok(json!({ "entity": p.entity, "distance": distance }))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExploreParams {
    #[serde(default)]
    target: Option<Position>,
    #[serde(default)]
    radius: Option<f64>,
}

/// Walks to a target, or to a random point around the agent when none is given.
pub struct ExploreHandler;

#[async_trait]
impl TaskHandler for ExploreHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Explore
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: ExploreParams = ctx.params()?;
        let target = match p.target {
            Some(target) => target,
            None => {
                let here = ctx.world.status().await?.position;
                let radius = p.radius.unwrap_or(ctx.settings.explore_radius);
                let mut rng = SplitMix64::new(derive_seed(0, ctx.task_id.0, TaskKind::Explore as u64));
                here.offset(
                    rng.next_range(-radius, radius),
                    0.0,
                    rng.next_range(-radius, radius),
                )
            }
        };

        ctx.world.move_to(target).await?;
        Ok(json!({ "target": target }))
    }
}

#[derive(Debug, Deserialize)]
struct PatrolParams {
    points: Vec<Position>,
    #[serde(default = "default_loops")]
    loops: u32,
}

fn default_loops() -> u32 {
    1
}

/// Visits each point in order, `loops` times.
pub struct PatrolHandler;

#[async_trait]
impl TaskHandler for PatrolHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Patrol
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: PatrolParams = ctx.params()?;
        if p.points.is_empty() {
            return Err(TaskError::InvalidParams {
                kind: TaskKind::Patrol,
                reason: "no patrol points".to_string(),
            });
        }

        let mut visited = 0u32;
        for _ in 0..p.loops.max(1) {
            for point in &p.points {
                ctx.world.move_near(*point, ctx.settings.move_tolerance).await?;
                visited += 1;
            }
        }
        Ok(json!({ "visited": visited }))
    }
}
