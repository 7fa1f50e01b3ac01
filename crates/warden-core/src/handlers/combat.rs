use agent_core::{EntityId, TaskKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{TaskContext, TaskHandler};
use crate::config::HandlerConfig;
use crate::error::{TaskError, WorldError};
use crate::world::{EntityQuery, EquipSlot, WorldSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub target: EntityId,
    pub strikes: u32,
    pub defeated: bool,
}

/// Equip the best weapon, then close in and strike until the target is gone or
/// the strike budget is spent.
///
/// Shared by the defend handler and the immediate Defend override.
pub async fn engage(
    world: &dyn WorldSurface,
    target: EntityId,
    settings: &HandlerConfig,
) -> Result<Engagement, WorldError> {
    let status = world.status().await?;
    if let Some(weapon) = status.inventory.best_weapon() {
        world.equip(weapon, EquipSlot::Hand).await?;
    }

    let query = EntityQuery::by_id(target);
    let mut strikes = 0u32;
    while strikes < settings.strike_budget {
        let Some(entity) = world.find_entities(&query).await?.into_iter().next() else {
            return Ok(Engagement {
                target,
                strikes,
                defeated: true,
            });
        };

        world
            .move_near(entity.position, (settings.reach - 1.0).max(1.0))
            .await?;
        world.attack(target).await?;
        strikes += 1;
        tokio::time::sleep(settings.strike_interval()).await;
    }

    let defeated = world.find_entities(&query).await?.is_empty();
    Ok(Engagement {
        target,
        strikes,
        defeated,
    })
}

#[derive(Debug, Default, Deserialize)]
struct DefendParams {
    #[serde(default)]
    entity: Option<u64>,
    /// Used to pick a target when `entity` is absent.
    #[serde(default)]
    radius: Option<f64>,
}

pub struct DefendHandler;

#[async_trait]
impl TaskHandler for DefendHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Defend
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: DefendParams = ctx.params()?;
        let target = match p.entity {
            Some(id) => EntityId(id),
            None => {
                let status = ctx.world.status().await?;
                let radius = p.radius.unwrap_or(ctx.settings.search_radius);
                let nearby = ctx.world.find_entities(&EntityQuery::within(radius)).await?;
                ctx.settings
                    .threats
                    .classify(&status.position, &nearby)
                    .first()
                    .map(|t| t.entity_id)
                    .ok_or_else(|| TaskError::ResourceExhausted("no hostile in range".into()))?
            }
        };

        let engagement = engage(ctx.world.as_ref(), target, &ctx.settings).await?;
        if !engagement.defeated {
            return Err(TaskError::Failed(format!(
                "{target} still standing after {} strikes",
                engagement.strikes
            )));
        }
        Ok(json!(engagement))
    }
}
