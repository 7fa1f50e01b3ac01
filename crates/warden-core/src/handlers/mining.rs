use agent_core::{TaskKind, ToolClass};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{TaskContext, TaskHandler};
use crate::error::{TaskError, WorldError};
use crate::world::{BlockInfo, BlockQuery, EquipSlot, WorldSurface};

fn default_count() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct MineParams {
    block: String,
    #[serde(default = "default_count")]
    count: u32,
    #[serde(default)]
    radius: Option<f64>,
}

/// Finds, walks to and digs blocks of one material until `count` are mined.
pub struct MineHandler;

#[async_trait]
impl TaskHandler for MineHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Mine
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: MineParams = ctx.params()?;
        let radius = p.radius.unwrap_or(ctx.settings.search_radius);
        let query = BlockQuery::any_of([p.block.as_str()]);

        equip_tool(ctx, ToolClass::Pickaxe).await?;

        let mut mined = 0u32;
        while mined < p.count {
            let Some(block) = nearest(ctx, &query, radius).await? else {
                break;
            };
            dig_block(ctx, &block).await?;
            mined += 1;
            tracing::debug!(task_id = %ctx.task_id, block = %p.block, mined, "Block mined");
        }

        if mined == 0 {
            return Err(TaskError::ResourceExhausted(format!(
                "no {} within {radius} blocks",
                p.block
            )));
        }
        Ok(json!({ "block": p.block, "mined": mined, "requested": p.count }))
    }
}

#[derive(Debug, Deserialize)]
struct GatherParams {
    #[serde(default)]
    kinds: Vec<String>,
    #[serde(default = "default_count")]
    count: u32,
    /// Eat once something edible is carried.
    #[serde(default)]
    consume: bool,
}

/// Harvests any of several materials; with `consume` it doubles as the
/// find-food behavior and eats carried food before searching.
pub struct GatherHandler;

#[async_trait]
impl TaskHandler for GatherHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Gather
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: GatherParams = ctx.params()?;

        if p.consume {
            if let Some(food) = eat_carried(ctx.world.as_ref()).await? {
                return Ok(json!({ "gathered": 0, "consumed": food }));
            }
        }
        if p.kinds.is_empty() {
            return Err(TaskError::InvalidParams {
                kind: TaskKind::Gather,
                reason: "no kinds to gather".to_string(),
            });
        }

        let query = BlockQuery::any_of(p.kinds.iter().cloned());
        let mut gathered = 0u32;
        while gathered < p.count {
            let Some(block) = nearest(ctx, &query, ctx.settings.search_radius).await? else {
                break;
            };
            dig_block(ctx, &block).await?;
            gathered += 1;
        }
        if gathered == 0 {
            return Err(TaskError::ResourceExhausted(format!(
                "none of [{}] within {} blocks",
                p.kinds.join(", "),
                ctx.settings.search_radius
            )));
        }

        let consumed = if p.consume { eat_carried(ctx.world.as_ref()).await? } else { None };
        Ok(json!({ "gathered": gathered, "consumed": consumed }))
    }
}

async fn nearest(
    ctx: &TaskContext,
    query: &BlockQuery,
    radius: f64,
) -> Result<Option<BlockInfo>, TaskError> {
    Ok(ctx.world.find_blocks(query, radius, 1).await?.into_iter().next())
}

async fn dig_block(ctx: &TaskContext, block: &BlockInfo) -> Result<(), TaskError> {
    let reach = (ctx.settings.reach - 1.0).max(ctx.settings.move_tolerance);
    ctx.world.move_near(block.position.center(), reach).await?;
    ctx.world.dig(block.position).await?;
    Ok(())
}

/// Hold the best tool of a class, if any is carried.
async fn equip_tool(ctx: &TaskContext, class: ToolClass) -> Result<(), TaskError> {
    let status = ctx.world.status().await?;
    if let Some(tool) = status.inventory.best_tool(class) {
        ctx.world.equip(tool, EquipSlot::Hand).await?;
    }
    Ok(())
}

/// Eat the first carried food; `None` when nothing edible is carried.
pub(crate) async fn eat_carried(world: &dyn WorldSurface) -> Result<Option<String>, WorldError> {
    let status = world.status().await?;
    let Some(food) = status.inventory.first_food().map(str::to_string) else {
        return Ok(None);
    };
    match world.equip(&food, EquipSlot::Hand).await {
        Ok(()) => {}
        Err(WorldError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    }
    world.consume().await?;
    Ok(Some(food))
}
