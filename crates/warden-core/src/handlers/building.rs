use agent_core::inventory::is_food;
use agent_core::{BlockPos, TaskKind, ToolClass};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{TaskContext, TaskHandler};
use crate::error::TaskError;
use crate::world::{BlockQuery, EquipSlot, Face};

#[derive(Debug, Deserialize)]
struct BuildParams {
    item: String,
    blocks: Vec<BlockPos>,
}

/// Places `item` at each listed cell, resting each block on the one below.
pub struct BuildHandler;

#[async_trait]
impl TaskHandler for BuildHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Build
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: BuildParams = ctx.params()?;
        let mut placed = 0u32;
        let mut skipped = 0u32;

        for cell in &p.blocks {
            if ctx.world.block_at(*cell).await?.is_some() {
                skipped += 1;
                continue;
            }
            let carried = ctx.world.status().await?.inventory.count(&p.item);
            if carried == 0 {
                return Err(TaskError::ResourceExhausted(format!(
                    "out of {} after placing {placed}",
                    p.item
                )));
            }

            ctx.world
                .move_near(cell.center(), ctx.settings.reach - 1.0)
                .await?;
            ctx.world.equip(&p.item, EquipSlot::Hand).await?;
            ctx.world.place(cell.below(), Face::Up).await?;
            placed += 1;
        }

        Ok(json!({ "item": p.item, "placed": placed, "skipped": skipped }))
    }
}

#[derive(Debug, Deserialize)]
struct CraftParams {
    item: String,
    #[serde(default = "default_craft_count")]
    count: u32,
}

fn default_craft_count() -> u32 {
    1
}

/// Crafts at the nearest crafting table, or from the inventory grid when none
/// is in range.
pub struct CraftHandler;

#[async_trait]
impl TaskHandler for CraftHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Craft
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: CraftParams = ctx.params()?;
        let table = ctx
            .world
            .find_blocks(
                &BlockQuery::any_of(["crafting_table"]),
                ctx.settings.search_radius,
                1,
            )
            .await?
            .into_iter()
            .next()
            .map(|b| b.position);

        if let Some(table) = table {
            ctx.world
                .move_near(table.center(), ctx.settings.reach - 1.0)
                .await?;
        }
        ctx.world.craft(&p.item, p.count, table).await?;

        Ok(json!({ "item": p.item, "count": p.count, "table": table }))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DepositParams {
    /// Items never stored, on top of tools, weapons and food.
    #[serde(default)]
    keep: Vec<String>,
}

const KEPT_TOOLS: [ToolClass; 5] = [
    ToolClass::Pickaxe,
    ToolClass::Axe,
    ToolClass::Shovel,
    ToolClass::Sword,
    ToolClass::Hoe,
];

/// Empties the inventory into the nearest container, keeping tools and food.
pub struct DepositHandler;

#[async_trait]
impl TaskHandler for DepositHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Deposit
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let p: DepositParams = ctx.params()?;
        let container = ctx
            .world
            .find_blocks(
                &BlockQuery::any_of(ctx.settings.containers.iter().cloned()),
                ctx.settings.search_radius,
                1,
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                TaskError::ResourceExhausted(format!(
                    "no container within {} blocks",
                    ctx.settings.search_radius
                ))
            })?;

        ctx.world
            .move_near(container.position.center(), ctx.settings.reach - 1.0)
            .await?;

        let inventory = ctx.world.status().await?.inventory;
        let mut stored = 0u32;
        for (item, count) in &inventory.items {
            let kept = is_food(item)
                || KEPT_TOOLS.iter().any(|class| class.matches(item))
                || p.keep.iter().any(|k| k == item);
            if kept || *count == 0 {
                continue;
            }
            stored += ctx.world.store(container.position, item, *count).await?;
        }

        tracing::debug!(task_id = %ctx.task_id, stored, container = ?container.position, "Items deposited");
        Ok(json!({ "stored": stored, "container": container.position }))
    }
}
