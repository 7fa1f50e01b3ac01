//! Scripted in-memory world.
//!
//! Backs the CLI demo and the test suites: a YAML scenario seeds the agent,
//! blocks and entities, every capability call is recorded, and failures can be
//! injected per operation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agent_core::inventory::is_food;
use agent_core::{
    AgentMode, BlockPos, EntityId, EntityObservation, Goal, Inventory, Position, TaskKind,
    DEFAULT_SLOT_CAPACITY, MAX_HEALTH, MAX_HUNGER,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::world::{
    is_passable, BlockInfo, BlockQuery, EntityQuery, EquipSlot, Face, SelfStatus, WorldSurface,
};

const STACK_SIZE: u32 = 64;
const DIG_REACH: f64 = 6.0;
const ATTACK_REACH: f64 = 4.5;

/// (output, yield, needs table, ingredients)
const RECIPES: &[(&str, u32, bool, &[(&str, u32)])] = &[
    ("oak_planks", 4, false, &[("oak_log", 1)]),
    ("stick", 4, false, &[("oak_planks", 2)]),
    ("crafting_table", 1, false, &[("oak_planks", 4)]),
    ("wooden_pickaxe", 1, true, &[("oak_planks", 3), ("stick", 2)]),
    ("wooden_axe", 1, true, &[("oak_planks", 3), ("stick", 2)]),
    ("wooden_shovel", 1, true, &[("oak_planks", 1), ("stick", 2)]),
    ("wooden_sword", 1, true, &[("oak_planks", 2), ("stick", 1)]),
    ("wooden_hoe", 1, true, &[("oak_planks", 2), ("stick", 2)]),
    ("stone_pickaxe", 1, true, &[("cobblestone", 3), ("stick", 2)]),
    ("stone_sword", 1, true, &[("cobblestone", 2), ("stick", 1)]),
    ("bread", 1, true, &[("wheat", 3)]),
];

fn drop_for(material: &str) -> &str {
    match material {
        "stone" => "cobblestone",
        "grass_block" => "dirt",
        "coal_ore" => "coal",
        "iron_ore" => "raw_iron",
        "copper_ore" => "raw_copper",
        "gold_ore" => "raw_gold",
        "diamond_ore" => "diamond",
        "melon" => "melon_slice",
        "sweet_berry_bush" => "sweet_berries",
        "carrots" => "carrot",
        "potatoes" => "potato",
        other => other,
    }
}

fn weapon_damage(held: Option<&str>) -> f32 {
    match held {
        Some(item) if item.ends_with("_sword") => 6.0,
        Some(item) if item.ends_with("_axe") => 5.0,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Unavailable,
    Unreachable,
    NotFound,
    Rejected,
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSpec {
    pub kind: FailureKind,
    /// Fail this many calls, then recover; `None` fails forever.
    #[serde(default)]
    pub times: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSetup {
    pub health: f32,
    pub hunger: f32,
    pub position: Position,
    pub inventory: BTreeMap<String, u32>,
    pub slot_capacity: u32,
}

impl Default for AgentSetup {
    fn default() -> Self {
        Self {
            health: MAX_HEALTH,
            hunger: MAX_HUNGER,
            position: Position::new(0.5, 64.0, 0.5),
            inventory: BTreeMap::new(),
            slot_capacity: DEFAULT_SLOT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySetup {
    pub id: u64,
    pub kind: String,
    pub position: Position,
    #[serde(default = "default_entity_health")]
    pub health: f32,
}

fn default_entity_health() -> f32 {
    20.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSetup {
    pub kind: TaskKind,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
}

/// A scripted world plus the commands issued to the agent at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    pub agent: AgentSetup,
    /// Every cell at or below this height is solid stone.
    pub floor: Option<i32>,
    pub blocks: Vec<BlockInfo>,
    pub entities: Vec<EntitySetup>,
    pub latency_ms: u64,
    /// Keyed by operation name, e.g. `status` or `dig`.
    pub failures: BTreeMap<String, FailureSpec>,
    pub mode: Option<AgentMode>,
    pub goal: Option<Goal>,
    pub tasks: Vec<TaskSetup>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "flat".to_string(),
            agent: AgentSetup::default(),
            floor: Some(63),
            blocks: Vec::new(),
            entities: Vec::new(),
            latency_ms: 0,
            failures: BTreeMap::new(),
            mode: None,
            goal: None,
            tasks: Vec::new(),
        }
    }
}

impl Scenario {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse scenario")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario from {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid scenario {}", path.display()))
    }
}

/// One recorded capability call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldCall {
    pub op: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone)]
struct SimEntity {
    kind: String,
    position: Position,
    health: f32,
}

#[derive(Debug)]
struct SimState {
    health: f32,
    hunger: f32,
    position: Position,
    items: BTreeMap<String, u32>,
    slot_capacity: u32,
    held: Option<String>,
    floor: Option<i32>,
    blocks: BTreeMap<BlockPos, String>,
    entities: BTreeMap<EntityId, SimEntity>,
    containers: BTreeMap<BlockPos, BTreeMap<String, u32>>,
    failures: BTreeMap<String, FailureSpec>,
    latency: Duration,
    calls: Vec<WorldCall>,
}

impl SimState {
    fn inventory(&self) -> Inventory {
        let items: BTreeMap<String, u32> = self
            .items
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let used_slots = items.values().map(|c| c.div_ceil(STACK_SIZE)).sum();
        Inventory {
            items,
            used_slots,
            slot_capacity: self.slot_capacity,
        }
    }

    fn material(&self, pos: BlockPos) -> Option<String> {
        match self.blocks.get(&pos) {
            Some(material) if is_passable(material) => None,
            Some(material) => Some(material.clone()),
            None if self.floor.is_some_and(|f| pos.y <= f) => Some("stone".to_string()),
            None => None,
        }
    }

    fn take_item(&mut self, item: &str, count: u32) -> u32 {
        let Some(have) = self.items.get_mut(item) else {
            return 0;
        };
        let taken = count.min(*have);
        *have -= taken;
        if *have == 0 {
            self.items.remove(item);
            if self.held.as_deref() == Some(item) {
                self.held = None;
            }
        }
        taken
    }

    fn give_item(&mut self, item: &str, count: u32) {
        *self.items.entry(item.to_string()).or_insert(0) += count;
    }

    fn take_failure(&mut self, op: &str) -> Option<FailureKind> {
        let spec = self.failures.get_mut(op)?;
        match spec.times {
            None => Some(spec.kind),
            Some(0) => {
                self.failures.remove(op);
                None
            }
            Some(n) => {
                let kind = spec.kind;
                spec.times = Some(n - 1);
                if n == 1 {
                    self.failures.remove(op);
                }
                Some(kind)
            }
        }
    }
}

pub struct ScriptedWorld {
    state: Mutex<SimState>,
}

impl Default for ScriptedWorld {
    fn default() -> Self {
        Self::from_scenario(&Scenario::default())
    }
}

impl ScriptedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scenario(scenario: &Scenario) -> Self {
        let entities = scenario
            .entities
            .iter()
            .map(|e| {
                (
                    EntityId(e.id),
                    SimEntity {
                        kind: e.kind.clone(),
                        position: e.position,
                        health: e.health,
                    },
                )
            })
            .collect();
        let blocks = scenario
            .blocks
            .iter()
            .map(|b| (b.position, b.material.clone()))
            .collect();

        Self {
            state: Mutex::new(SimState {
                health: scenario.agent.health,
                hunger: scenario.agent.hunger,
                position: scenario.agent.position,
                items: scenario.agent.inventory.clone(),
                slot_capacity: scenario.agent.slot_capacity,
                held: None,
                floor: scenario.floor,
                blocks,
                entities,
                containers: BTreeMap::new(),
                failures: scenario.failures.clone(),
                latency: Duration::from_millis(scenario.latency_ms),
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, apply injected failures and latency.
    async fn enter(&self, op: &'static str, detail: String) -> Result<(), WorldError> {
        let (failure, latency) = {
            let mut state = self.lock();
            state.calls.push(WorldCall { op, detail });
            (state.take_failure(op), state.latency)
        };

        match failure {
            Some(FailureKind::Hang) => return std::future::pending().await,
            Some(FailureKind::Timeout) => return Err(WorldError::Timeout(latency)),
            Some(FailureKind::Unavailable) => {
                return Err(WorldError::Unavailable(format!("{op} injected failure")))
            }
            Some(FailureKind::Unreachable) => {
                return Err(WorldError::Unreachable(format!("{op} injected failure")))
            }
            Some(FailureKind::NotFound) => {
                return Err(WorldError::NotFound(format!("{op} injected failure")))
            }
            Some(FailureKind::Rejected) => {
                return Err(WorldError::Rejected(format!("{op} injected failure")))
            }
            None => {}
        }

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn fail(&self, op: &str, kind: FailureKind, times: Option<u32>) {
        self.lock()
            .failures
            .insert(op.to_string(), FailureSpec { kind, times });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn set_health(&self, health: f32) {
        self.lock().health = health;
    }

    pub fn set_hunger(&self, hunger: f32) {
        self.lock().hunger = hunger;
    }

    pub fn set_position(&self, position: Position) {
        self.lock().position = position;
    }

    pub fn give(&self, item: &str, count: u32) {
        self.lock().give_item(item, count);
    }

    pub fn set_block(&self, position: BlockPos, material: &str) {
        self.lock().blocks.insert(position, material.to_string());
    }

    pub fn spawn(&self, id: u64, kind: &str, position: Position) {
        self.lock().entities.insert(
            EntityId(id),
            SimEntity {
                kind: kind.to_string(),
                position,
                health: default_entity_health(),
            },
        );
    }

    pub fn despawn(&self, id: u64) -> bool {
        self.lock().entities.remove(&EntityId(id)).is_some()
    }

    pub fn position(&self) -> Position {
        self.lock().position
    }

    pub fn hunger(&self) -> f32 {
        self.lock().hunger
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.lock().items.get(item).copied().unwrap_or(0)
    }

    pub fn block(&self, position: BlockPos) -> Option<String> {
        self.lock().material(position)
    }

    pub fn has_entity(&self, id: u64) -> bool {
        self.lock().entities.contains_key(&EntityId(id))
    }

    pub fn stored(&self, container: BlockPos) -> BTreeMap<String, u32> {
        self.lock()
            .containers
            .get(&container)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<WorldCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }
}

#[async_trait]
impl WorldSurface for ScriptedWorld {
    async fn status(&self) -> Result<SelfStatus, WorldError> {
        self.enter("status", String::new()).await?;
        let state = self.lock();
        Ok(SelfStatus {
            health: state.health,
            hunger: state.hunger,
            position: state.position,
            inventory: state.inventory(),
        })
    }

    async fn find_entities(&self, query: &EntityQuery) -> Result<Vec<EntityObservation>, WorldError> {
        self.enter("find_entities", format!("{query:?}")).await?;
        let state = self.lock();
        let origin = state.position;
        Ok(state
            .entities
            .iter()
            .map(|(id, e)| EntityObservation {
                id: *id,
                kind: e.kind.clone(),
                position: e.position,
            })
            .filter(|e| query.matches(&origin, e))
            .collect())
    }

    async fn find_blocks(
        &self,
        query: &BlockQuery,
        max_distance: f64,
        count: usize,
    ) -> Result<Vec<BlockInfo>, WorldError> {
        self.enter("find_blocks", query.materials.join(",")).await?;
        let state = self.lock();
        let origin = state.position;
        let mut found: Vec<(f64, BlockInfo)> = state
            .blocks
            .iter()
            .filter(|(_, material)| query.matches(material))
            .map(|(pos, material)| {
                (
                    origin.distance(&pos.center()),
                    BlockInfo {
                        position: *pos,
                        material: material.clone(),
                    },
                )
            })
            .filter(|(d, _)| *d <= max_distance)
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.position.cmp(&b.1.position)));
        Ok(found.into_iter().take(count).map(|(_, b)| b).collect())
    }

    async fn block_at(&self, position: BlockPos) -> Result<Option<String>, WorldError> {
        self.enter("block_at", format!("{position:?}")).await?;
        Ok(self.lock().material(position))
    }

    async fn move_near(&self, target: Position, tolerance: f64) -> Result<(), WorldError> {
        self.enter("move_near", format!("{target:?} ~{tolerance}")).await?;
        self.lock().position = target;
        Ok(())
    }

    async fn move_to(&self, target: Position) -> Result<(), WorldError> {
        self.enter("move_to", format!("{target:?}")).await?;
        self.lock().position = target;
        Ok(())
    }

    async fn follow(&self, entity: EntityId, distance: f64) -> Result<(), WorldError> {
        self.enter("follow", format!("{entity} at {distance}")).await?;
        let mut state = self.lock();
        let target = state
            .entities
            .get(&entity)
            .map(|e| e.position)
            .ok_or_else(|| WorldError::NotFound(entity.to_string()))?;
        state.position = target.offset(distance, 0.0, 0.0);
        Ok(())
    }

    async fn dig(&self, block: BlockPos) -> Result<(), WorldError> {
        self.enter("dig", format!("{block:?}")).await?;
        let mut state = self.lock();
        let material = state
            .material(block)
            .ok_or_else(|| WorldError::NotFound(format!("no block at {block:?}")))?;
        if state.position.distance(&block.center()) > DIG_REACH {
            return Err(WorldError::Unreachable(format!("{block:?} is out of reach")));
        }
        state.blocks.insert(block, "air".to_string());
        let drop = drop_for(&material).to_string();
        state.give_item(&drop, 1);
        Ok(())
    }

    async fn place(&self, reference: BlockPos, face: Face) -> Result<(), WorldError> {
        self.enter("place", format!("{reference:?} {face:?}")).await?;
        let mut state = self.lock();
        let item = state
            .held
            .clone()
            .ok_or_else(|| WorldError::Rejected("nothing held".into()))?;
        let target = face.adjacent(reference);
        if state.material(target).is_some() {
            return Err(WorldError::Rejected(format!("{target:?} is occupied")));
        }
        if state.take_item(&item, 1) == 0 {
            return Err(WorldError::NotFound(item));
        }
        state.blocks.insert(target, item);
        Ok(())
    }

    async fn equip(&self, item: &str, slot: EquipSlot) -> Result<(), WorldError> {
        self.enter("equip", format!("{item} in {slot}")).await?;
        let mut state = self.lock();
        if state.items.get(item).copied().unwrap_or(0) == 0 {
            return Err(WorldError::NotFound(item.to_string()));
        }
        state.held = Some(item.to_string());
        Ok(())
    }

    async fn attack(&self, entity: EntityId) -> Result<(), WorldError> {
        self.enter("attack", entity.to_string()).await?;
        let mut state = self.lock();
        let damage = weapon_damage(state.held.as_deref());
        let origin = state.position;
        let target = state
            .entities
            .get_mut(&entity)
            .ok_or_else(|| WorldError::NotFound(entity.to_string()))?;
        if origin.distance(&target.position) > ATTACK_REACH {
            return Err(WorldError::Unreachable(format!("{entity} is out of reach")));
        }
        target.health -= damage;
        if target.health <= 0.0 {
            state.entities.remove(&entity);
        }
        Ok(())
    }

    async fn consume(&self) -> Result<(), WorldError> {
        self.enter("consume", String::new()).await?;
        let mut state = self.lock();
        let item = state
            .held
            .clone()
            .filter(|item| is_food(item))
            .ok_or_else(|| WorldError::Rejected("not holding food".into()))?;
        if state.take_item(&item, 1) == 0 {
            return Err(WorldError::NotFound(item));
        }
        state.hunger = (state.hunger + 4.0).min(MAX_HUNGER);
        Ok(())
    }

    async fn craft(&self, item: &str, count: u32, table: Option<BlockPos>) -> Result<(), WorldError> {
        self.enter("craft", format!("{count}x {item}")).await?;
        let mut state = self.lock();
        let (_, output, needs_table, ingredients) = RECIPES
            .iter()
            .find(|(name, ..)| *name == item)
            .ok_or_else(|| WorldError::Rejected(format!("no recipe for {item}")))?;
        if *needs_table && table.is_none() {
            return Err(WorldError::Rejected(format!("{item} needs a crafting table")));
        }

        let batches = count.max(1).div_ceil(*output);
        for (ingredient, need) in ingredients.iter() {
            let have = state.items.get(*ingredient).copied().unwrap_or(0);
            if have < need * batches {
                return Err(WorldError::Rejected(format!(
                    "missing {ingredient}: have {have}, need {}",
                    need * batches
                )));
            }
        }
        for (ingredient, need) in ingredients.iter() {
            state.take_item(ingredient, need * batches);
        }
        state.give_item(item, output * batches);
        Ok(())
    }

    async fn store(&self, container: BlockPos, item: &str, count: u32) -> Result<u32, WorldError> {
        self.enter("store", format!("{count}x {item} -> {container:?}")).await?;
        let mut state = self.lock();
        match state.material(container).as_deref() {
            Some("chest") | Some("barrel") => {}
            _ => return Err(WorldError::NotFound(format!("no container at {container:?}"))),
        }
        if state.position.distance(&container.center()) > DIG_REACH {
            return Err(WorldError::Unreachable(format!("{container:?} is out of reach")));
        }
        let stored = state.take_item(item, count);
        *state
            .containers
            .entry(container)
            .or_default()
            .entry(item.to_string())
            .or_insert(0) += stored;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_yaml_uses_defaults() {
        let scenario = Scenario::from_yaml(
            "name: cave\nagent:\n  health: 5\n  inventory:\n    bread: 2\nentities:\n  - id: 1\n    kind: zombie\n    position: {x: 4.0, y: 64.0, z: 0.0}\nfailures:\n  status:\n    kind: hang\n",
        )
        .unwrap();
        assert_eq!(scenario.agent.health, 5.0);
        assert_eq!(scenario.agent.hunger, MAX_HUNGER);
        assert_eq!(scenario.floor, Some(63));
        assert_eq!(scenario.entities[0].health, 20.0);
        assert_eq!(scenario.failures["status"].kind, FailureKind::Hang);
    }

    #[tokio::test]
    async fn dig_drops_item_and_clears_block() {
        let world = ScriptedWorld::new();
        let ore = BlockPos::new(2, 64, 0);
        world.set_block(ore, "iron_ore");

        world.dig(ore).await.unwrap();
        assert_eq!(world.item_count("raw_iron"), 1);
        assert_eq!(world.block(ore), None);
        assert!(matches!(world.dig(ore).await, Err(WorldError::NotFound(_))));
    }

    #[tokio::test]
    async fn floor_is_solid_and_air_above() {
        let world = ScriptedWorld::new();
        assert_eq!(world.block_at(BlockPos::new(0, 63, 0)).await.unwrap().as_deref(), Some("stone"));
        assert_eq!(world.block_at(BlockPos::new(0, 64, 0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let world = ScriptedWorld::new();
        world.fail("move_to", FailureKind::Unreachable, Some(1));
        let target = Position::new(3.0, 64.0, 3.0);
        assert!(matches!(world.move_to(target).await, Err(WorldError::Unreachable(_))));
        world.move_to(target).await.unwrap();
        assert_eq!(world.position(), target);
        assert_eq!(world.count_calls("move_to"), 2);
    }

    #[tokio::test]
    async fn crafting_consumes_ingredients() {
        let world = ScriptedWorld::new();
        world.give("oak_log", 1);
        world.craft("oak_planks", 4, None).await.unwrap();
        assert_eq!(world.item_count("oak_planks"), 4);
        assert_eq!(world.item_count("oak_log"), 0);

        let err = world.craft("wooden_pickaxe", 1, None).await.unwrap_err();
        assert!(err.to_string().contains("crafting table"));
    }
}
