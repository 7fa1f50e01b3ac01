//! The world-interaction surface consumed by the kernel.
//!
//! Every call is a suspension point: the executing task may be preempted at any
//! `.await` on this trait.

use std::fmt;

use agent_core::{BlockPos, EntityId, EntityObservation, Inventory, Position};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// Self-status accessors bundled into one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfStatus {
    pub health: f32,
    pub hunger: f32,
    pub position: Position,
    pub inventory: Inventory,
}

/// Entity filter; empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    pub id: Option<EntityId>,
    pub kinds: Vec<String>,
    pub max_distance: Option<f64>,
}

impl EntityQuery {
    pub fn within(max_distance: f64) -> Self {
        Self {
            max_distance: Some(max_distance),
            ..Self::default()
        }
    }

    pub fn by_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn matches(&self, origin: &Position, entity: &EntityObservation) -> bool {
        if self.id.is_some_and(|id| id != entity.id) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.iter().any(|k| k == &entity.kind) {
            return false;
        }
        self.max_distance
            .map_or(true, |d| origin.distance(&entity.position) <= d)
    }
}

/// Block material filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockQuery {
    pub materials: Vec<String>,
}

impl BlockQuery {
    pub fn any_of<I, S>(materials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            materials: materials.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, material: &str) -> bool {
        self.materials.iter().any(|m| m == material)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub position: BlockPos,
    pub material: String,
}

/// Face of a reference block that a new block is placed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl Face {
    /// The cell the placed block ends up in.
    pub fn adjacent(self, reference: BlockPos) -> BlockPos {
        match self {
            Self::Up => reference.offset(0, 1, 0),
            Self::Down => reference.offset(0, -1, 0),
            Self::North => reference.offset(0, 0, -1),
            Self::South => reference.offset(0, 0, 1),
            Self::East => reference.offset(1, 0, 0),
            Self::West => reference.offset(-1, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Hand,
    OffHand,
}

impl fmt::Display for EquipSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hand => f.write_str("hand"),
            Self::OffHand => f.write_str("off_hand"),
        }
    }
}

/// Materials that count as nothing under the agent's feet.
pub fn is_passable(material: &str) -> bool {
    matches!(material, "air" | "cave_air" | "void_air")
}

/// Async capability surface of the host world.
#[async_trait]
pub trait WorldSurface: Send + Sync {
    async fn status(&self) -> Result<SelfStatus, WorldError>;

    async fn find_entities(&self, query: &EntityQuery) -> Result<Vec<EntityObservation>, WorldError>;

    /// Nearest matching blocks first, at most `count`.
    async fn find_blocks(
        &self,
        query: &BlockQuery,
        max_distance: f64,
        count: usize,
    ) -> Result<Vec<BlockInfo>, WorldError>;

    /// Material at a cell; `None` when the cell is empty.
    async fn block_at(&self, position: BlockPos) -> Result<Option<String>, WorldError>;

    async fn move_near(&self, target: Position, tolerance: f64) -> Result<(), WorldError>;

    async fn move_to(&self, target: Position) -> Result<(), WorldError>;

    async fn follow(&self, entity: EntityId, distance: f64) -> Result<(), WorldError>;

    async fn dig(&self, block: BlockPos) -> Result<(), WorldError>;

    /// Place the held item against `reference`.
    async fn place(&self, reference: BlockPos, face: Face) -> Result<(), WorldError>;

    async fn equip(&self, item: &str, slot: EquipSlot) -> Result<(), WorldError>;

    async fn attack(&self, entity: EntityId) -> Result<(), WorldError>;

    /// Eat the held item.
    async fn consume(&self) -> Result<(), WorldError>;

    async fn craft(&self, item: &str, count: u32, table: Option<BlockPos>) -> Result<(), WorldError>;

    /// Move items into a container; returns how many were stored.
    async fn store(&self, container: BlockPos, item: &str, count: u32) -> Result<u32, WorldError>;
}
