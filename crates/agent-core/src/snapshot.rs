//! Immutable per-tick perception values.
//!
//! A `WorldSnapshot` is built once per tick and shared behind an `Arc`; nothing
//! mutates it afterwards. Consumers that need to keep data beyond the tick copy
//! the fields they need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{BlockPos, Position};
use crate::inventory::Inventory;

pub const MAX_HEALTH: f32 = 20.0;
pub const MAX_HUNGER: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatEntry {
    pub entity_id: EntityId,
    pub kind: String,
    pub position: Position,
    pub distance: f64,
    pub danger_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    /// No solid block directly beneath the agent.
    Void,
    Lava,
    Fire,
    Magma,
    Cactus,
    BerryBush,
    PowderSnow,
    WitherRose,
}

impl HazardKind {
    /// Map a block material name onto a hazard kind.
    pub fn from_material(material: &str) -> Option<Self> {
        match material {
            "lava" | "flowing_lava" => Some(Self::Lava),
            "fire" | "soul_fire" => Some(Self::Fire),
            "magma_block" => Some(Self::Magma),
            "cactus" => Some(Self::Cactus),
            "sweet_berry_bush" => Some(Self::BerryBush),
            "powder_snow" => Some(Self::PowderSnow),
            "wither_rose" => Some(Self::WitherRose),
            _ => None,
        }
    }

    /// Hazards that burn on contact.
    pub fn is_burning(self) -> bool {
        matches!(self, Self::Lava | Self::Fire | Self::Magma)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hazard {
    pub kind: HazardKind,
    pub position: BlockPos,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSighting {
    pub kind: String,
    pub position: BlockPos,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub taken_at: DateTime<Utc>,
    /// The world surface did not answer in time; data is carried over from the
    /// previous snapshot.
    pub stale: bool,
    pub health: f32,
    pub hunger: f32,
    pub position: Position,
    /// Sorted by descending danger score.
    pub threats: Vec<ThreatEntry>,
    /// Sorted by ascending distance.
    pub hazards: Vec<Hazard>,
    /// Sorted by ascending distance.
    pub resources: Vec<ResourceSighting>,
    pub inventory: Inventory,
}

impl WorldSnapshot {
    /// Snapshot used before the first successful sample.
    pub fn empty(tick: u64) -> Self {
        Self {
            tick,
            taken_at: Utc::now(),
            stale: true,
            health: MAX_HEALTH,
            hunger: MAX_HUNGER,
            position: Position::default(),
            threats: Vec::new(),
            hazards: Vec::new(),
            resources: Vec::new(),
            inventory: Inventory::default(),
        }
    }

    /// Carry this snapshot forward into a later tick, marked stale.
    pub fn to_stale(&self, tick: u64) -> Self {
        Self {
            tick,
            taken_at: Utc::now(),
            stale: true,
            ..self.clone()
        }
    }

    /// Restore the ordering invariants on threats, hazards and resources.
    pub fn sort_lists(&mut self) {
        sort_threats(&mut self.threats);
        self.hazards
            .sort_by(|a, b| a.distance.total_cmp(&b.distance));
        self.resources
            .sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }
}

/// Descending danger; ties go to the closer entity, then the lower id.
pub fn sort_threats(threats: &mut [ThreatEntry]) {
    threats.sort_by(|a, b| {
        b.danger_score
            .total_cmp(&a.danger_score)
            .then(a.distance.total_cmp(&b.distance))
            .then(a.entity_id.cmp(&b.entity_id))
    });
}
