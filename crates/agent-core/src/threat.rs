//! Threat classification and assessment.
//!
//! Everything here is pure: the same inputs always give the same ranking, so the
//! decision engine and the combat/retreat paths share one view of danger.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::geometry::Position;
use crate::snapshot::{sort_threats, EntityId, Hazard, ThreatEntry, WorldSnapshot};

/// Raw entity data as reported by the world surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityObservation {
    pub id: EntityId,
    pub kind: String,
    pub position: Position,
}

/// Hostile kinds and their base danger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatTable {
    /// Entities of these kinds are threats when inside `scan_radius`.
    pub hostile_kinds: BTreeSet<String>,
    /// Base danger per kind; hostile kinds missing here use `default_danger`.
    pub base_danger: BTreeMap<String, f64>,
    pub default_danger: f64,
    pub scan_radius: f64,
    /// Distance at which the proximity bonus reaches zero.
    pub proximity_falloff: f64,
}

impl Default for ThreatTable {
    fn default() -> Self {
        let base_danger: BTreeMap<String, f64> = [
            ("creeper", 9.0),
            ("vindicator", 8.0),
            ("skeleton", 7.0),
            ("witch", 7.0),
            ("pillager", 6.0),
            ("zombie", 5.0),
            ("spider", 5.0),
            ("phantom", 5.0),
            ("enderman", 4.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut hostile_kinds: BTreeSet<String> = base_danger.keys().cloned().collect();
        hostile_kinds.extend(
            [
                "cave_spider",
                "drowned",
                "husk",
                "stray",
                "zombie_villager",
                "slime",
                "magma_cube",
                "blaze",
                "ghast",
                "silverfish",
                "evoker",
                "ravager",
                "guardian",
                "hoglin",
                "piglin_brute",
                "warden",
            ]
            .into_iter()
            .map(String::from),
        );

        Self {
            hostile_kinds,
            base_danger,
            default_danger: 2.0,
            scan_radius: 32.0,
            proximity_falloff: 20.0,
        }
    }
}

impl ThreatTable {
    pub fn is_hostile(&self, kind: &str) -> bool {
        self.hostile_kinds.contains(&kind.to_ascii_lowercase())
    }

    pub fn base_danger(&self, kind: &str) -> f64 {
        self.base_danger
            .get(&kind.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_danger)
    }

    /// `base * (1 + max(0, 1 - distance / falloff))`
    pub fn danger_score(&self, kind: &str, distance: f64) -> f64 {
        let falloff = if self.proximity_falloff > 0.0 {
            self.proximity_falloff
        } else {
            1.0
        };
        let proximity = (1.0 - distance / falloff).max(0.0);
        self.base_danger(kind) * (1.0 + proximity)
    }

    /// Keep hostile entities within the scan radius, scored and ranked.
    pub fn classify(&self, origin: &Position, entities: &[EntityObservation]) -> Vec<ThreatEntry> {
        let mut threats: Vec<ThreatEntry> = entities
            .iter()
            .filter(|e| self.is_hostile(&e.kind))
            .filter_map(|e| {
                let distance = origin.distance(&e.position);
                (distance <= self.scan_radius).then(|| ThreatEntry {
                    entity_id: e.id,
                    kind: e.kind.clone(),
                    position: e.position,
                    distance,
                    danger_score: self.danger_score(&e.kind, distance),
                })
            })
            .collect();
        sort_threats(&mut threats);
        threats
    }
}

pub fn nearest_threat(snapshot: &WorldSnapshot) -> Option<&ThreatEntry> {
    snapshot
        .threats
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

pub fn most_dangerous(snapshot: &WorldSnapshot) -> Option<&ThreatEntry> {
    snapshot.threats.first()
}

pub fn nearest_hazard(snapshot: &WorldSnapshot) -> Option<&Hazard> {
    snapshot.hazards.first()
}

pub fn threats_within(snapshot: &WorldSnapshot, radius: f64) -> impl Iterator<Item = &ThreatEntry> {
    snapshot.threats.iter().filter(move |t| t.distance <= radius)
}

/// True iff there are no threats and no hazards.
pub fn is_area_safe(snapshot: &WorldSnapshot) -> bool {
    snapshot.threats.is_empty() && snapshot.hazards.is_empty()
}

/// A point `distance` away from `danger`, on the far side of `from`.
///
/// Height is kept. When the danger sits (horizontally) on top of `from`, the
/// direction comes from `fallback_angle` (radians).
pub fn flee_point(from: &Position, danger: &Position, distance: f64, fallback_angle: f64) -> Position {
    let dx = from.x - danger.x;
    let dz = from.z - danger.z;
    let len = (dx * dx + dz * dz).sqrt();
    let (ux, uz) = if len > 0.1 {
        (dx / len, dz / len)
    } else {
        (fallback_angle.cos(), fallback_angle.sin())
    };
    from.offset(ux * distance, 0.0, uz * distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: u64, kind: &str, x: f64) -> EntityObservation {
        EntityObservation {
            id: EntityId(id),
            kind: kind.to_string(),
            position: Position::new(x, 64.0, 0.0),
        }
    }

    #[test]
    fn danger_score_doubles_at_point_blank() {
        let table = ThreatTable::default();
        assert_eq!(table.danger_score("zombie", 0.0), 10.0);
        assert_eq!(table.danger_score("zombie", 20.0), 5.0);
        assert_eq!(table.danger_score("zombie", 30.0), 5.0);
        assert_eq!(table.danger_score("zombie", 10.0), 7.5);
    }

    #[test]
    fn unknown_hostile_gets_default_score() {
        let table = ThreatTable::default();
        assert!(table.is_hostile("drowned"));
        assert_eq!(table.danger_score("drowned", 20.0), table.default_danger);
    }

    #[test]
    fn classify_filters_passive_and_far_entities() {
        let table = ThreatTable::default();
        let origin = Position::new(0.0, 64.0, 0.0);
        let threats = table.classify(
            &origin,
            &[
                entity(1, "cow", 2.0),
                entity(2, "zombie", 40.0),
                entity(3, "zombie", 10.0),
                entity(4, "creeper", 15.0),
            ],
        );
        let ids: Vec<u64> = threats.iter().map(|t| t.entity_id.0).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn most_dangerous_is_first_and_may_differ_from_nearest() {
        let table = ThreatTable::default();
        let mut snapshot = WorldSnapshot::empty(1);
        snapshot.position = Position::new(0.0, 64.0, 0.0);
        assert!(most_dangerous(&snapshot).is_none());

        snapshot.threats = table.classify(
            &snapshot.position,
            &[entity(1, "zombie", 3.0), entity(2, "creeper", 12.0)],
        );
        let top = most_dangerous(&snapshot).unwrap();
        assert_eq!(top.entity_id, EntityId(2));
        assert_eq!(top, &snapshot.threats[0]);
        assert_eq!(nearest_threat(&snapshot).unwrap().entity_id, EntityId(1));
    }

    #[test]
    fn flee_point_moves_away_from_danger() {
        let from = Position::new(0.0, 64.0, 0.0);
        let danger = Position::new(5.0, 64.0, 0.0);
        let p = flee_point(&from, &danger, 20.0, 0.0);
        assert!((p.x + 20.0).abs() < 1e-9);
        assert_eq!(p.y, 64.0);
    }

    #[test]
    fn flee_point_uses_fallback_when_on_top() {
        let from = Position::new(0.0, 64.0, 0.0);
        let p = flee_point(&from, &from, 4.0, std::f64::consts::FRAC_PI_2);
        assert!(p.x.abs() < 1e-9);
        assert!((p.z - 4.0).abs() < 1e-9);
    }
}
