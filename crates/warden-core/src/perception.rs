//! Perception snapshot builder.

use std::sync::Arc;

use agent_core::{Hazard, HazardKind, Position, ResourceSighting, ThreatTable, WorldSnapshot};
use chrono::Utc;

use crate::config::PerceptionConfig;
use crate::error::WorldError;
use crate::world::{is_passable, BlockQuery, EntityQuery, WorldSurface};

/// Block materials that become hazards when inside the scan volume.
pub const HAZARD_MATERIALS: &[&str] = &[
    "lava",
    "flowing_lava",
    "fire",
    "soul_fire",
    "magma_block",
    "cactus",
    "sweet_berry_bush",
    "powder_snow",
    "wither_rose",
];

/// Builds one snapshot per tick, never waiting longer than the sample timeout.
pub struct PerceptionBuilder {
    config: PerceptionConfig,
    last: Option<Arc<WorldSnapshot>>,
    tick: u64,
}

impl PerceptionBuilder {
    pub fn new(config: PerceptionConfig) -> Self {
        Self {
            config,
            last: None,
            tick: 0,
        }
    }

    pub fn threat_table(&self) -> &ThreatTable {
        &self.config.threats
    }

    /// Last snapshot built from a successful sample.
    pub fn last_fresh(&self) -> Option<&Arc<WorldSnapshot>> {
        self.last.as_ref()
    }

    pub async fn build(&mut self, world: &dyn WorldSurface) -> Arc<WorldSnapshot> {
        self.tick += 1;
        let tick = self.tick;
        let timeout = self.config.sample_timeout();

        match tokio::time::timeout(timeout, self.sample(world, tick)).await {
            Ok(Ok(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                self.last = Some(Arc::clone(&snapshot));
                snapshot
            }
            Ok(Err(e)) => {
                tracing::warn!(tick, error = %e, "Perception failed, reusing previous snapshot");
                self.stale(tick)
            }
            Err(_) => {
                tracing::warn!(
                    tick,
                    timeout_ms = self.config.sample_timeout_ms,
                    "Perception timed out, reusing previous snapshot"
                );
                self.stale(tick)
            }
        }
    }

    fn stale(&self, tick: u64) -> Arc<WorldSnapshot> {
        Arc::new(match &self.last {
            Some(previous) => previous.to_stale(tick),
            None => WorldSnapshot::empty(tick),
        })
    }

    async fn sample(&self, world: &dyn WorldSurface, tick: u64) -> Result<WorldSnapshot, WorldError> {
        let status = world.status().await?;
        let origin = status.position;

        let entities = world
            .find_entities(&EntityQuery::within(self.config.threats.scan_radius))
            .await?;
        let threats = self.config.threats.classify(&origin, &entities);

        let mut hazards = self.scan_hazards(world, &origin).await?;
        if let Some(void) = self.check_void(world, &origin).await? {
            hazards.push(void);
        }

        // best effort
        let resources = match self.scan_resources(world, &origin).await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::debug!(tick, error = %e, "Resource scan failed");
                Vec::new()
            }
        };

        let mut snapshot = WorldSnapshot {
            tick,
            taken_at: Utc::now(),
            stale: false,
            health: status.health,
            hunger: status.hunger,
            position: origin,
            threats,
            hazards,
            resources,
            inventory: status.inventory,
        };
        snapshot.sort_lists();

        tracing::debug!(
            tick,
            threats = snapshot.threats.len(),
            hazards = snapshot.hazards.len(),
            resources = snapshot.resources.len(),
            "Snapshot built"
        );
        Ok(snapshot)
    }

    async fn scan_hazards(
        &self,
        world: &dyn WorldSurface,
        origin: &Position,
    ) -> Result<Vec<Hazard>, WorldError> {
        let h = self.config.hazard_horizontal;
        let v = self.config.hazard_vertical;
        let reach = f64::from(2 * h * h + v * v).sqrt() + 1.0;
        let center = origin.block();
        // The sphere pokes out of the box, so ask for every cell it can hold
        // and apply the cap only after the box filter.
        let side = 2 * reach.ceil() as usize + 1;
        let scan_limit = side.pow(3);

        let blocks = world
            .find_blocks(
                &BlockQuery::any_of(HAZARD_MATERIALS.iter().copied()),
                reach,
                scan_limit,
            )
            .await?;

        let mut hazards: Vec<Hazard> = blocks
            .into_iter()
            .filter(|b| {
                (b.position.x - center.x).abs() <= h
                    && (b.position.z - center.z).abs() <= h
                    && (b.position.y - center.y).abs() <= v
            })
            .filter_map(|b| {
                HazardKind::from_material(&b.material).map(|kind| Hazard {
                    kind,
                    position: b.position,
                    distance: origin.distance(&b.position.center()),
                })
            })
            .collect();
        hazards.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hazards.truncate(self.config.max_hazards);
        Ok(hazards)
    }

    async fn check_void(
        &self,
        world: &dyn WorldSurface,
        origin: &Position,
    ) -> Result<Option<Hazard>, WorldError> {
        let below = origin.block().below();
        let solid = world
            .block_at(below)
            .await?
            .is_some_and(|material| !is_passable(&material));

        Ok((!solid).then(|| Hazard {
            kind: HazardKind::Void,
            position: below,
            distance: origin.distance(&below.center()),
        }))
    }

    async fn scan_resources(
        &self,
        world: &dyn WorldSurface,
        origin: &Position,
    ) -> Result<Vec<ResourceSighting>, WorldError> {
        if self.config.resource_kinds.is_empty() || self.config.resource_limit == 0 {
            return Ok(Vec::new());
        }
        let blocks = world
            .find_blocks(
                &BlockQuery::any_of(self.config.resource_kinds.iter().cloned()),
                self.config.resource_radius,
                self.config.resource_limit,
            )
            .await?;

        let mut resources: Vec<ResourceSighting> = blocks
            .into_iter()
            .map(|b| ResourceSighting {
                distance: origin.distance(&b.position.center()),
                kind: b.material,
                position: b.position,
            })
            .collect();
        resources.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        resources.truncate(self.config.resource_limit);
        Ok(resources)
    }
}
