use agent_core::threat::{is_area_safe, nearest_threat};
use agent_core::{
    BlockPos, EntityId, EntityObservation, Hazard, HazardKind, History, Position, ThreatTable,
    WorldSnapshot,
};
use proptest::prelude::*;

const KINDS: &[&str] = &[
    "zombie", "skeleton", "creeper", "spider", "enderman", "witch", "drowned", "cow", "villager",
];

fn observation() -> impl Strategy<Value = EntityObservation> {
    (0u64..10_000, 0usize..KINDS.len(), -48.0f64..48.0, 60.0f64..70.0, -48.0f64..48.0).prop_map(
        |(id, kind, x, y, z)| EntityObservation {
            id: EntityId(id),
            kind: KINDS[kind].to_string(),
            position: Position::new(x, y, z),
        },
    )
}

fn hazard() -> impl Strategy<Value = Hazard> {
    (-8i32..=8, 61i32..=67, -8i32..=8, 0.0f64..14.0).prop_map(|(x, y, z, distance)| Hazard {
        kind: HazardKind::Lava,
        position: BlockPos::new(x, y, z),
        distance,
    })
}

proptest! {
    #[test]
    fn classified_threats_sorted_by_danger(entities in prop::collection::vec(observation(), 0..40)) {
        let table = ThreatTable::default();
        let origin = Position::new(0.0, 64.0, 0.0);
        let threats = table.classify(&origin, &entities);

        for pair in threats.windows(2) {
            prop_assert!(pair[0].danger_score >= pair[1].danger_score);
        }
        for t in &threats {
            prop_assert!(t.distance <= table.scan_radius);
            prop_assert!(table.is_hostile(&t.kind));
            prop_assert!(t.danger_score >= table.base_danger(&t.kind));
        }
    }

    #[test]
    fn sort_lists_orders_hazards_by_distance(
        entities in prop::collection::vec(observation(), 0..20),
        hazards in prop::collection::vec(hazard(), 0..20),
    ) {
        let table = ThreatTable::default();
        let mut snapshot = WorldSnapshot::empty(1);
        snapshot.position = Position::new(0.0, 64.0, 0.0);
        snapshot.threats = table.classify(&snapshot.position, &entities);
        snapshot.threats.reverse();
        snapshot.hazards = hazards;
        snapshot.sort_lists();

        for pair in snapshot.hazards.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
        }
        for pair in snapshot.threats.windows(2) {
            prop_assert!(pair[0].danger_score >= pair[1].danger_score);
        }
        prop_assert_eq!(
            is_area_safe(&snapshot),
            snapshot.threats.is_empty() && snapshot.hazards.is_empty()
        );
        if let Some(nearest) = nearest_threat(&snapshot) {
            prop_assert!(snapshot.threats.iter().all(|t| t.distance >= nearest.distance));
        }
    }

    #[test]
    fn history_never_exceeds_capacity(capacity in 1usize..50, extra in 0usize..30) {
        let mut history = History::new(capacity);
        let total = capacity + extra;
        for i in 0..total {
            history.push(i);
        }
        prop_assert_eq!(history.len(), capacity.min(total));
        prop_assert_eq!(history.latest().copied(), Some(total - 1));
        prop_assert_eq!(history.oldest().copied(), Some(total - capacity));
    }
}

#[test]
fn history_capacity_plus_ten_evicts_oldest_first() {
    for capacity in [10usize, 100] {
        let mut history = History::new(capacity);
        let evicted: Vec<usize> = (0..capacity + 10).filter_map(|i| history.push(i)).collect();
        assert_eq!(history.len(), capacity);
        assert_eq!(evicted, (0..10).collect::<Vec<_>>());
        assert_eq!(history.oldest(), Some(&10));
        assert_eq!(history.latest(), Some(&(capacity + 9)));
    }
}
