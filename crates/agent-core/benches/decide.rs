use std::sync::Arc;

use agent_core::{
    DecisionConfig, DecisionEngine, EntityId, EntityObservation, Position, ThreatTable,
    WorldSnapshot,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn crowded_snapshot() -> WorldSnapshot {
    let table = ThreatTable::default();
    let origin = Position::new(0.0, 64.0, 0.0);
    let kinds = ["zombie", "skeleton", "creeper", "cow", "spider", "sheep"];
    let entities = (0..64u64)
        .map(|i| EntityObservation {
            id: EntityId(i),
            kind: kinds[i as usize % kinds.len()].to_string(),
            position: Position::new((i as f64) - 32.0, 64.0, (i % 7) as f64 * 3.0),
        })
        .collect::<Vec<_>>();

    let mut snapshot = WorldSnapshot::empty(0);
    snapshot.stale = false;
    snapshot.position = origin;
    snapshot.threats = table.classify(&origin, &entities);
    snapshot
}

fn bench_decide(c: &mut Criterion) {
    let snapshot = Arc::new(crowded_snapshot());
    let mut engine = DecisionEngine::new(DecisionConfig::default());

    c.bench_function("agent-core/decide(entities=64)", |b| {
        b.iter(|| {
            let decision = engine.decide(Arc::clone(&snapshot));
            black_box(decision.action);
        })
    });
}

fn bench_classify(c: &mut Criterion) {
    let table = ThreatTable::default();
    let origin = Position::new(0.0, 64.0, 0.0);
    let entities = (0..256u64)
        .map(|i| EntityObservation {
            id: EntityId(i),
            kind: if i % 3 == 0 { "zombie" } else { "pig" }.to_string(),
            position: Position::new((i % 40) as f64, 64.0, (i / 40) as f64),
        })
        .collect::<Vec<_>>();

    c.bench_function("agent-core/classify(entities=256)", |b| {
        b.iter(|| black_box(table.classify(&origin, &entities)))
    });
}

criterion_group!(benches, bench_decide, bench_classify);
criterion_main!(benches);
