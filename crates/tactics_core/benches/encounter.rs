//! Encounter benchmarks for tactics_core.
//!
//! Run with: `cargo bench -p tactics_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tactics_core::ai::decide;
use tactics_core::data::JobTable;
use tactics_core::grid::BattleMap;
use tactics_core::pathfinding::{reachable_tiles, MoveProfile};
use tactics_core::scenario::{encounter, town_fort_encounter, town_fort_spawns};
use tactics_core::timeline::predict;
use tactics_test_utils::balance::run_battle;
use tactics_test_utils::fixtures::{ai_vs_ai_rules, skirmish};

/// Pathfinding, forecast and AI decision on the default encounter.
pub fn rules_benchmark(c: &mut Criterion) {
    let mut state = town_fort_encounter(7).expect("default encounter");
    while state.active_unit().is_none() {
        state.step();
    }
    let active = state.active_unit().expect("a unit holds the turn");
    let unit = state.roster().get(active).expect("active unit").clone();

    c.bench_function("reachable_tiles", |b| {
        b.iter(|| {
            reachable_tiles(
                black_box(state.map()),
                black_box(state.roster()),
                MoveProfile::of(&unit),
                unit.position,
            )
        })
    });

    c.bench_function("predict_timeline_16", |b| {
        b.iter(|| predict(black_box(state.roster()), 16, None))
    });

    c.bench_function("ai_decide", |b| b.iter(|| decide(black_box(&state), active)));
}

/// Full AI-vs-AI battles.
pub fn battle_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("battle");
    group.sample_size(20);

    group.bench_function("skirmish_ai_vs_ai", |b| {
        b.iter(|| run_battle(skirmish(black_box(3), ai_vs_ai_rules()), 20_000))
    });

    group.bench_function("town_fort_2000_ticks", |b| {
        b.iter(|| {
            let mut state = encounter(
                BattleMap::default(),
                JobTable::default(),
                ai_vs_ai_rules(),
                &town_fort_spawns(),
                black_box(11),
            )
            .expect("default encounter");
            for _ in 0..2_000 {
                state.step();
            }
            state.state_hash()
        })
    });

    group.finish();
}

criterion_group!(benches, rules_benchmark, battle_benchmark);
criterion_main!(benches);
