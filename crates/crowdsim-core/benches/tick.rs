//! Criterion benchmarks for the crowd tick.
//!
//! - `tick_full_crowd`: ten agents with lively tuning, one tick per iteration
//! - `snapshot_json`: serializing the world the renderer receives

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crowdsim_core::prelude::*;

fn lively_engine() -> SimulationEngine {
    let mut setup = EngineSetup::default();
    setup.config.wander_chance = 0.05;
    setup.config.trigger_chance = 0.02;
    setup.population.default_count = 10;
    let mut engine = SimulationEngine::new(setup, 7).expect("valid setup");

    // Warm up so the crowd is spread out and mid-interaction
    for i in 0..600 {
        engine.tick(i as f64 * 16.7).expect("tick");
    }
    engine
}

fn bench_tick(c: &mut Criterion) {
    let mut engine = lively_engine();
    let mut now = 600.0 * 16.7;
    c.bench_function("tick_full_crowd", |b| {
        b.iter(|| {
            now += 16.7;
            black_box(engine.tick(black_box(now)).expect("tick"));
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let engine = lively_engine();
    c.bench_function("snapshot_json", |b| {
        b.iter(|| black_box(engine.snapshot(10_000.0).to_json().expect("json")))
    });
}

criterion_group!(benches, bench_tick, bench_snapshot);
criterion_main!(benches);
