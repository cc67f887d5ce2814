//! Property-based tests for the crowd engine.
//!
//! Random seeds, tuning and host pokes drive the engine; after every tick
//! the structural invariants of the world must still hold.

use std::collections::HashSet;

use crowdsim_core::prelude::*;
use crowdsim_core::systems::EphemeralQueue;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
struct Tuning {
    seed: u64,
    wander_chance: f64,
    trigger_chance: f64,
    conflict_chance: f64,
    hit_chance: f64,
    population: usize,
}

fn arb_tuning() -> impl Strategy<Value = Tuning> {
    (
        any::<u64>(),
        0.0f64..=0.2,
        0.0f64..=1.0,
        0.0f64..=1.0,
        0.0f64..=1.0,
        1usize..=10,
    )
        .prop_map(
            |(seed, wander_chance, trigger_chance, conflict_chance, hit_chance, population)| {
                Tuning {
                    seed,
                    wander_chance,
                    trigger_chance,
                    conflict_chance,
                    hit_chance,
                    population,
                }
            },
        )
}

/// Per-tick host action
#[derive(Debug, Clone)]
enum HostOp {
    Nothing,
    Interact(u32),
    Spark(f32, f32),
}

fn arb_host_ops(max_ticks: usize) -> impl Strategy<Value = Vec<HostOp>> {
    proptest::collection::vec(
        prop_oneof![
            6 => Just(HostOp::Nothing),
            2 => (0..12u32).prop_map(HostOp::Interact),
            1 => (-100.0f32..1100.0, -100.0f32..700.0).prop_map(|(x, y)| HostOp::Spark(x, y)),
        ],
        1..=max_ticks,
    )
}

fn build_engine(tuning: &Tuning) -> SimulationEngine {
    let mut setup = EngineSetup::default();
    setup.config.wander_chance = tuning.wander_chance;
    setup.config.trigger_chance = tuning.trigger_chance;
    setup.config.conflict_chance = tuning.conflict_chance;
    setup.config.hit_chance = tuning.hit_chance;
    setup.config.min_idle_ms = 100.0;
    setup.config.social_dwell_ms = 400.0;
    setup.config.conflict_dwell_ms = 600.0;
    setup.population.default_count = tuning.population;
    SimulationEngine::new(setup, tuning.seed).expect("valid setup")
}

fn run(engine: &mut SimulationEngine, ops: &[HostOp], mut check: impl FnMut(&SimulationEngine)) {
    for (i, op) in ops.iter().enumerate() {
        match op {
            HostOp::Nothing => {}
            HostOp::Interact(id) => {
                // Unknown ids are rejected up front; that is fine here
                let _ = engine.interact(AgentId(*id));
            }
            HostOp::Spark(x, y) => engine.trigger_effect(Vec2::new(*x, *y), EffectKind::Spark),
        }
        engine.tick(i as f64 * 16.7).expect("tick");
        check(engine);
    }
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every agent stays inside the margins after every tick.
    #[test]
    fn positions_stay_in_bounds(tuning in arb_tuning(), ops in arb_host_ops(300)) {
        let mut engine = build_engine(&tuning);
        let bounds = engine.config().bounds();
        run(&mut engine, &ops, |engine| {
            for agent in engine.registry().records() {
                assert!(
                    bounds.contains(&agent.position),
                    "{} escaped to {:?}",
                    agent.id,
                    agent.position
                );
            }
        });
    }

    /// The last recorded transition of every agent is in the table.
    #[test]
    fn transitions_follow_table(tuning in arb_tuning(), ops in arb_host_ops(300)) {
        let mut engine = build_engine(&tuning);
        run(&mut engine, &ops, |engine| {
            for agent in engine.registry().records() {
                let b = agent.behavior;
                assert!(BehaviorState::all().contains(&b.state));
                assert!(
                    b.previous.can_transition_to(b.state),
                    "{}: {:?} -> {:?}",
                    agent.id,
                    b.previous,
                    b.state
                );
                if b.state == BehaviorState::Moving {
                    assert!(b.target.is_some());
                }
            }
        });
    }

    /// Partners are mutual and share the engaged state; free agents have none.
    #[test]
    fn partners_are_symmetric(tuning in arb_tuning(), ops in arb_host_ops(300)) {
        let mut engine = build_engine(&tuning);
        run(&mut engine, &ops, |engine| {
            let registry = engine.registry();
            for agent in registry.records() {
                let Some(partner_id) = agent.behavior.partner else {
                    continue;
                };
                assert!(agent.behavior.state.is_engaged(), "{} idle with a partner", agent.id);
                assert_ne!(partner_id, agent.id);
                let partner = registry.record(partner_id).expect("partner exists");
                assert_eq!(partner.behavior.partner, Some(agent.id));
                assert_eq!(partner.behavior.state, agent.behavior.state);
            }
        });
    }

    /// Live messages and effects never share an id.
    #[test]
    fn ephemeral_ids_unique(tuning in arb_tuning(), ops in arb_host_ops(300)) {
        let mut engine = build_engine(&tuning);
        run(&mut engine, &ops, |engine| {
            let queue = engine.queue();
            let mut seen = HashSet::new();
            for id in queue
                .messages()
                .iter()
                .map(|m| m.id)
                .chain(queue.effects().iter().map(|e| e.id))
            {
                assert!(seen.insert(id), "duplicate ephemeral id {:?}", id);
            }
        });
    }

    /// Pruning keeps exactly the unexpired objects and is idempotent.
    #[test]
    fn prune_is_exact_and_idempotent(
        items in proptest::collection::vec((0.0f64..5000.0, 1.0f64..4000.0, any::<bool>()), 0..40),
        now in 0.0f64..10000.0,
    ) {
        let mut queue = EphemeralQueue::new();
        for (created_at, ttl, is_message) in &items {
            if *is_message {
                queue.push_message(AgentId(0), "x", *created_at, *ttl);
            } else {
                queue.push_effect(Vec2::ZERO, EffectKind::Hit, *created_at, *ttl);
            }
        }

        queue.prune(now);
        let expected = items.iter().filter(|(c, t, _)| now - c < *t).count();
        prop_assert_eq!(queue.live_count(), expected);
        prop_assert_eq!(queue.prune(now), 0);
    }

    /// Population never shrinks and never exceeds the cap.
    #[test]
    fn population_only_grows(tuning in arb_tuning(), contexts in proptest::collection::vec(0..5usize, 1..20)) {
        let mut engine = build_engine(&tuning);
        let names = ["home", "dashboard", "gallery", "about", "unknown"];
        let mut last = 0;
        for (i, ctx) in contexts.iter().enumerate() {
            engine.set_context(Some(names[*ctx]));
            engine.tick(i as f64 * 16.7).expect("tick");
            let count = engine.agent_count();
            prop_assert!(count >= last);
            prop_assert!(count <= engine.config().max_population);
            last = count;
        }
    }
}
