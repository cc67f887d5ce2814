//! Behavior system - per-agent state machine and movement integration
//!
//! Every agent is evaluated against the positions and states recorded at the
//! start of the step, so the result does not depend on iteration order.
//! Engagements are only ever *started* by the interaction director; this
//! system handles wandering, arrival, engagement timeouts, conflict approach
//! and the bounds clamp.

use std::collections::HashMap;

use rand::Rng;

use crate::archetypes::ArchetypeTable;
use crate::components::*;
use crate::config::SimConfig;
use crate::error::Result;
use crate::registry::{AgentMut, AgentRecord, EntityRegistry};

/// Fallback speeds for an agent whose archetype row is missing
const DEFAULT_WALK_SPEED: f32 = 1.5;
const DEFAULT_CHARGE_SPEED: f32 = 2.5;

/// Counters for one behavior pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehaviorOutcome {
    /// Idle agents that picked a destination
    pub departures: usize,
    /// Moving agents that reached their destination
    pub arrivals: usize,
    /// Engaged agents that went back to idle
    pub disengaged: usize,
}

/// Advance every agent by one tick
pub fn behavior_system<R: Rng + ?Sized>(
    registry: &mut EntityRegistry,
    config: &SimConfig,
    archetypes: &ArchetypeTable,
    now: Millis,
    rng: &mut R,
) -> Result<BehaviorOutcome> {
    // Previous-tick view used for all partner lookups
    let previous: HashMap<AgentId, AgentRecord> = registry
        .records()
        .into_iter()
        .map(|record| (record.id, record))
        .collect();

    let mut outcome = BehaviorOutcome::default();
    let ids: Vec<AgentId> = registry.ids().to_vec();

    for id in ids {
        let agent = registry.agent_mut(id)?;
        let (walk_speed, charge_speed) = archetypes
            .get(agent.archetype)
            .map(|spec| (spec.walk_speed, spec.charge_speed))
            .unwrap_or((DEFAULT_WALK_SPEED, DEFAULT_CHARGE_SPEED));

        step_agent(
            agent,
            &previous,
            config,
            walk_speed,
            charge_speed,
            now,
            rng,
            &mut outcome,
        );
    }

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn step_agent<R: Rng + ?Sized>(
    agent: AgentMut<'_>,
    previous: &HashMap<AgentId, AgentRecord>,
    config: &SimConfig,
    walk_speed: f32,
    charge_speed: f32,
    now: Millis,
    rng: &mut R,
    outcome: &mut BehaviorOutcome,
) {
    let bounds = config.bounds();
    let AgentMut {
        id,
        position,
        velocity,
        facing,
        behavior,
        animation,
        ..
    } = agent;

    match behavior.state {
        BehaviorState::Idle => {
            velocity.0 = Vec2::ZERO;
            if behavior.elapsed(now) >= config.min_idle_ms && rng.gen_bool(config.wander_chance) {
                behavior.target = Some(bounds.random_point(rng));
                behavior.transition(BehaviorState::Moving, now);
                outcome.departures += 1;
            }
        }
        BehaviorState::Moving => match behavior.target {
            Some(target) => {
                let target = bounds.clamp(target);
                let arrived = advance_toward(
                    &mut position.0,
                    &mut velocity.0,
                    target,
                    walk_speed,
                    0.0,
                    config.arrival_epsilon,
                );
                if arrived {
                    velocity.0 = Vec2::ZERO;
                    behavior.reset_to_idle(now);
                    outcome.arrivals += 1;
                }
            }
            None => {
                velocity.0 = Vec2::ZERO;
                behavior.reset_to_idle(now);
            }
        },
        BehaviorState::EngagedSocial => {
            velocity.0 = Vec2::ZERO;
            // A partnerless chat (host-initiated) only ends by timeout
            let partner_lost = behavior
                .partner
                .is_some_and(|p| resolve_partner(previous, id, p, behavior.state).is_none());
            if partner_lost || behavior.elapsed(now) >= config.social_dwell_ms {
                if partner_lost {
                    log::debug!("{} lost its chat partner", id);
                }
                behavior.reset_to_idle(now);
                outcome.disengaged += 1;
            }
        }
        BehaviorState::EngagedConflict => {
            let partner = behavior
                .partner
                .and_then(|p| resolve_partner(previous, id, p, behavior.state));
            match partner {
                None => {
                    log::debug!("{} lost its conflict partner", id);
                    velocity.0 = Vec2::ZERO;
                    behavior.reset_to_idle(now);
                    outcome.disengaged += 1;
                }
                Some(_) if behavior.elapsed(now) >= config.conflict_dwell_ms => {
                    velocity.0 = Vec2::ZERO;
                    behavior.reset_to_idle(now);
                    outcome.disengaged += 1;
                }
                Some(other) => {
                    let distance = position.0.distance(&other.position);
                    if distance > config.engagement_range {
                        // Both partners close in, so each covers half the gap
                        let standoff =
                            config.engagement_range + (distance - config.engagement_range) * 0.5;
                        behavior.target = Some(other.position);
                        advance_toward(
                            &mut position.0,
                            &mut velocity.0,
                            other.position,
                            charge_speed,
                            standoff,
                            0.0,
                        );
                    } else {
                        behavior.target = None;
                        velocity.0 = Vec2::ZERO;
                    }
                }
            }
        }
    }

    position.0 = bounds.clamp(position.0);
    if let Some(direction) = Direction::from_velocity(velocity.0) {
        facing.0 = direction;
    }
    animation.advance();
}

/// Move `position` toward `target` by at most `speed`, stopping `standoff`
/// short of it. Writes the applied displacement into `velocity` and returns
/// whether the remaining distance is below `arrival_epsilon`.
fn advance_toward(
    position: &mut Vec2,
    velocity: &mut Vec2,
    target: Vec2,
    speed: f32,
    standoff: f32,
    arrival_epsilon: f32,
) -> bool {
    let remaining = position.distance(&target);
    if remaining < arrival_epsilon {
        *velocity = Vec2::ZERO;
        return true;
    }

    let step = speed.min((remaining - standoff).max(0.0));
    let displacement = (target - *position).normalize() * step;
    *position = *position + displacement;
    *velocity = displacement;

    position.distance(&target) < arrival_epsilon
}

/// The partner's previous-tick record, if the partnership is still mutual and
/// both sides are in the same engaged state.
fn resolve_partner(
    previous: &HashMap<AgentId, AgentRecord>,
    me: AgentId,
    partner: AgentId,
    state: BehaviorState,
) -> Option<AgentRecord> {
    previous
        .get(&partner)
        .filter(|other| other.behavior.partner == Some(me) && other.behavior.state == state)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn open_field() -> SimConfig {
        SimConfig {
            width: 400.0,
            height: 400.0,
            margin: 0.0,
            wander_chance: 0.0,
            ..SimConfig::default()
        }
    }

    fn walker_table(speed: f32) -> ArchetypeTable {
        ArchetypeTable::new(vec![
            crate::archetypes::ArchetypeSpec::new("Walker", "walker", "grey").with_speeds(speed, 3.0)
        ])
        .unwrap()
    }

    #[test]
    fn test_moving_agent_arrives_and_stops() {
        let config = open_field();
        let table = walker_table(1.5);
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(1);
        let id = registry.spawn(ArchetypeRef(0), Vec2::ZERO, Attributes::default(), 0.0);
        {
            let agent = registry.agent_mut(id).unwrap();
            agent.behavior.target = Some(Vec2::new(100.0, 0.0));
            agent.behavior.transition(BehaviorState::Moving, 0.0);
        }

        let mut ticks = 0;
        while registry.record(id).unwrap().behavior.state == BehaviorState::Moving {
            behavior_system(&mut registry, &config, &table, ticks as f64 * 16.0, &mut rng).unwrap();
            ticks += 1;
            assert!(ticks < 200, "never arrived");
        }

        let record = registry.record(id).unwrap();
        assert_eq!(record.behavior.state, BehaviorState::Idle);
        assert_eq!(record.velocity, Vec2::ZERO);
        assert!(record.behavior.target.is_none());
        assert!(record.position.distance(&Vec2::new(100.0, 0.0)) < config.arrival_epsilon);
        assert_eq!(record.facing, Direction::East);
        // 90 units at 1.5 per tick
        assert_eq!(ticks, 61);
    }

    #[test]
    fn test_idle_waits_for_dwell_before_wandering() {
        let config = SimConfig {
            wander_chance: 1.0,
            min_idle_ms: 1000.0,
            ..SimConfig::default()
        };
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(2);
        let id = registry.spawn(ArchetypeRef(0), Vec2::new(100.0, 100.0), Attributes::default(), 0.0);

        behavior_system(&mut registry, &config, &table, 500.0, &mut rng).unwrap();
        assert_eq!(registry.record(id).unwrap().behavior.state, BehaviorState::Idle);

        let outcome = behavior_system(&mut registry, &config, &table, 1000.0, &mut rng).unwrap();
        let record = registry.record(id).unwrap();
        assert_eq!(outcome.departures, 1);
        assert_eq!(record.behavior.state, BehaviorState::Moving);
        assert!(config.bounds().contains(&record.behavior.target.unwrap()));
    }

    #[test]
    fn test_positions_clamped_every_tick() {
        let config = SimConfig::default();
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        let id = registry.spawn(ArchetypeRef(0), Vec2::new(-50.0, 9999.0), Attributes::default(), 0.0);

        behavior_system(&mut registry, &config, &table, 0.0, &mut rng).unwrap();

        let record = registry.record(id).unwrap();
        assert!(config.bounds().contains(&record.position));
    }

    fn engage_pair(
        registry: &mut EntityRegistry,
        a: AgentId,
        b: AgentId,
        state: BehaviorState,
        now: Millis,
    ) {
        for (me, other) in [(a, b), (b, a)] {
            let agent = registry.agent_mut(me).unwrap();
            agent.behavior.transition(state, now);
            agent.behavior.partner = Some(other);
        }
    }

    #[test]
    fn test_social_ends_after_dwell_for_both() {
        let config = SimConfig::default();
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(4);
        let a = registry.spawn(ArchetypeRef(0), Vec2::new(100.0, 100.0), Attributes::default(), 0.0);
        let b = registry.spawn(ArchetypeRef(1), Vec2::new(150.0, 100.0), Attributes::default(), 0.0);
        engage_pair(&mut registry, a, b, BehaviorState::EngagedSocial, 0.0);

        behavior_system(&mut registry, &config, &table, config.social_dwell_ms - 1.0, &mut rng)
            .unwrap();
        assert_eq!(registry.record(a).unwrap().behavior.state, BehaviorState::EngagedSocial);
        assert_eq!(registry.record(b).unwrap().behavior.partner, Some(a));

        let outcome =
            behavior_system(&mut registry, &config, &table, config.social_dwell_ms, &mut rng)
                .unwrap();
        assert_eq!(outcome.disengaged, 2);
        for id in [a, b] {
            let record = registry.record(id).unwrap();
            assert_eq!(record.behavior.state, BehaviorState::Idle);
            assert!(record.behavior.partner.is_none());
        }
    }

    #[test]
    fn test_conflict_partner_vanishing_forces_idle() {
        let config = SimConfig::default();
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(5);
        let a = registry.spawn(ArchetypeRef(0), Vec2::new(100.0, 100.0), Attributes::default(), 0.0);
        let b = registry.spawn(ArchetypeRef(1), Vec2::new(120.0, 100.0), Attributes::default(), 0.0);
        engage_pair(&mut registry, a, b, BehaviorState::EngagedConflict, 0.0);

        registry.remove(b).unwrap();
        behavior_system(&mut registry, &config, &table, 16.0, &mut rng).unwrap();

        let record = registry.record(a).unwrap();
        assert_eq!(record.behavior.state, BehaviorState::Idle);
        assert!(record.behavior.partner.is_none());
    }

    #[test]
    fn test_social_partner_vanishing_forces_idle() {
        let config = SimConfig::default();
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(8);
        let a = registry.spawn(ArchetypeRef(0), Vec2::new(100.0, 100.0), Attributes::default(), 0.0);
        let b = registry.spawn(ArchetypeRef(1), Vec2::new(150.0, 100.0), Attributes::default(), 0.0);
        let c = registry.spawn(ArchetypeRef(2), Vec2::new(300.0, 100.0), Attributes::default(), 0.0);
        let d = registry.spawn(ArchetypeRef(3), Vec2::new(350.0, 100.0), Attributes::default(), 0.0);
        engage_pair(&mut registry, a, b, BehaviorState::EngagedSocial, 0.0);
        engage_pair(&mut registry, c, d, BehaviorState::EngagedSocial, 0.0);

        // One partner is overridden back to idle, the other is gone entirely
        registry.agent_mut(b).unwrap().behavior.reset_to_idle(0.0);
        registry.remove(d).unwrap();

        let outcome = behavior_system(&mut registry, &config, &table, 16.0, &mut rng).unwrap();
        assert_eq!(outcome.disengaged, 2);
        for id in [a, c] {
            let record = registry.record(id).unwrap();
            assert_eq!(record.behavior.state, BehaviorState::Idle);
            assert!(record.behavior.partner.is_none());
        }
    }

    #[test]
    fn test_conflict_ends_after_dwell_for_both() {
        let config = SimConfig {
            conflict_dwell_ms: 2000.0,
            ..SimConfig::default()
        };
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(9);
        let a = registry.spawn(ArchetypeRef(0), Vec2::new(100.0, 100.0), Attributes::default(), 0.0);
        let b = registry.spawn(ArchetypeRef(1), Vec2::new(120.0, 100.0), Attributes::default(), 0.0);
        engage_pair(&mut registry, a, b, BehaviorState::EngagedConflict, 0.0);

        behavior_system(&mut registry, &config, &table, 1999.0, &mut rng).unwrap();
        assert_eq!(registry.record(a).unwrap().behavior.state, BehaviorState::EngagedConflict);
        assert_eq!(registry.record(b).unwrap().behavior.partner, Some(a));

        let outcome = behavior_system(&mut registry, &config, &table, 2000.0, &mut rng).unwrap();
        assert_eq!(outcome.disengaged, 2);
        for id in [a, b] {
            let record = registry.record(id).unwrap();
            assert_eq!(record.behavior.state, BehaviorState::Idle);
            assert!(record.behavior.partner.is_none());
            assert_eq!(record.velocity, Vec2::ZERO);
        }
    }

    #[test]
    fn test_conflict_partners_close_the_gap() {
        let config = SimConfig::default();
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(6);
        let a = registry.spawn(ArchetypeRef(2), Vec2::new(100.0, 200.0), Attributes::default(), 0.0);
        let b = registry.spawn(ArchetypeRef(2), Vec2::new(220.0, 200.0), Attributes::default(), 0.0);
        engage_pair(&mut registry, a, b, BehaviorState::EngagedConflict, 0.0);

        let start = 120.0;
        behavior_system(&mut registry, &config, &table, 16.0, &mut rng).unwrap();

        let ra = registry.record(a).unwrap();
        let rb = registry.record(b).unwrap();
        assert!(ra.position.distance(&rb.position) < start);
        assert_eq!(ra.facing, Direction::East);
        assert_eq!(rb.facing, Direction::West);
        assert_eq!(ra.behavior.state, BehaviorState::EngagedConflict);

        for tick in 2..200 {
            behavior_system(&mut registry, &config, &table, tick as f64 * 16.0, &mut rng).unwrap();
        }
        let ra = registry.record(a).unwrap();
        let rb = registry.record(b).unwrap();
        let gap = ra.position.distance(&rb.position);
        assert!((gap - config.engagement_range).abs() < 0.01, "gap {gap}");
        assert!(ra.velocity.length() < 0.01);
    }

    #[test]
    fn test_animation_phase_advances_every_tick() {
        let config = SimConfig::default();
        let table = ArchetypeTable::builtin();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(7);
        let id = registry.spawn(ArchetypeRef(0), Vec2::new(100.0, 100.0), Attributes::default(), 0.0);

        for tick in 0..5 {
            behavior_system(&mut registry, &config, &table, tick as f64 * 16.0, &mut rng).unwrap();
        }
        assert_eq!(registry.record(id).unwrap().animation_phase, 5);
    }
}
