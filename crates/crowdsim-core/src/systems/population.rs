//! Population controller - tops the crowd up to what the context asks for
//!
//! The crowd only ever grows. Switching to a context with a smaller count
//! leaves the surplus in place.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::archetypes::ArchetypeTable;
use crate::components::*;
use crate::config::{PopulationTable, SimConfig};
use crate::registry::EntityRegistry;

/// Spawn bookkeeping that survives between ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationController {
    /// Spawns so far this session, drives the archetype round-robin
    spawn_cursor: usize,
}

impl PopulationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned_total(&self) -> usize {
        self.spawn_cursor
    }

    /// Crowd size the controller aims for, after the hard cap
    pub fn desired(config: &SimConfig, table: &PopulationTable, context: Option<&str>) -> usize {
        let requested = table.desired_for(context);
        if requested > config.max_population {
            log::warn!(
                "Context {:?} asks for {} agents, capping at {}",
                context,
                requested,
                config.max_population
            );
            config.max_population
        } else {
            requested
        }
    }

    /// Spawn agents until the registry reaches the desired count.
    /// Returns the ids spawned this call.
    #[allow(clippy::too_many_arguments)]
    pub fn reconcile<R: Rng + ?Sized>(
        &mut self,
        registry: &mut EntityRegistry,
        config: &SimConfig,
        archetypes: &ArchetypeTable,
        table: &PopulationTable,
        context: Option<&str>,
        now: Millis,
        rng: &mut R,
    ) -> Vec<AgentId> {
        let desired = Self::desired(config, table, context);
        let current = registry.len();
        if current >= desired || archetypes.is_empty() {
            return Vec::new();
        }

        let bounds = config.bounds();
        let mut occupied: Vec<Vec2> = registry.records().iter().map(|r| r.position).collect();
        let mut spawned = Vec::with_capacity(desired - current);

        for _ in current..desired {
            let archetype = archetypes.round_robin(self.spawn_cursor);
            self.spawn_cursor += 1;

            let position = pick_spawn_point(&bounds, &occupied, config, rng);
            let attributes = archetypes
                .get(archetype)
                .map(|spec| spec.roll_attributes(rng))
                .unwrap_or_default();

            let id = registry.spawn(archetype, position, attributes, now);
            log::debug!("Spawned {} (archetype {}) at ({:.0}, {:.0})", id, archetype.0, position.x, position.y);
            occupied.push(position);
            spawned.push(id);
        }

        log::info!(
            "Population {} -> {} for context {:?}",
            current,
            registry.len(),
            context
        );
        spawned
    }
}

/// Random point inside bounds, preferring one away from existing agents.
/// After `spawn_attempts` crowded candidates the last one is taken anyway.
fn pick_spawn_point<R: Rng + ?Sized>(
    bounds: &Bounds,
    occupied: &[Vec2],
    config: &SimConfig,
    rng: &mut R,
) -> Vec2 {
    let spacing_sq = config.spawn_spacing * config.spawn_spacing;
    let mut candidate = bounds.random_point(rng);
    for _ in 1..config.spawn_attempts.max(1) {
        if occupied.iter().all(|p| p.distance_squared(&candidate) >= spacing_sq) {
            return candidate;
        }
        candidate = bounds.random_point(rng);
    }
    candidate
}
