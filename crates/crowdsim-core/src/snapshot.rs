//! Read-only view of the world handed to the renderer after each tick

use serde::Serialize;

use crate::archetypes::{Appearance, ArchetypeTable};
use crate::components::*;
use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::systems::EphemeralQueue;

/// Everything the renderer needs to draw one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub id: AgentId,
    pub archetype: String,
    pub appearance: Option<Appearance>,
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: Direction,
    pub state: BehaviorState,
    pub animation_phase: u64,
    pub partner: Option<AgentId>,
    pub attributes: Attributes,
}

/// Agents plus live messages and effects at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub now: Millis,
    pub agents: Vec<AgentView>,
    pub messages: Vec<Message>,
    pub effects: Vec<Effect>,
}

impl WorldSnapshot {
    pub fn capture(
        registry: &EntityRegistry,
        queue: &EphemeralQueue,
        archetypes: &ArchetypeTable,
        now: Millis,
    ) -> Self {
        let agents = registry
            .records()
            .into_iter()
            .map(|record| {
                let spec = archetypes.get(record.archetype);
                AgentView {
                    id: record.id,
                    archetype: spec.map(|s| s.name.clone()).unwrap_or_default(),
                    appearance: spec.map(|s| s.appearance.clone()),
                    position: record.position,
                    velocity: record.velocity,
                    facing: record.facing,
                    state: record.behavior.state,
                    animation_phase: record.animation_phase,
                    partner: record.behavior.partner,
                    attributes: record.attributes,
                }
            })
            .collect();

        Self {
            now,
            agents,
            messages: queue.messages().to_vec(),
            effects: queue.effects().to_vec(),
        }
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentView> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Host-side drawing surface
pub trait RenderTarget {
    /// False while the surface is not mounted yet; the frame is skipped.
    fn is_ready(&self) -> bool;
    fn draw(&mut self, snapshot: &WorldSnapshot);
}

/// Target for headless runs: always ready, draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl RenderTarget for Headless {
    fn is_ready(&self) -> bool {
        true
    }

    fn draw(&mut self, _snapshot: &WorldSnapshot) {}
}
