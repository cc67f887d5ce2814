//! Entity registry - owns the agent arena and the stable-id index into it.
//!
//! Agents live in a `hecs::World`; `AgentId` is the handle everything else
//! uses. The id map gives O(1) lookup and the spawn-order list gives systems
//! a deterministic iteration order.

use std::collections::HashMap;

use hecs::{Entity, World};

use crate::components::*;
use crate::error::{Result, SimError};

/// Copied view of one agent, detached from the world borrow
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentRecord {
    pub id: AgentId,
    pub archetype: ArchetypeRef,
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: Direction,
    pub behavior: Behavior,
    pub animation_phase: u64,
    pub attributes: Attributes,
}

/// Mutable access to one agent's simulation components
pub struct AgentMut<'a> {
    pub id: AgentId,
    pub archetype: ArchetypeRef,
    pub position: &'a mut Position,
    pub velocity: &'a mut Velocity,
    pub facing: &'a mut Facing,
    pub behavior: &'a mut Behavior,
    pub animation: &'a mut Animation,
}

#[derive(Default)]
pub struct EntityRegistry {
    world: World,
    index: HashMap<AgentId, Entity>,
    order: Vec<AgentId>,
    next_id: u32,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an idle agent and return its id.
    pub fn spawn(
        &mut self,
        archetype: ArchetypeRef,
        position: Vec2,
        attributes: Attributes,
        now: Millis,
    ) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;

        let entity = self.world.spawn((
            id,
            archetype,
            Position(position),
            Velocity::default(),
            Facing::default(),
            Behavior::idle_since(now),
            Animation::default(),
            attributes,
        ));

        self.index.insert(id, entity);
        self.order.push(id);
        id
    }

    /// Remove an agent. The engine never calls this on its own.
    pub fn remove(&mut self, id: AgentId) -> Result<()> {
        let entity = self.index.remove(&id).ok_or(SimError::UnknownAgent(id))?;
        self.order.retain(|other| *other != id);
        self.world
            .despawn(entity)
            .map_err(|_| SimError::RegistryCorrupted(id))
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Agent ids in spawn order
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn record(&self, id: AgentId) -> Option<AgentRecord> {
        let entity = *self.index.get(&id)?;
        let agent = self.world.entity(entity).ok()?;
        let record = AgentRecord {
            id,
            archetype: *agent.get::<&ArchetypeRef>()?,
            position: agent.get::<&Position>()?.0,
            velocity: agent.get::<&Velocity>()?.0,
            facing: agent.get::<&Facing>()?.0,
            behavior: *agent.get::<&Behavior>()?,
            animation_phase: agent.get::<&Animation>()?.phase,
            attributes: *agent.get::<&Attributes>()?,
        };
        Some(record)
    }

    /// Records for every agent in spawn order.
    pub fn records(&self) -> Vec<AgentRecord> {
        self.order.iter().filter_map(|id| self.record(*id)).collect()
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Result<AgentMut<'_>> {
        let entity = *self.index.get(&id).ok_or(SimError::UnknownAgent(id))?;
        let (archetype, position, velocity, facing, behavior, animation) = self
            .world
            .query_one_mut::<(
                &ArchetypeRef,
                &mut Position,
                &mut Velocity,
                &mut Facing,
                &mut Behavior,
                &mut Animation,
            )>(entity)
            .map_err(|_| SimError::RegistryCorrupted(id))?;

        Ok(AgentMut {
            id,
            archetype: *archetype,
            position,
            velocity,
            facing,
            behavior,
            animation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_at(registry: &mut EntityRegistry, x: f32, y: f32) -> AgentId {
        registry.spawn(ArchetypeRef(0), Vec2::new(x, y), Attributes::default(), 0.0)
    }

    #[test]
    fn test_spawn_assigns_sequential_ids() {
        let mut registry = EntityRegistry::new();
        let a = spawn_at(&mut registry, 1.0, 1.0);
        let b = spawn_at(&mut registry, 2.0, 2.0);

        assert_eq!(a, AgentId(0));
        assert_eq!(b, AgentId(1));
        assert_eq!(registry.ids(), &[a, b]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_record_reflects_components() {
        let mut registry = EntityRegistry::new();
        let id = spawn_at(&mut registry, 5.0, 6.0);

        let record = registry.record(id).unwrap();
        assert_eq!(record.position, Vec2::new(5.0, 6.0));
        assert_eq!(record.behavior.state, BehaviorState::Idle);
        assert_eq!(record.animation_phase, 0);
    }

    #[test]
    fn test_agent_mut_writes_through() {
        let mut registry = EntityRegistry::new();
        let id = spawn_at(&mut registry, 5.0, 6.0);

        {
            let agent = registry.agent_mut(id).unwrap();
            agent.position.0 = Vec2::new(9.0, 9.0);
            agent.animation.advance();
        }

        let record = registry.record(id).unwrap();
        assert_eq!(record.position, Vec2::new(9.0, 9.0));
        assert_eq!(record.animation_phase, 1);
    }

    #[test]
    fn test_remove_keeps_ids_stable() {
        let mut registry = EntityRegistry::new();
        let a = spawn_at(&mut registry, 1.0, 1.0);
        let b = spawn_at(&mut registry, 2.0, 2.0);

        registry.remove(a).unwrap();
        assert!(!registry.contains(a));
        assert!(registry.record(b).is_some());
        assert!(matches!(registry.remove(a), Err(SimError::UnknownAgent(_))));

        // Ids are never reused
        let c = spawn_at(&mut registry, 3.0, 3.0);
        assert_eq!(c, AgentId(2));
    }
}
