//! Agent components: identity, kinematics, behavior state and attributes.

use serde::{Deserialize, Serialize};

use super::{Direction, Millis, Vec2};

/// Stable agent identifier. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Index into the engine's archetype table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchetypeRef(pub usize);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vec2);

/// Per-tick displacement the agent applied last tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity(pub Vec2);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facing(pub Direction);

/// Animation frame counter, bumped once per tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Animation {
    pub phase: u64,
}

impl Animation {
    pub fn advance(&mut self) {
        self.phase = self.phase.wrapping_add(1);
    }
}

/// Archetype-specific scalars carried for the renderer. The core never reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub vitality: f32,
    pub focus: f32,
}

/// The four behavior states an agent can be in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorState {
    #[default]
    Idle,
    Moving,
    EngagedSocial,
    EngagedConflict,
}

impl BehaviorState {
    pub fn all() -> &'static [BehaviorState] {
        &[
            BehaviorState::Idle,
            BehaviorState::Moving,
            BehaviorState::EngagedSocial,
            BehaviorState::EngagedConflict,
        ]
    }

    pub fn is_engaged(self) -> bool {
        matches!(
            self,
            BehaviorState::EngagedSocial | BehaviorState::EngagedConflict
        )
    }

    /// Transition table. Staying in the same state is always allowed.
    ///
    /// | from \ to        | Idle | Moving | Social | Conflict |
    /// |------------------|------|--------|--------|----------|
    /// | Idle             |  ✓   |   ✓    |   ✓    |    ✓     |
    /// | Moving           |  ✓   |   ✓    |   ✓    |    ✓     |
    /// | EngagedSocial    |  ✓   |        |   ✓    |          |
    /// | EngagedConflict  |  ✓   |        |        |    ✓     |
    pub fn can_transition_to(self, next: BehaviorState) -> bool {
        use BehaviorState::*;
        if self == next || next == Idle {
            return true;
        }
        match self {
            Idle => true,
            Moving => next.is_engaged(),
            EngagedSocial | EngagedConflict => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BehaviorState::Idle => "idle",
            BehaviorState::Moving => "moving",
            BehaviorState::EngagedSocial => "social",
            BehaviorState::EngagedConflict => "conflict",
        }
    }
}

/// Behavior component: current state plus the data the state machine needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    pub state: BehaviorState,
    /// State before the last transition
    pub previous: BehaviorState,
    /// Host time of the last state change
    pub since: Millis,
    pub target: Option<Vec2>,
    pub partner: Option<AgentId>,
}

impl Behavior {
    pub fn idle_since(now: Millis) -> Self {
        Self {
            since: now,
            ..Self::default()
        }
    }

    /// Move to `next` if the transition table allows it. Returns false and
    /// leaves the behavior untouched otherwise.
    pub fn transition(&mut self, next: BehaviorState, now: Millis) -> bool {
        if !self.state.can_transition_to(next) {
            debug_assert!(false, "illegal transition {:?} -> {:?}", self.state, next);
            log::warn!("Rejected transition {:?} -> {:?}", self.state, next);
            return false;
        }
        self.previous = self.state;
        self.state = next;
        self.since = now;
        true
    }

    /// Drop back to idle, clearing target and partner.
    pub fn reset_to_idle(&mut self, now: Millis) {
        self.transition(BehaviorState::Idle, now);
        self.target = None;
        self.partner = None;
    }

    pub fn elapsed(&self, now: Millis) -> Millis {
        now - self.since
    }
}
