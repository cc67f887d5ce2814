//! Ephemeral components: chat bubbles and visual effects with a time-to-live.
//!
//! Both are immutable once created. The queue only appends or drops them.

use serde::{Deserialize, Serialize};

use super::{AgentId, Millis, Vec2};

/// Identifier shared by messages and effects (one id space for both)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EphemeralId(pub u64);

/// Common expiry rule for anything with a creation time and a TTL
pub trait Expiring {
    fn created_at(&self) -> Millis;
    fn ttl(&self) -> Millis;

    /// Expired once `now - created_at >= ttl`.
    fn is_expired(&self, now: Millis) -> bool {
        now - self.created_at() >= self.ttl()
    }
}

/// Chat bubble owned by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: EphemeralId,
    pub owner: AgentId,
    pub text: String,
    pub created_at: Millis,
    pub ttl: Millis,
}

impl Expiring for Message {
    fn created_at(&self) -> Millis {
        self.created_at
    }
    fn ttl(&self) -> Millis {
        self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    /// Impact flash during a conflict
    Hit,
    /// Host-triggered sparkle (clicks and the like)
    Spark,
    /// Small burst shown when two agents start chatting
    Heart,
}

/// Positioned visual effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: EphemeralId,
    pub position: Vec2,
    pub kind: EffectKind,
    pub created_at: Millis,
    pub ttl: Millis,
}

impl Expiring for Effect {
    fn created_at(&self) -> Millis {
        self.created_at
    }
    fn ttl(&self) -> Millis {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let message = Message {
            id: EphemeralId(1),
            owner: AgentId(0),
            text: "hi".into(),
            created_at: 1000.0,
            ttl: 3000.0,
        };
        assert!(!message.is_expired(3999.0));
        assert!(message.is_expired(4000.0));
        assert!(message.is_expired(4001.0));
    }
}
