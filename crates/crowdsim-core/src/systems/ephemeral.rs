//! Ephemeral event queue - chat bubbles and effects that expire on their own.
//!
//! Objects are appended and later filtered out, never edited. Pruning keeps
//! exactly the objects with `now - created_at < ttl`, so it is idempotent and
//! the order objects were added in does not matter.

use serde::Serialize;

use crate::components::{
    AgentId, Effect, EffectKind, EphemeralId, Expiring, Message, Millis, Vec2,
};

/// Live and scheduled ephemeral objects (singleton, stored in engine)
#[derive(Debug, Clone, Default, Serialize)]
pub struct EphemeralQueue {
    messages: Vec<Message>,
    effects: Vec<Effect>,
    /// Messages waiting for their due time; `created_at` is the due time
    scheduled: Vec<Message>,
    next_id: u64,
}

impl EphemeralQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> EphemeralId {
        let id = EphemeralId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a live message now.
    pub fn push_message(
        &mut self,
        owner: AgentId,
        text: impl Into<String>,
        now: Millis,
        ttl: Millis,
    ) -> &Message {
        let message = Message {
            id: self.allocate_id(),
            owner,
            text: text.into(),
            created_at: now,
            ttl,
        };
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Queue a message that goes live at `due_at`.
    pub fn schedule_message(
        &mut self,
        owner: AgentId,
        text: impl Into<String>,
        due_at: Millis,
        ttl: Millis,
    ) -> EphemeralId {
        let id = self.allocate_id();
        self.scheduled.push(Message {
            id,
            owner,
            text: text.into(),
            created_at: due_at,
            ttl,
        });
        id
    }

    pub fn push_effect(
        &mut self,
        position: Vec2,
        kind: EffectKind,
        now: Millis,
        ttl: Millis,
    ) -> EphemeralId {
        let id = self.allocate_id();
        self.effects.push(Effect {
            id,
            position,
            kind,
            created_at: now,
            ttl,
        });
        id
    }

    /// Move scheduled messages whose due time has come into the live list.
    ///
    /// A due message goes live only if `keep` accepts it and it has not
    /// already expired; the rest are dropped. Returns the released messages
    /// so callers can forward them.
    pub fn release_due(
        &mut self,
        now: Millis,
        mut keep: impl FnMut(&Message) -> bool,
    ) -> Vec<Message> {
        if self.scheduled.is_empty() {
            return Vec::new();
        }
        let (due, waiting): (Vec<Message>, Vec<Message>) = self
            .scheduled
            .drain(..)
            .partition(|message| message.created_at <= now);
        self.scheduled = waiting;

        let mut released = Vec::with_capacity(due.len());
        for message in due {
            if message.is_expired(now) || !keep(&message) {
                log::debug!("Dropping stale scheduled message {:?}", message.id);
                continue;
            }
            released.push(message);
        }
        self.messages.extend(released.iter().cloned());
        released
    }

    /// Drop every expired message and effect. Returns how many were removed.
    pub fn prune(&mut self, now: Millis) -> usize {
        let before = self.messages.len() + self.effects.len();
        self.messages.retain(|m| !m.is_expired(now));
        self.effects.retain(|e| !e.is_expired(now));
        before - (self.messages.len() + self.effects.len())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    /// Live objects (scheduled messages excluded)
    pub fn live_count(&self) -> usize {
        self.messages.len() + self.effects.len()
    }

    pub fn contains(&self, id: EphemeralId) -> bool {
        self.messages.iter().any(|m| m.id == id) || self.effects.iter().any(|e| e.id == id)
    }

    /// Most recent live message owned by an agent, for bubble placement
    pub fn latest_message_for(&self, owner: AgentId) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.owner == owner)
    }
}
