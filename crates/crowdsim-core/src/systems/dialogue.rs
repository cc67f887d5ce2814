//! Dialogue generation - picks lines from archetype phrase tables
//!
//! Also defines the narration sink messages are forwarded to. The sink is
//! fire-and-forget: the engine never waits on it or looks at what it did.

use std::sync::mpsc::Sender;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::archetypes::ArchetypeSpec;
use crate::components::{AgentId, EphemeralId};

/// Which phrase table a line is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhrasePool {
    Greeting,
    Chatter,
    Taunt,
}

/// Pick a line for `speaker`, filling `{self}` and `{partner}` placeholders
pub fn generate_line<R: Rng + ?Sized>(
    speaker: &ArchetypeSpec,
    partner: Option<&ArchetypeSpec>,
    pool: PhrasePool,
    rng: &mut R,
) -> String {
    let lines = match pool {
        PhrasePool::Greeting => &speaker.greetings,
        PhrasePool::Chatter => &speaker.chatter,
        PhrasePool::Taunt => &speaker.taunts,
    };

    let template = if lines.is_empty() {
        fallback_line(pool)
    } else {
        lines[rng.gen_range(0..lines.len())].as_str()
    };

    fill_template(template, speaker, partner)
}

fn fallback_line(pool: PhrasePool) -> &'static str {
    match pool {
        PhrasePool::Greeting => "Hello!",
        PhrasePool::Chatter => "Nice day, isn't it?",
        PhrasePool::Taunt => "Hey, watch it!",
    }
}

fn fill_template(template: &str, speaker: &ArchetypeSpec, partner: Option<&ArchetypeSpec>) -> String {
    let partner_name = partner.map(|p| p.name.as_str()).unwrap_or("friend");
    template
        .replace("{self}", &speaker.name)
        .replace("{partner}", partner_name)
}

/// A line handed to the narration collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub message_id: EphemeralId,
    pub speaker: AgentId,
    pub archetype: String,
    pub text: String,
}

/// Receiver for spoken lines (voice synthesis, captions, logs...)
pub trait DialogueSink {
    fn speak(&mut self, utterance: &Utterance);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DialogueSink for NullSink {
    fn speak(&mut self, _utterance: &Utterance) {}
}

/// Forwards utterances over a channel; a dropped receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Utterance>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Utterance>) -> Self {
        Self { sender }
    }
}

impl DialogueSink for ChannelSink {
    fn speak(&mut self, utterance: &Utterance) {
        let _ = self.sender.send(utterance.clone());
    }
}
