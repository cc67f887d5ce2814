//! Interaction director - starts chats and scuffles between nearby agents
//!
//! Runs after the behavior system, on the positions it just produced. Each
//! free pair inside the interaction radius gets one independent roll per
//! tick; ongoing conflicts roll for hits while the partners are in range.

use std::collections::HashSet;

use rand::Rng;

use crate::archetypes::{ArchetypeSpec, ArchetypeTable};
use crate::components::*;
use crate::config::SimConfig;
use crate::error::Result;
use crate::registry::{AgentRecord, EntityRegistry};

use super::dialogue::{generate_line, PhrasePool};
use super::ephemeral::EphemeralQueue;
use super::proximity::find_proximate_pairs;

/// What the director did this tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionOutcome {
    pub social_started: usize,
    pub conflict_started: usize,
    pub hits: usize,
    pub effects: usize,
    /// Messages that went live this tick (scheduled replies excluded)
    pub messages: Vec<Message>,
}

/// Roll for new engagements and ongoing conflict hits
pub fn interaction_system<R: Rng + ?Sized>(
    registry: &mut EntityRegistry,
    queue: &mut EphemeralQueue,
    config: &SimConfig,
    archetypes: &ArchetypeTable,
    now: Millis,
    rng: &mut R,
) -> Result<InteractionOutcome> {
    let records = registry.records();
    let mut outcome = InteractionOutcome::default();
    let mut engaged_now: HashSet<AgentId> = HashSet::new();

    for pair in find_proximate_pairs(&records, config.interaction_radius) {
        if engaged_now.contains(&pair.first) || engaged_now.contains(&pair.second) {
            continue;
        }
        if !rng.gen_bool(config.trigger_chance) {
            continue;
        }

        let state = if rng.gen_bool(config.conflict_chance) {
            BehaviorState::EngagedConflict
        } else {
            BehaviorState::EngagedSocial
        };
        start_engagement(registry, pair.first, pair.second, state, now)?;
        engaged_now.insert(pair.first);
        engaged_now.insert(pair.second);

        let (Some(first), Some(second)) = (
            find_record(&records, pair.first),
            find_record(&records, pair.second),
        ) else {
            continue;
        };

        if state == BehaviorState::EngagedSocial {
            log::debug!("{} and {} started chatting", pair.first, pair.second);
            outcome.social_started += 1;
            open_chat(queue, config, archetypes, first, second, now, rng, &mut outcome);
        } else {
            log::debug!("{} and {} started a conflict", pair.first, pair.second);
            outcome.conflict_started += 1;
        }
    }

    // Ongoing conflicts, each pair handled once from its lower id
    for record in &records {
        if record.behavior.state != BehaviorState::EngagedConflict
            || engaged_now.contains(&record.id)
        {
            continue;
        }
        let Some(partner_id) = record.behavior.partner else {
            continue;
        };
        if partner_id < record.id {
            continue;
        }
        let Some(partner) = find_record(&records, partner_id) else {
            continue;
        };
        let mutual = partner.behavior.partner == Some(record.id)
            && partner.behavior.state == BehaviorState::EngagedConflict;
        if !mutual || record.position.distance(&partner.position) > config.engagement_range {
            continue;
        }
        if rng.gen_bool(config.hit_chance) {
            exchange_blow(queue, config, archetypes, record, partner, now, rng, &mut outcome);
        }
    }

    Ok(outcome)
}

/// Host-initiated interaction with one agent.
///
/// An agent in a conflict is pulled out of it. Anyone else is put into a
/// partnerless chat and greets the user. Returns the greeting, if any.
pub fn manual_interact<R: Rng + ?Sized>(
    registry: &mut EntityRegistry,
    queue: &mut EphemeralQueue,
    config: &SimConfig,
    archetypes: &ArchetypeTable,
    id: AgentId,
    now: Millis,
    rng: &mut R,
) -> Result<Option<Message>> {
    let agent = registry.agent_mut(id)?;
    agent.velocity.0 = Vec2::ZERO;

    if agent.behavior.state == BehaviorState::EngagedConflict {
        agent.behavior.reset_to_idle(now);
        log::debug!("{} pulled out of a conflict by the host", id);
        return Ok(None);
    }

    agent.behavior.transition(BehaviorState::EngagedSocial, now);
    agent.behavior.partner = None;
    agent.behavior.target = None;
    let archetype = agent.archetype;

    let text = match archetypes.get(archetype) {
        Some(spec) => generate_line(spec, None, PhrasePool::Greeting, rng),
        None => "Hello!".to_string(),
    };
    log::debug!("{} greets the host: {}", id, text);
    let message = queue.push_message(id, text, now, config.message_ttl_ms).clone();
    Ok(Some(message))
}

fn start_engagement(
    registry: &mut EntityRegistry,
    a: AgentId,
    b: AgentId,
    state: BehaviorState,
    now: Millis,
) -> Result<()> {
    for (me, other) in [(a, b), (b, a)] {
        let agent = registry.agent_mut(me)?;
        agent.behavior.transition(state, now);
        agent.behavior.partner = Some(other);
        agent.behavior.target = None;
        agent.velocity.0 = Vec2::ZERO;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn open_chat<R: Rng + ?Sized>(
    queue: &mut EphemeralQueue,
    config: &SimConfig,
    archetypes: &ArchetypeTable,
    first: &AgentRecord,
    second: &AgentRecord,
    now: Millis,
    rng: &mut R,
    outcome: &mut InteractionOutcome,
) {
    let first_spec = archetypes.get(first.archetype);
    let second_spec = archetypes.get(second.archetype);

    let opener = line_for(first_spec, second_spec, PhrasePool::Chatter, rng);
    let reply = line_for(second_spec, first_spec, PhrasePool::Chatter, rng);

    let message = queue
        .push_message(first.id, opener, now, config.message_ttl_ms)
        .clone();
    outcome.messages.push(message);
    queue.schedule_message(
        second.id,
        reply,
        now + config.reply_delay_ms,
        config.message_ttl_ms,
    );

    queue.push_effect(
        first.position.midpoint(&second.position),
        EffectKind::Heart,
        now,
        config.effect_ttl_ms,
    );
    outcome.effects += 1;
}

#[allow(clippy::too_many_arguments)]
fn exchange_blow<R: Rng + ?Sized>(
    queue: &mut EphemeralQueue,
    config: &SimConfig,
    archetypes: &ArchetypeTable,
    a: &AgentRecord,
    b: &AgentRecord,
    now: Millis,
    rng: &mut R,
    outcome: &mut InteractionOutcome,
) {
    let (attacker, defender) = if rng.gen_bool(0.5) { (a, b) } else { (b, a) };

    queue.push_effect(defender.position, EffectKind::Hit, now, config.effect_ttl_ms);
    outcome.effects += 1;
    outcome.hits += 1;

    let taunt = line_for(
        archetypes.get(attacker.archetype),
        archetypes.get(defender.archetype),
        PhrasePool::Taunt,
        rng,
    );
    let message = queue
        .push_message(attacker.id, taunt, now, config.message_ttl_ms)
        .clone();
    outcome.messages.push(message);
}

fn line_for<R: Rng + ?Sized>(
    speaker: Option<&ArchetypeSpec>,
    partner: Option<&ArchetypeSpec>,
    pool: PhrasePool,
    rng: &mut R,
) -> String {
    match speaker {
        Some(spec) => generate_line(spec, partner, pool, rng),
        None => "...".to_string(),
    }
}

fn find_record(records: &[AgentRecord], id: AgentId) -> Option<&AgentRecord> {
    records.iter().find(|r| r.id == id)
}
