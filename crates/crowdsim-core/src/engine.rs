//! Simulation engine - main entry point for running the crowd
//!
//! Owns every piece of simulation state and runs one tick in a fixed order:
//! queued host commands, behavior, interactions, ephemeral queue, population.
//! Lines for the dialogue sink are spoken after the last step.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;

use crate::archetypes::ArchetypeTable;
use crate::clock::{ClockDecision, ClockHandle, SimulationClock};
use crate::components::*;
use crate::config::{EngineSetup, PopulationTable, SimConfig};
use crate::error::{Result, SimError};
use crate::registry::{AgentRecord, EntityRegistry};
use crate::snapshot::{RenderTarget, WorldSnapshot};
use crate::systems::*;

/// Host request applied at the start of the next tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManualCommand {
    Interact(AgentId),
    Effect { position: Vec2, kind: EffectKind },
}

/// Counts for a single tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub now: Millis,
    pub manual_applied: usize,
    pub manual_dropped: usize,
    pub departures: usize,
    pub arrivals: usize,
    pub disengaged: usize,
    pub social_started: usize,
    pub conflict_started: usize,
    pub hits: usize,
    pub messages_emitted: usize,
    pub effects_emitted: usize,
    pub expired: usize,
    pub spawned: Vec<AgentId>,
}

/// Running totals since the engine was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub ticks: u64,
    pub frames_skipped: u64,
    pub frames_not_ready: u64,
    pub frames_halted: u64,
    pub tick_failures: u64,
    pub social_started: u64,
    pub conflict_started: u64,
    pub messages_emitted: u64,
    pub effects_emitted: u64,
    pub agents_spawned: u64,
}

impl EngineStats {
    fn absorb(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.social_started += report.social_started as u64;
        self.conflict_started += report.conflict_started as u64;
        self.messages_emitted += report.messages_emitted as u64;
        self.effects_emitted += report.effects_emitted as u64;
        self.agents_spawned += report.spawned.len() as u64;
    }
}

/// What happened to one host frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Render target not mounted; nothing ran and the clock did not move
    NotReady,
    Halted,
    /// Too soon after the previous tick
    Skipped,
    Ticked(TickReport),
    /// The tick failed; the error was logged and the clock moved on
    Failed(String),
}

/// Main simulation engine
pub struct SimulationEngine {
    registry: EntityRegistry,
    queue: EphemeralQueue,
    config: SimConfig,
    archetypes: ArchetypeTable,
    population: PopulationTable,
    controller: PopulationController,
    context: Option<String>,
    pending: VecDeque<ManualCommand>,
    clock: SimulationClock,
    stats: EngineStats,
    rng: Box<dyn RngCore>,
    sink: Box<dyn DialogueSink>,
}

impl SimulationEngine {
    /// Create an engine from a validated setup, seeding its random source.
    pub fn new(setup: EngineSetup, seed: u64) -> Result<Self> {
        Self::with_rng(setup, Box::new(StdRng::seed_from_u64(seed)))
    }

    /// Create an engine that draws from a caller-supplied random source.
    pub fn with_rng(setup: EngineSetup, rng: Box<dyn RngCore>) -> Result<Self> {
        setup.validate()?;
        log::info!(
            "Engine created: {}x{} field, {} archetypes",
            setup.config.width,
            setup.config.height,
            setup.archetypes.len()
        );
        Ok(Self::assemble(setup, rng))
    }

    /// Engine with the built-in configuration
    pub fn with_defaults(seed: u64) -> Self {
        Self::assemble(EngineSetup::default(), Box::new(StdRng::seed_from_u64(seed)))
    }

    fn assemble(setup: EngineSetup, rng: Box<dyn RngCore>) -> Self {
        let EngineSetup {
            config,
            archetypes,
            population,
        } = setup;

        Self {
            registry: EntityRegistry::new(),
            queue: EphemeralQueue::new(),
            clock: SimulationClock::new(config.tick_interval_ms),
            config,
            archetypes,
            population,
            controller: PopulationController::new(),
            context: None,
            pending: VecDeque::new(),
            stats: EngineStats::default(),
            rng,
            sink: Box::new(NullSink),
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn DialogueSink>) {
        self.sink = sink;
    }

    /// Update the context signal. Read at the next population check.
    pub fn set_context(&mut self, context: Option<&str>) {
        self.context = context.map(str::to_string);
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Queue a manual interaction with an agent for the next tick.
    pub fn interact(&mut self, id: AgentId) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(SimError::UnknownAgent(id));
        }
        log::debug!("Queued manual interaction with {}", id);
        self.pending.push_back(ManualCommand::Interact(id));
        Ok(())
    }

    /// Queue a host-initiated effect for the next tick.
    pub fn trigger_effect(&mut self, position: Vec2, kind: EffectKind) {
        log::debug!("Queued {:?} effect at ({:.0}, {:.0})", kind, position.x, position.y);
        self.pending.push_back(ManualCommand::Effect { position, kind });
    }

    /// Run one simulation step at host time `now`.
    pub fn tick(&mut self, now: Millis) -> Result<TickReport> {
        let mut report = TickReport {
            now,
            ..TickReport::default()
        };

        // Lines for the dialogue sink, spoken once the tick is done
        let mut spoken = Vec::new();

        // 0. Host commands queued since the last tick
        self.apply_manual_commands(now, &mut report, &mut spoken)?;

        // 1. Movement and state transitions on last tick's positions
        let behavior = behavior_system(
            &mut self.registry,
            &self.config,
            &self.archetypes,
            now,
            &mut self.rng,
        )?;
        report.departures = behavior.departures;
        report.arrivals = behavior.arrivals;
        report.disengaged = behavior.disengaged;

        // 2. Proximity and interaction triggers on the updated positions
        let interactions = interaction_system(
            &mut self.registry,
            &mut self.queue,
            &self.config,
            &self.archetypes,
            now,
            &mut self.rng,
        )?;
        report.social_started = interactions.social_started;
        report.conflict_started = interactions.conflict_started;
        report.hits = interactions.hits;
        report.effects_emitted += interactions.effects;
        report.messages_emitted += interactions.messages.len();
        spoken.extend(interactions.messages);

        // 3. Ephemeral queue: release due replies, then prune
        let registry = &self.registry;
        let released = self.queue.release_due(now, |message| {
            registry
                .record(message.owner)
                .is_some_and(|owner| owner.behavior.state == BehaviorState::EngagedSocial)
        });
        report.messages_emitted += released.len();
        spoken.extend(released);
        report.expired = self.queue.prune(now);

        // 4. Population growth
        let context = self.context.as_deref();
        report.spawned = self.controller.reconcile(
            &mut self.registry,
            &self.config,
            &self.archetypes,
            &self.population,
            context,
            now,
            &mut self.rng,
        );

        self.stats.absorb(&report);
        self.narrate(&spoken);
        Ok(report)
    }

    /// Drive the engine from a host frame callback.
    ///
    /// Errors and panics inside the tick are logged and reported as
    /// [`FrameOutcome::Failed`]; the next frame ticks as usual.
    pub fn frame(&mut self, now: Millis, target: &mut dyn RenderTarget) -> FrameOutcome {
        if !target.is_ready() {
            self.stats.frames_not_ready += 1;
            log::trace!("Render target not ready at {:.1}", now);
            return FrameOutcome::NotReady;
        }

        match self.clock.poll(now) {
            ClockDecision::Halted => {
                self.stats.frames_halted += 1;
                return FrameOutcome::Halted;
            }
            ClockDecision::Skip => {
                self.stats.frames_skipped += 1;
                log::trace!("Skipped frame at {:.1}", now);
                return FrameOutcome::Skipped;
            }
            ClockDecision::Tick => {}
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.tick(now)));
        self.clock.mark_ticked(now);

        let failure = match result {
            Ok(Ok(report)) => {
                target.draw(&self.snapshot(now));
                return FrameOutcome::Ticked(report);
            }
            Ok(Err(err)) => err,
            Err(payload) => SimError::TickPanicked(panic_message(payload.as_ref())),
        };

        self.stats.tick_failures += 1;
        log::warn!("Tick at {:.1} failed: {}", now, failure);
        FrameOutcome::Failed(failure.to_string())
    }

    fn apply_manual_commands(
        &mut self,
        now: Millis,
        report: &mut TickReport,
        spoken: &mut Vec<Message>,
    ) -> Result<()> {
        while let Some(command) = self.pending.pop_front() {
            match command {
                ManualCommand::Interact(id) => {
                    if !self.registry.contains(id) {
                        log::warn!("Dropping manual interaction with unknown {}", id);
                        report.manual_dropped += 1;
                        continue;
                    }
                    let greeting = manual_interact(
                        &mut self.registry,
                        &mut self.queue,
                        &self.config,
                        &self.archetypes,
                        id,
                        now,
                        &mut self.rng,
                    )?;
                    if let Some(message) = greeting {
                        spoken.push(message);
                        report.messages_emitted += 1;
                    }
                }
                ManualCommand::Effect { position, kind } => {
                    let position = self.config.bounds().clamp(position);
                    self.queue
                        .push_effect(position, kind, now, self.config.effect_ttl_ms);
                    report.effects_emitted += 1;
                }
            }
            report.manual_applied += 1;
        }
        Ok(())
    }

    /// Forward finished lines to the dialogue sink. A failing sink only
    /// loses its own line.
    fn narrate(&mut self, messages: &[Message]) {
        for message in messages {
            let archetype = self
                .registry
                .record(message.owner)
                .and_then(|r| self.archetypes.get(r.archetype))
                .map(|spec| spec.name.clone())
                .unwrap_or_default();
            let utterance = Utterance {
                message_id: message.id,
                speaker: message.owner,
                archetype,
                text: message.text.clone(),
            };
            let sink = &mut self.sink;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.speak(&utterance))) {
                log::warn!(
                    "Dialogue sink failed on message {:?}: {}",
                    message.id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    pub fn snapshot(&self, now: Millis) -> WorldSnapshot {
        WorldSnapshot::capture(&self.registry, &self.queue, &self.archetypes, now)
    }

    pub fn clock_handle(&self) -> ClockHandle {
        self.clock.handle()
    }

    pub fn halt(&self) {
        self.clock.handle().halt();
    }

    pub fn resume(&self) {
        self.clock.handle().resume();
    }

    pub fn last_tick(&self) -> Option<Millis> {
        self.clock.last_tick()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn archetypes(&self) -> &ArchetypeTable {
        &self.archetypes
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Direct registry access for hosts and tests that stage scenes by hand
    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn queue(&self) -> &EphemeralQueue {
        &self.queue
    }

    pub fn agent(&self, id: AgentId) -> Option<AgentRecord> {
        self.registry.record(id)
    }

    pub fn agent_count(&self) -> usize {
        self.registry.len()
    }

    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Headless;

    struct Unmounted;

    impl RenderTarget for Unmounted {
        fn is_ready(&self) -> bool {
            false
        }
        fn draw(&mut self, _snapshot: &WorldSnapshot) {
            panic!("should never draw");
        }
    }

    #[derive(Default)]
    struct Counting {
        draws: usize,
        last_agents: usize,
    }

    impl RenderTarget for Counting {
        fn is_ready(&self) -> bool {
            true
        }
        fn draw(&mut self, snapshot: &WorldSnapshot) {
            self.draws += 1;
            self.last_agents = snapshot.agents.len();
        }
    }

    #[test]
    fn test_engine_creation() {
        let engine = SimulationEngine::new(EngineSetup::default(), 1).unwrap();
        assert_eq!(engine.agent_count(), 0);
        assert!(engine.last_tick().is_none());
    }

    #[test]
    fn test_first_tick_populates_default_context() {
        let mut engine = SimulationEngine::with_defaults(2);
        let report = engine.tick(0.0).unwrap();
        assert_eq!(report.spawned.len(), 3);
        assert_eq!(engine.agent_count(), 3);
    }

    #[test]
    fn test_frame_cadence() {
        let mut engine = SimulationEngine::with_defaults(3);
        let mut target = Counting::default();

        assert!(matches!(engine.frame(0.0, &mut target), FrameOutcome::Ticked(_)));
        assert_eq!(engine.frame(8.0, &mut target), FrameOutcome::Skipped);
        assert!(matches!(engine.frame(17.0, &mut target), FrameOutcome::Ticked(_)));

        assert_eq!(target.draws, 2);
        assert_eq!(target.last_agents, 3);
        assert_eq!(engine.stats().ticks, 2);
        assert_eq!(engine.stats().frames_skipped, 1);
    }

    #[test]
    fn test_not_ready_target_leaves_clock_alone() {
        let mut engine = SimulationEngine::with_defaults(4);

        assert_eq!(engine.frame(0.0, &mut Unmounted), FrameOutcome::NotReady);
        assert!(engine.last_tick().is_none());
        assert_eq!(engine.agent_count(), 0);
        assert_eq!(engine.stats().frames_not_ready, 1);
    }

    #[test]
    fn test_halt_and_resume() {
        let mut engine = SimulationEngine::with_defaults(5);
        let handle = engine.clock_handle();

        handle.halt();
        assert_eq!(engine.frame(0.0, &mut Headless), FrameOutcome::Halted);
        assert_eq!(engine.stats().ticks, 0);

        handle.resume();
        assert!(matches!(engine.frame(20.0, &mut Headless), FrameOutcome::Ticked(_)));
    }

    #[test]
    fn test_interact_unknown_agent_rejected() {
        let mut engine = SimulationEngine::with_defaults(6);
        assert!(matches!(
            engine.interact(AgentId(42)),
            Err(SimError::UnknownAgent(AgentId(42)))
        ));
        assert_eq!(engine.pending_commands(), 0);
    }

    #[test]
    fn test_manual_effect_is_clamped() {
        let mut engine = SimulationEngine::with_defaults(7);
        engine.trigger_effect(Vec2::new(-500.0, 9000.0), EffectKind::Spark);
        engine.tick(0.0).unwrap();

        let effect = engine.queue().effects()[0];
        let bounds = engine.config().bounds();
        assert!(bounds.contains(&effect.position));
        assert_eq!(effect.kind, EffectKind::Spark);
    }

    struct Mute;

    impl DialogueSink for Mute {
        fn speak(&mut self, _utterance: &Utterance) {
            panic!("no voice");
        }
    }

    #[test]
    fn test_tick_panic_reported_as_failure() {
        let mut engine = SimulationEngine::with_defaults(8);
        assert!(matches!(engine.frame(0.0, &mut Headless), FrameOutcome::Ticked(_)));

        // Corrupt the playfield after validation so the bounds clamp panics
        engine.config.width = f32::NAN;
        let outcome = engine.frame(20.0, &mut Headless);
        assert!(matches!(outcome, FrameOutcome::Failed(ref msg) if msg.contains("panicked")));
        assert_eq!(engine.stats().tick_failures, 1);
        assert_eq!(engine.last_tick(), Some(20.0));

        engine.config.width = SimConfig::default().width;
        assert!(matches!(engine.frame(40.0, &mut Headless), FrameOutcome::Ticked(_)));
    }

    #[test]
    fn test_failing_sink_keeps_tick_whole() {
        let mut engine = SimulationEngine::with_defaults(9);
        engine.set_sink(Box::new(Mute));
        engine.tick(0.0).unwrap();
        let id = engine.registry().ids()[0];
        engine.interact(id).unwrap();

        let report = engine.tick(20.0).unwrap();
        assert_eq!(report.manual_applied, 1);
        assert!(report.messages_emitted >= 1);
        assert!(engine.queue().latest_message_for(id).is_some());
        assert_eq!(engine.stats().ticks, 2);
    }

    #[test]
    fn test_invalid_setup_rejected() {
        let mut setup = EngineSetup::default();
        setup.config.hit_chance = -0.5;
        assert!(SimulationEngine::new(setup, 0).is_err());
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = |seed| {
            let mut engine = SimulationEngine::with_defaults(seed);
            engine.set_context(Some("gallery"));
            for i in 0..600 {
                engine.tick(i as f64 * 16.7).unwrap();
            }
            engine.snapshot(10_020.0).to_json().unwrap()
        };
        assert_eq!(run(99), run(99));
    }
}
