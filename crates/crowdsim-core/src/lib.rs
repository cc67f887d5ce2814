//! Crowdsim Core - Real-time Crowd Simulation Engine
//!
//! A small, deterministic simulation of animated agents that wander a
//! rectangular playfield, strike up chats or scuffles when they meet, and
//! emit short-lived chat bubbles and effects for a renderer to draw.
//!
//! # Architecture
//!
//! Agents live in a `hecs` world behind a stable-id registry:
//! - **Components**: Pure data per agent (Position, Velocity, Behavior, ...)
//! - **Systems**: Behavior, interactions, ephemeral queue, population
//! - **Engine**: Owns the state and runs the systems once per tick
//!
//! Each tick runs, in order: queued host commands, movement and state
//! transitions, proximity-triggered interactions, ephemeral pruning, and
//! population growth.
//!
//! # Example
//!
//! ```rust,no_run
//! use crowdsim_core::prelude::*;
//!
//! let mut engine = SimulationEngine::new(EngineSetup::default(), 42).unwrap();
//! engine.set_context(Some("gallery"));
//!
//! // Host frame loop, timestamps in milliseconds
//! let mut now = 0.0;
//! loop {
//!     engine.frame(now, &mut Headless);
//!     now += 1000.0 / 60.0;
//! }
//! ```

pub mod archetypes;
pub mod clock;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod snapshot;
pub mod systems;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::archetypes::{ArchetypeSpec, ArchetypeTable};
    pub use crate::clock::ClockHandle;
    pub use crate::components::*;
    pub use crate::config::{EngineSetup, PopulationTable, SimConfig};
    pub use crate::engine::{EngineStats, FrameOutcome, SimulationEngine, TickReport};
    pub use crate::error::SimError;
    pub use crate::snapshot::{Headless, RenderTarget, WorldSnapshot};
    pub use crate::systems::{ChannelSink, DialogueSink, NullSink, Utterance};
}
