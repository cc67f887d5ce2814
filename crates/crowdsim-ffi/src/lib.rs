//! C FFI bindings for the crowdsim agent engine
//!
//! This crate provides a C-compatible API so a host page, game engine or any
//! language with C FFI support can drive the crowd from its own frame loop.
//!
//! # Basic Usage (C)
//! ```c
//! #include "crowdsim.h"
//!
//! // Create simulation
//! CrowdsimHandle sim = crowdsim_create(42);
//! crowdsim_set_context(sim, "gallery");
//!
//! // Host frame callback
//! while (running) {
//!     crowdsim_frame(sim, now_ms, canvas_mounted);
//!
//!     uint32_t count = crowdsim_agent_count(sim);
//!     for (uint32_t i = 0; i < count; i++) {
//!         CrowdsimAgent agent;
//!         if (crowdsim_get_agent(sim, i, &agent)) {
//!             // Draw sprite agent.archetype at agent.x, agent.y facing agent.facing
//!         }
//!     }
//! }
//!
//! // On click
//! crowdsim_interact(sim, clicked_id);
//!
//! // Cleanup
//! crowdsim_destroy(sim);
//! ```

use std::ffi::{c_char, CStr, CString};

use crowdsim_core::prelude::*;

/// Opaque handle to the simulation engine
pub type CrowdsimHandle = *mut SimulationEngine;

/// Result of one `crowdsim_frame` call
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrowdsimFrameResult {
    /// Null handle
    Invalid = -1,
    NotReady = 0,
    Halted = 1,
    Skipped = 2,
    Ticked = 3,
    /// The tick failed and was logged; keep calling
    Failed = 4,
}

/// Agent data returned to C
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CrowdsimAgent {
    /// Stable agent id (use with `crowdsim_interact`)
    pub id: u32,
    /// Row of the archetype table
    pub archetype: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// 0 = north, 1 = south, 2 = east, 3 = west
    pub facing: u8,
    /// 0 = idle, 1 = moving, 2 = social, 3 = conflict
    pub state: u8,
    pub animation_phase: u64,
    /// Partner id, or -1 when there is none
    pub partner: i64,
    pub vitality: f32,
    pub focus: f32,
}

/// Simulation statistics
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CrowdsimStats {
    pub ticks: u64,
    pub frames_skipped: u64,
    pub frames_not_ready: u64,
    pub tick_failures: u64,
    pub social_started: u64,
    pub conflict_started: u64,
    pub messages_emitted: u64,
    pub effects_emitted: u64,
    pub agent_count: u32,
    /// Live messages plus effects
    pub live_ephemeral: u32,
}

/// Render target standing in for the host canvas
struct HostCanvas {
    ready: bool,
}

impl RenderTarget for HostCanvas {
    fn is_ready(&self) -> bool {
        self.ready
    }

    // The host pulls state through the query functions after each frame
    fn draw(&mut self, _snapshot: &WorldSnapshot) {}
}

// ============================================================================
// Lifecycle Functions
// ============================================================================

/// Create an engine with the built-in configuration
///
/// Returns a handle that must be freed with `crowdsim_destroy`
#[no_mangle]
pub extern "C" fn crowdsim_create(seed: u64) -> CrowdsimHandle {
    Box::into_raw(Box::new(SimulationEngine::with_defaults(seed)))
}

/// Create an engine from a JSON setup document
///
/// Returns null if the document does not parse or fails validation
#[no_mangle]
pub extern "C" fn crowdsim_create_from_json(json: *const c_char, seed: u64) -> CrowdsimHandle {
    let Some(text) = read_str(json) else {
        return std::ptr::null_mut();
    };

    match EngineSetup::from_json_str(text).and_then(|setup| SimulationEngine::new(setup, seed)) {
        Ok(engine) => Box::into_raw(Box::new(engine)),
        Err(e) => {
            log::warn!("crowdsim_create_from_json rejected setup: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Destroy an engine and free its memory
#[no_mangle]
pub extern "C" fn crowdsim_destroy(handle: CrowdsimHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
    }
}

// ============================================================================
// Simulation Control
// ============================================================================

/// Host frame callback
///
/// `now_ms` is the host's monotonic timestamp; `render_ready` is nonzero once
/// the drawing surface exists.
#[no_mangle]
pub extern "C" fn crowdsim_frame(
    handle: CrowdsimHandle,
    now_ms: f64,
    render_ready: u8,
) -> CrowdsimFrameResult {
    if handle.is_null() {
        return CrowdsimFrameResult::Invalid;
    }

    let sim = unsafe { &mut *handle };
    let mut canvas = HostCanvas {
        ready: render_ready != 0,
    };
    match sim.frame(now_ms, &mut canvas) {
        FrameOutcome::NotReady => CrowdsimFrameResult::NotReady,
        FrameOutcome::Halted => CrowdsimFrameResult::Halted,
        FrameOutcome::Skipped => CrowdsimFrameResult::Skipped,
        FrameOutcome::Ticked(_) => CrowdsimFrameResult::Ticked,
        FrameOutcome::Failed(_) => CrowdsimFrameResult::Failed,
    }
}

/// Queue a manual interaction with an agent
///
/// Returns false if the handle is null or the agent does not exist
#[no_mangle]
pub extern "C" fn crowdsim_interact(handle: CrowdsimHandle, agent_id: u32) -> bool {
    if handle.is_null() {
        return false;
    }

    let sim = unsafe { &mut *handle };
    match sim.interact(AgentId(agent_id)) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("crowdsim_interact: {}", e);
            false
        }
    }
}

/// Queue a host effect. `kind`: 0 = hit, 1 = spark, 2 = heart
#[no_mangle]
pub extern "C" fn crowdsim_trigger_effect(handle: CrowdsimHandle, x: f32, y: f32, kind: u8) -> bool {
    if handle.is_null() {
        return false;
    }

    let kind = match kind {
        0 => EffectKind::Hit,
        1 => EffectKind::Spark,
        2 => EffectKind::Heart,
        _ => return false,
    };
    let sim = unsafe { &mut *handle };
    sim.trigger_effect(Vec2::new(x, y), kind);
    true
}

/// Set the context signal (e.g. the current view). Null clears it.
#[no_mangle]
pub extern "C" fn crowdsim_set_context(handle: CrowdsimHandle, context: *const c_char) {
    if handle.is_null() {
        return;
    }

    let sim = unsafe { &mut *handle };
    sim.set_context(read_str(context));
}

/// Stop ticking; frames return `Halted` until resumed
#[no_mangle]
pub extern "C" fn crowdsim_halt(handle: CrowdsimHandle) {
    if handle.is_null() {
        return;
    }

    let sim = unsafe { &*handle };
    sim.halt();
}

#[no_mangle]
pub extern "C" fn crowdsim_resume(handle: CrowdsimHandle) {
    if handle.is_null() {
        return;
    }

    let sim = unsafe { &*handle };
    sim.resume();
}

// ============================================================================
// Query Functions
// ============================================================================

/// Get the number of agents
#[no_mangle]
pub extern "C" fn crowdsim_agent_count(handle: CrowdsimHandle) -> u32 {
    if handle.is_null() {
        return 0;
    }

    let sim = unsafe { &*handle };
    sim.agent_count() as u32
}

/// Get agent data by index (spawn order)
///
/// Returns true if successful, false if index out of bounds
#[no_mangle]
pub extern "C" fn crowdsim_get_agent(
    handle: CrowdsimHandle,
    index: u32,
    agent: *mut CrowdsimAgent,
) -> bool {
    if handle.is_null() || agent.is_null() {
        return false;
    }

    let sim = unsafe { &*handle };
    let Some(record) = sim
        .registry()
        .ids()
        .get(index as usize)
        .and_then(|id| sim.agent(*id))
    else {
        return false;
    };

    let out = unsafe { &mut *agent };
    out.id = record.id.0;
    out.archetype = record.archetype.0 as u32;
    out.x = record.position.x;
    out.y = record.position.y;
    out.vx = record.velocity.x;
    out.vy = record.velocity.y;
    out.facing = facing_code(record.facing);
    out.state = state_code(record.behavior.state);
    out.animation_phase = record.animation_phase;
    out.partner = record.behavior.partner.map(|p| p.0 as i64).unwrap_or(-1);
    out.vitality = record.attributes.vitality;
    out.focus = record.attributes.focus;

    true
}

/// Get simulation statistics
#[no_mangle]
pub extern "C" fn crowdsim_get_stats(handle: CrowdsimHandle, stats: *mut CrowdsimStats) -> bool {
    if handle.is_null() || stats.is_null() {
        return false;
    }

    let sim = unsafe { &*handle };
    let out = unsafe { &mut *stats };
    let totals = sim.stats();

    out.ticks = totals.ticks;
    out.frames_skipped = totals.frames_skipped;
    out.frames_not_ready = totals.frames_not_ready;
    out.tick_failures = totals.tick_failures;
    out.social_started = totals.social_started;
    out.conflict_started = totals.conflict_started;
    out.messages_emitted = totals.messages_emitted;
    out.effects_emitted = totals.effects_emitted;
    out.agent_count = sim.agent_count() as u32;
    out.live_ephemeral = sim.queue().live_count() as u32;

    true
}

/// Full world snapshot as JSON (agents, messages, effects)
///
/// The string must be released with `crowdsim_free_string`. Returns null on
/// a null handle.
#[no_mangle]
pub extern "C" fn crowdsim_snapshot_json(handle: CrowdsimHandle) -> *mut c_char {
    if handle.is_null() {
        return std::ptr::null_mut();
    }

    let sim = unsafe { &*handle };
    let now = sim.last_tick().unwrap_or(0.0);
    let json = match sim.snapshot(now).to_json() {
        Ok(json) => json,
        Err(e) => {
            log::warn!("crowdsim_snapshot_json: {}", e);
            return std::ptr::null_mut();
        }
    };
    CString::new(json)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Free a string returned by this library
#[no_mangle]
pub extern "C" fn crowdsim_free_string(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn facing_code(facing: Direction) -> u8 {
    match facing {
        Direction::North => 0,
        Direction::South => 1,
        Direction::East => 2,
        Direction::West => 3,
    }
}

fn state_code(state: BehaviorState) -> u8 {
    match state {
        BehaviorState::Idle => 0,
        BehaviorState::Moving => 1,
        BehaviorState::EngagedSocial => 2,
        BehaviorState::EngagedConflict => 3,
    }
}
