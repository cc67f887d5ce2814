//! Simulation clock - decides which host frames run a tick
//!
//! The host calls in once per frame with its own timestamp. A tick runs when
//! at least `min_interval` has passed since the last one, so faster refresh
//! rates do not speed the crowd up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::components::Millis;

/// Shared halt switch. Clones control the same clock.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    running: Arc<AtomicBool>,
}

impl Default for ClockHandle {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl ClockHandle {
    /// Stop scheduling ticks. A tick already running still completes.
    pub fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// What the clock wants done with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDecision {
    Halted,
    /// Too soon after the previous tick
    Skip,
    Tick,
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    min_interval: Millis,
    last_tick: Option<Millis>,
    handle: ClockHandle,
}

impl SimulationClock {
    pub fn new(min_interval: Millis) -> Self {
        Self {
            min_interval,
            last_tick: None,
            handle: ClockHandle::default(),
        }
    }

    /// Decide what to do with a frame at `now`. The first frame always ticks.
    pub fn poll(&self, now: Millis) -> ClockDecision {
        if !self.handle.is_running() {
            return ClockDecision::Halted;
        }
        match self.last_tick {
            Some(last) if now - last < self.min_interval => ClockDecision::Skip,
            _ => ClockDecision::Tick,
        }
    }

    /// Record that the tick for `now` ran (successfully or not).
    pub fn mark_ticked(&mut self, now: Millis) {
        self.last_tick = Some(now);
    }

    pub fn last_tick(&self) -> Option<Millis> {
        self.last_tick
    }

    pub fn min_interval(&self) -> Millis {
        self.min_interval
    }

    pub fn handle(&self) -> ClockHandle {
        self.handle.clone()
    }
}
