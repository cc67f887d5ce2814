//! Engine configuration: playfield, tuning constants and the population table.
//!
//! Every probability and timing constant lives here so hosts can retune the
//! feel of the crowd without touching the systems. Values are cosmetic; the
//! invariants hold for any configuration that passes [`SimConfig::validate`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archetypes::ArchetypeTable;
use crate::components::{Bounds, Millis};
use crate::error::{Result, SimError};

/// Tuning for the simulation systems
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // === PLAYFIELD ===
    pub width: f32,
    pub height: f32,
    /// Inset from every edge that agents never cross
    pub margin: f32,

    // === CLOCK ===
    /// Minimum host time between two ticks (~60 Hz)
    pub tick_interval_ms: Millis,

    // === WANDERING ===
    /// Per-tick chance an idle agent picks a new destination
    pub wander_chance: f64,
    /// Idle agents stay put at least this long before wandering
    pub min_idle_ms: Millis,
    /// Distance at which a moving agent counts as arrived
    pub arrival_epsilon: f32,

    // === INTERACTIONS ===
    /// Two free agents closer than this may start an interaction
    pub interaction_radius: f32,
    /// Per-pair, per-tick chance an interaction starts
    pub trigger_chance: f64,
    /// Chance a started interaction is a conflict rather than a chat
    pub conflict_chance: f64,
    pub social_dwell_ms: Millis,
    pub conflict_dwell_ms: Millis,
    /// Conflict partners farther apart than this close the gap first
    pub engagement_range: f32,
    /// Per-tick chance of a hit while conflict partners are in range
    pub hit_chance: f64,

    // === EPHEMERAL OBJECTS ===
    pub message_ttl_ms: Millis,
    pub effect_ttl_ms: Millis,
    /// Delay before the second participant answers in a chat
    pub reply_delay_ms: Millis,

    // === POPULATION ===
    /// Hard cap on the crowd regardless of what the context asks for
    pub max_population: usize,
    /// Preferred minimum distance between a spawn point and existing agents
    pub spawn_spacing: f32,
    /// Candidate points tried before accepting a crowded spawn point
    pub spawn_attempts: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 540.0,
            margin: 24.0,

            tick_interval_ms: 1000.0 / 60.0,

            wander_chance: 0.015,
            min_idle_ms: 1500.0,
            arrival_epsilon: 10.0,

            interaction_radius: 130.0,
            trigger_chance: 0.004,
            conflict_chance: 0.35,
            social_dwell_ms: 3500.0,
            conflict_dwell_ms: 5000.0,
            engagement_range: 40.0,
            hit_chance: 0.05,

            message_ttl_ms: 3000.0,
            effect_ttl_ms: 600.0,
            reply_delay_ms: 900.0,

            max_population: 10,
            spawn_spacing: 48.0,
            spawn_attempts: 8,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.width, self.height, self.margin)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let lengths = [
            ("width", self.width),
            ("height", self.height),
            ("margin", self.margin),
            ("arrival_epsilon", self.arrival_epsilon),
            ("interaction_radius", self.interaction_radius),
            ("engagement_range", self.engagement_range),
            ("spawn_spacing", self.spawn_spacing),
        ];
        let rates = [
            ("tick_interval_ms", self.tick_interval_ms),
            ("wander_chance", self.wander_chance),
            ("min_idle_ms", self.min_idle_ms),
            ("trigger_chance", self.trigger_chance),
            ("conflict_chance", self.conflict_chance),
            ("social_dwell_ms", self.social_dwell_ms),
            ("conflict_dwell_ms", self.conflict_dwell_ms),
            ("hit_chance", self.hit_chance),
            ("message_ttl_ms", self.message_ttl_ms),
            ("effect_ttl_ms", self.effect_ttl_ms),
            ("reply_delay_ms", self.reply_delay_ms),
        ];
        let non_finite = lengths
            .iter()
            .filter(|(_, value)| !value.is_finite())
            .map(|(name, _)| *name)
            .chain(
                rates
                    .iter()
                    .filter(|(_, value)| !value.is_finite())
                    .map(|(name, _)| *name),
            )
            .next();
        if let Some(name) = non_finite {
            return Err(SimError::InvalidConfig(format!("{} must be a finite number", name)));
        }

        if self.margin < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "margin ({}) must not be negative",
                self.margin
            )));
        }
        if self.width < 2.0 * self.margin || self.height < 2.0 * self.margin {
            return Err(SimError::InvalidConfig(format!(
                "playfield {}x{} leaves no room inside margin {}",
                self.width, self.height, self.margin
            )));
        }

        let chances = [
            ("wander_chance", self.wander_chance),
            ("trigger_chance", self.trigger_chance),
            ("conflict_chance", self.conflict_chance),
            ("hit_chance", self.hit_chance),
        ];
        for (name, value) in chances {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::InvalidConfig(format!(
                    "{} ({}) must be within [0, 1]",
                    name, value
                )));
            }
        }

        let durations = [
            ("tick_interval_ms", self.tick_interval_ms),
            ("message_ttl_ms", self.message_ttl_ms),
            ("effect_ttl_ms", self.effect_ttl_ms),
            ("social_dwell_ms", self.social_dwell_ms),
            ("conflict_dwell_ms", self.conflict_dwell_ms),
        ];
        for (name, value) in durations {
            if !(value > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{} ({}) must be positive",
                    name, value
                )));
            }
        }
        if self.min_idle_ms < 0.0 || self.reply_delay_ms < 0.0 {
            return Err(SimError::InvalidConfig(
                "min_idle_ms and reply_delay_ms must not be negative".into(),
            ));
        }

        if self.arrival_epsilon <= 0.0 || self.interaction_radius < 0.0 || self.engagement_range < 0.0
        {
            return Err(SimError::InvalidConfig(
                "arrival_epsilon must be positive, radii must not be negative".into(),
            ));
        }

        if self.max_population == 0 {
            return Err(SimError::InvalidConfig("max_population must be at least 1".into()));
        }

        Ok(())
    }
}

/// Maps the host's context signal (e.g. the current view) to a crowd size
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationTable {
    /// Used when the context is missing or not in the table
    pub default_count: usize,
    pub contexts: BTreeMap<String, usize>,
}

impl Default for PopulationTable {
    fn default() -> Self {
        let contexts = [("home", 4), ("dashboard", 6), ("gallery", 8), ("about", 2)]
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        Self {
            default_count: 3,
            contexts,
        }
    }
}

impl PopulationTable {
    pub fn with_context(mut self, context: impl Into<String>, count: usize) -> Self {
        self.contexts.insert(context.into(), count);
        self
    }

    /// Desired crowd size for a context, falling back to the default.
    pub fn desired_for(&self, context: Option<&str>) -> usize {
        match context.and_then(|c| self.contexts.get(c)) {
            Some(count) => *count,
            None => {
                log::debug!(
                    "No population mapping for context {:?}, using default {}",
                    context,
                    self.default_count
                );
                self.default_count
            }
        }
    }
}

/// Everything needed to build an engine, loadable from one JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSetup {
    pub config: SimConfig,
    pub archetypes: ArchetypeTable,
    pub population: PopulationTable,
}

impl EngineSetup {
    /// Parse and validate a setup document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let setup: EngineSetup = serde_json::from_str(json)?;
        setup.validate()?;
        Ok(setup)
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.archetypes.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(EngineSetup::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_chance() {
        let config = SimConfig {
            trigger_chance: 1.5,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_margin_larger_than_field() {
        let config = SimConfig {
            width: 40.0,
            margin: 30.0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nan_playfield() {
        let config = SimConfig {
            width: f32::NAN,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(msg)) if msg.contains("width")));
    }

    #[test]
    fn test_rejects_nan_distances_and_timings() {
        let cases = [
            SimConfig { arrival_epsilon: f32::NAN, ..SimConfig::default() },
            SimConfig { interaction_radius: f32::NAN, ..SimConfig::default() },
            SimConfig { engagement_range: f32::INFINITY, ..SimConfig::default() },
            SimConfig { margin: f32::NAN, ..SimConfig::default() },
            SimConfig { min_idle_ms: f64::NAN, ..SimConfig::default() },
            SimConfig { reply_delay_ms: f64::NAN, ..SimConfig::default() },
            SimConfig { message_ttl_ms: f64::INFINITY, ..SimConfig::default() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }
    }

    #[test]
    fn test_nan_setup_never_builds_an_engine() {
        let mut setup = EngineSetup::default();
        setup.config.height = f32::NAN;
        assert!(setup.validate().is_err());
    }

    #[test]
    fn test_population_fallback() {
        let table = PopulationTable::default().with_context("lab", 7);
        assert_eq!(table.desired_for(Some("lab")), 7);
        assert_eq!(table.desired_for(Some("missing")), table.default_count);
        assert_eq!(table.desired_for(None), table.default_count);
    }

    #[test]
    fn test_setup_from_partial_json() {
        let json = r#"{ "config": { "width": 400.0, "height": 300.0 }, "population": { "default_count": 2 } }"#;
        let setup = EngineSetup::from_json_str(json).unwrap();
        assert_eq!(setup.config.width, 400.0);
        assert_eq!(setup.config.margin, SimConfig::default().margin);
        assert_eq!(setup.population.default_count, 2);
        // Missing fields keep their defaults
        assert_eq!(setup.population.contexts, PopulationTable::default().contexts);
        assert!(!setup.archetypes.is_empty());
    }

    #[test]
    fn test_setup_rejects_bad_json() {
        assert!(matches!(
            EngineSetup::from_json_str("{ not json"),
            Err(SimError::Config(_))
        ));
    }
}
