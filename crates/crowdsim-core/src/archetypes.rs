//! Archetype table: the templates agents are instantiated from.
//!
//! An archetype bundles the appearance descriptor the renderer draws, the
//! movement constants the state machine uses, and the phrase tables the
//! interaction director speaks from. The engine itself is archetype-agnostic:
//! adding a variant means adding a row here, not another state machine.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::components::{ArchetypeRef, Attributes};
use crate::error::{Result, SimError};

/// What the renderer needs to pick a sprite and colors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub sprite: String,
    pub palette: String,
}

/// Base values and spread for the opaque per-agent scalars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeRanges {
    pub vitality: f32,
    pub focus: f32,
    /// Each attribute is rolled uniformly in `base ± jitter`
    pub jitter: f32,
}

impl Default for AttributeRanges {
    fn default() -> Self {
        Self {
            vitality: 1.0,
            focus: 0.5,
            jitter: 0.0,
        }
    }
}

/// One row of the archetype table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeSpec {
    pub name: String,
    pub appearance: Appearance,
    /// Units per tick while wandering
    pub walk_speed: f32,
    /// Units per tick while closing on a conflict partner
    pub charge_speed: f32,
    /// Lines used when the host pokes an agent
    #[serde(default)]
    pub greetings: Vec<String>,
    /// Lines used in a chat with another agent
    #[serde(default)]
    pub chatter: Vec<String>,
    /// Lines shouted during a conflict
    #[serde(default)]
    pub taunts: Vec<String>,
    #[serde(default)]
    pub attributes: AttributeRanges,
}

impl ArchetypeSpec {
    pub fn new(name: impl Into<String>, sprite: impl Into<String>, palette: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            appearance: Appearance {
                sprite: sprite.into(),
                palette: palette.into(),
            },
            walk_speed: 1.5,
            charge_speed: 2.5,
            greetings: Vec::new(),
            chatter: Vec::new(),
            taunts: Vec::new(),
            attributes: AttributeRanges::default(),
        }
    }

    pub fn with_speeds(mut self, walk_speed: f32, charge_speed: f32) -> Self {
        self.walk_speed = walk_speed;
        self.charge_speed = charge_speed;
        self
    }

    pub fn with_phrases(mut self, greetings: &[&str], chatter: &[&str], taunts: &[&str]) -> Self {
        let own = |lines: &[&str]| lines.iter().map(|l| l.to_string()).collect();
        self.greetings = own(greetings);
        self.chatter = own(chatter);
        self.taunts = own(taunts);
        self
    }

    pub fn with_attributes(mut self, vitality: f32, focus: f32, jitter: f32) -> Self {
        self.attributes = AttributeRanges {
            vitality,
            focus,
            jitter,
        };
        self
    }

    /// Roll starting attributes for a fresh agent.
    pub fn roll_attributes<R: Rng + ?Sized>(&self, rng: &mut R) -> Attributes {
        let ranges = self.attributes;
        let jitter = |rng: &mut R, base: f32| {
            if ranges.jitter > 0.0 {
                (base + rng.gen_range(-ranges.jitter..=ranges.jitter)).max(0.0)
            } else {
                base
            }
        };
        Attributes {
            vitality: jitter(rng, ranges.vitality),
            focus: jitter(rng, ranges.focus),
        }
    }
}

/// Ordered archetype table. Spawning walks it round-robin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchetypeTable {
    specs: Vec<ArchetypeSpec>,
}

impl Default for ArchetypeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ArchetypeTable {
    pub fn new(specs: Vec<ArchetypeSpec>) -> Result<Self> {
        let table = Self { specs };
        table.validate()?;
        Ok(table)
    }

    /// The four stock characters.
    pub fn builtin() -> Self {
        let specs = vec![
            ArchetypeSpec::new("Courier", "courier", "amber")
                .with_speeds(2.2, 3.2)
                .with_attributes(0.9, 0.4, 0.1)
                .with_phrases(
                    &["Package for you!", "Hi! Can't stop long.", "Special delivery!"],
                    &[
                        "Have you seen the east wing lately, {partner}?",
                        "Three more drops before lunch.",
                        "Fastest route is through the gallery.",
                    ],
                    &["Out of my way, {partner}!", "I've got deadlines!", "Move it!"],
                ),
            ArchetypeSpec::new("Scholar", "scholar", "indigo")
                .with_speeds(1.2, 2.0)
                .with_attributes(0.6, 0.9, 0.1)
                .with_phrases(
                    &["Oh! Hello there.", "Curious, isn't it?", "Greetings, reader."],
                    &[
                        "I was just reading about that, {partner}.",
                        "Fascinating data today.",
                        "Have you considered the footnotes?",
                    ],
                    &["Your argument is flawed!", "Cite your sources, {partner}!", "Preposterous!"],
                ),
            ArchetypeSpec::new("Guardian", "guardian", "slate")
                .with_speeds(1.4, 2.8)
                .with_attributes(1.2, 0.6, 0.15)
                .with_phrases(
                    &["Halt! Oh, it's you.", "All secure here.", "Stay alert."],
                    &[
                        "Quiet shift so far, {partner}.",
                        "Perimeter looks clean.",
                        "Keep your eyes open.",
                    ],
                    &["Stand down, {partner}!", "You'll regret that!", "For the {self}s!"],
                ),
            ArchetypeSpec::new("Tinkerer", "tinkerer", "teal")
                .with_speeds(1.6, 2.4)
                .with_attributes(0.8, 0.7, 0.2)
                .with_phrases(
                    &["Mind the wires!", "Hey! Want to see a gadget?", "Hello, hello!"],
                    &[
                        "I could rebuild that in an afternoon, {partner}.",
                        "Need a spare gear?",
                        "This one hums when it's happy.",
                    ],
                    &["That was my prototype!", "Hands off, {partner}!", "Unacceptable tolerances!"],
                ),
        ];
        Self { specs }
    }

    pub fn validate(&self) -> Result<()> {
        if self.specs.is_empty() {
            return Err(SimError::EmptyArchetypeTable);
        }
        for spec in &self.specs {
            if !(spec.walk_speed > 0.0) || !(spec.charge_speed > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "archetype {} needs positive speeds",
                    spec.name
                )));
            }
            let numbers = [
                spec.walk_speed,
                spec.charge_speed,
                spec.attributes.vitality,
                spec.attributes.focus,
                spec.attributes.jitter,
            ];
            if numbers.iter().any(|value| !value.is_finite()) {
                return Err(SimError::InvalidConfig(format!(
                    "archetype {} has a non-finite speed or attribute",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, archetype: ArchetypeRef) -> Option<&ArchetypeSpec> {
        self.specs.get(archetype.0)
    }

    /// Archetype for the n-th spawn of the session.
    pub fn round_robin(&self, spawn_index: usize) -> ArchetypeRef {
        ArchetypeRef(spawn_index % self.specs.len().max(1))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchetypeSpec> {
        self.specs.iter()
    }
}
