//! Error type shared by the engine's fallible operations.

use thiserror::Error;

use crate::components::AgentId;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Agent not found: {0}")]
    UnknownAgent(AgentId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Archetype table is empty")]
    EmptyArchetypeTable,

    #[error("Registry lost track of agent {0}")]
    RegistryCorrupted(AgentId),

    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Tick panicked: {0}")]
    TickPanicked(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
