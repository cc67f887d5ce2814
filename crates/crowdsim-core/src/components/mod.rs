//! Component definitions for the ECS simulation.
//!
//! Components are pure data structs attached to agents.
//! They have no behavior - that lives in systems.

mod agent;
mod common;
mod ephemeral;

pub use agent::*;
pub use common::*;
pub use ephemeral::*;
