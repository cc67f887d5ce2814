//! Systems - logic that operates on the registry and the ephemeral queue

mod behavior;
mod dialogue;
mod ephemeral;
mod interaction;
mod population;
mod proximity;

pub use behavior::*;
pub use dialogue::*;
pub use ephemeral::*;
pub use interaction::*;
pub use population::*;
pub use proximity::*;
