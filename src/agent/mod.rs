//! Agent control loop.

mod orchestrator;

pub use orchestrator::{Orchestrator, TurnState};
