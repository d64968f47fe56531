//! Campaign engine: drives one personalized send per recipient at a
//! randomized pace under operator control.

pub mod engine;
pub mod pacing;
pub mod state;

pub use engine::{CampaignEngine, EngineSettings};
pub use pacing::DelayRange;
pub use state::{CampaignSnapshot, RunStateMachine};
