//! Shared model for the MultiMail bulk sender.

pub mod config;
pub mod error;
pub mod templates;
pub mod types;

pub use config::AppConfig;
pub use error::{CampaignError, CampaignResult, EngineError, ImportError, TransportError};
pub use types::{CampaignConfig, DeliveryStatus, LogEntry, Recipient, RunState};
