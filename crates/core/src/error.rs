use std::time::Duration;

use thiserror::Error;

use crate::types::RunState;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for CampaignError {
    fn from(e: config::ConfigError) -> Self {
        CampaignError::Config(e.to_string())
    }
}

/// Failures that reject a whole recipient import. Row-level defects never
/// surface here; they are dropped by the decoder.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("could not read recipient file: {0}")]
    ReadError(String),

    #[error("recipient file has no rows")]
    InvalidFormat,

    #[error("recipient file header must contain 'name' and 'email' columns")]
    MissingColumns,
}

impl From<std::io::Error> for ImportError {
    fn from(e: std::io::Error) -> Self {
        ImportError::ReadError(e.to_string())
    }
}

/// A single delivery attempt failed. The `Display` text is what ends up in
/// the recipient's `failed` status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Operator control failures.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("missing details to start sending: {}", .0.join(", "))]
    MissingDetails(Vec<&'static str>),

    #[error("cannot {operation} while {from}")]
    InvalidTransition {
        from: RunState,
        operation: &'static str,
    },

    #[error("invalid recipient address: {0:?}")]
    InvalidRecipient(String),

    #[error("campaign is busy: {0}")]
    Busy(&'static str),

    #[error(transparent)]
    Import(#[from] ImportError),
}
