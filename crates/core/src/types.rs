use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One addressable target of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub status: DeliveryStatus,
}

impl Recipient {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            status: DeliveryStatus::Pending,
        }
    }

    /// Addresses without an `@` are never accepted into a recipient list.
    pub fn is_valid_email(email: &str) -> bool {
        email.contains('@')
    }
}

/// Per-recipient delivery outcome within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed(String),
}

impl DeliveryStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryStatus::Sent)
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

/// Campaign run state. Exactly one value is current at any instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum RunState {
    #[default]
    Idle,
    Sending,
    Paused,
    Completed,
    /// Part of the status domain; failures are recipient-scoped so the
    /// engine never enters it.
    Error(String),
}

impl RunState {
    /// A control loop is iterating (or held at the pause gate).
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Sending | RunState::Paused)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Sending => write!(f, "sending"),
            RunState::Paused => write!(f, "paused"),
            RunState::Completed => write!(f, "completed"),
            RunState::Error(msg) => write!(f, "error ({msg})"),
        }
    }
}

/// Operator-supplied campaign settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub subject: String,
    /// HTML body, optionally containing the `{{name}}` placeholder.
    pub body_template: String,
    #[serde(default)]
    pub sender_override: Option<String>,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl CampaignConfig {
    /// The sender override, if it holds anything but whitespace.
    pub fn sender(&self) -> Option<&str> {
        self.sender_override
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Names of the details `start` requires but that are missing.
    pub fn missing_details(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.subject.is_empty() {
            missing.push("subject");
        }
        if self.body_template.is_empty() {
            missing.push("body");
        }
        missing
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            subject: String::new(),
            body_template: String::new(),
            sender_override: None,
            min_delay_secs: 2.0,
            max_delay_secs: 5.0,
        }
    }
}

/// A timestamped activity log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%Y-%m-%d %H:%M:%S"), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_override_blank_is_none() {
        let mut config = CampaignConfig::default();
        assert_eq!(config.sender(), None);

        config.sender_override = Some("   \n".to_string());
        assert_eq!(config.sender(), None);

        config.sender_override = Some(" news@example.com ".to_string());
        assert_eq!(config.sender(), Some("news@example.com"));
    }

    #[test]
    fn test_missing_details() {
        let mut config = CampaignConfig::default();
        assert_eq!(config.missing_details(), vec!["subject", "body"]);

        config.subject = "Hi".to_string();
        assert_eq!(config.missing_details(), vec!["body"]);

        config.body_template = "<p>Hello</p>".to_string();
        assert!(config.missing_details().is_empty());
    }

    #[test]
    fn test_delivery_status_serialization() {
        let failed = DeliveryStatus::Failed("mailbox full".to_string());
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "mailbox full");

        assert!(DeliveryStatus::Sent.is_decided());
        assert!(!DeliveryStatus::Pending.is_decided());
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Sending.to_string(), "sending");
        assert!(RunState::Paused.is_active());
        assert!(!RunState::Completed.is_active());
    }
}
