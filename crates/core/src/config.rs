use serde::Deserialize;
use std::path::Path;

use crate::error::CampaignResult;
use crate::types::CampaignConfig;

/// Root application configuration. Loaded from an optional TOML file, then
/// environment variables with the prefix `MULTIMAIL__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportProvider {
    #[default]
    DryRun,
    Sendgrid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub provider: TransportProvider,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default)]
    pub sendgrid: SendGridConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendGridConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_sendgrid_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

// Default functions
fn default_min_delay_secs() -> f64 {
    2.0
}
fn default_max_delay_secs() -> f64 {
    5.0
}
fn default_send_timeout_ms() -> u64 {
    30_000
}
fn default_sendgrid_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}
fn default_from_email() -> String {
    "no-reply@example.com".to_string()
}
fn default_from_name() -> String {
    "MultiMail".to_string()
}
fn default_delimiter() -> char {
    ','
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: TransportProvider::default(),
            send_timeout_ms: default_send_timeout_ms(),
            sendgrid: SendGridConfig::default(),
        }
    }
}

impl Default for SendGridConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_sendgrid_endpoint(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file and environment variables.
    /// Environment values win over the file.
    pub fn load(path: Option<&Path>) -> CampaignResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("MULTIMAIL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Initial campaign settings seeded from the pacing section.
    pub fn campaign_defaults(&self) -> CampaignConfig {
        CampaignConfig {
            min_delay_secs: self.pacing.min_delay_secs,
            max_delay_secs: self.pacing.max_delay_secs,
            ..CampaignConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.pacing.min_delay_secs, 2.0);
        assert_eq!(config.pacing.max_delay_secs, 5.0);
        assert_eq!(config.transport.provider, TransportProvider::DryRun);
        assert_eq!(config.transport.send_timeout_ms, 30_000);
        assert_eq!(config.import.delimiter, ',');
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let raw = r#"
            [pacing]
            min_delay_secs = 0.5

            [transport]
            provider = "sendgrid"

            [transport.sendgrid]
            api_key = "SG.test"
        "#;
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.pacing.min_delay_secs, 0.5);
        assert_eq!(config.pacing.max_delay_secs, 5.0);
        assert_eq!(config.transport.provider, TransportProvider::Sendgrid);
        assert_eq!(config.transport.sendgrid.api_key, "SG.test");
        assert_eq!(
            config.transport.sendgrid.endpoint,
            "https://api.sendgrid.com/v3/mail/send"
        );
    }

    #[test]
    fn test_campaign_defaults_follow_pacing() {
        let mut config = AppConfig::default();
        config.pacing.min_delay_secs = 1.0;
        config.pacing.max_delay_secs = 1.5;

        let campaign = config.campaign_defaults();
        assert_eq!(campaign.min_delay_secs, 1.0);
        assert_eq!(campaign.max_delay_secs, 1.5);
        assert!(campaign.subject.is_empty());
    }
}
