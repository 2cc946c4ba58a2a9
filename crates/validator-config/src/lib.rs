// ============================================================================
// Validator Config - Centralized configuration management
// ============================================================================
//
// Loaded once at startup from environment variables (and an optional .env
// file), then passed by value into every component. Nothing here is mutated
// after `Config::from_env` returns.
//
// ============================================================================

mod authority;
mod constants;
mod duration;
mod flag;
mod kafka;
mod logging;
mod processing;
mod web;

pub use authority::{AuthorityConfig, normalize_base_url};
pub use constants::DEAD_LETTER_SUFFIX;
pub use duration::parse_duration;
pub use flag::parse_bool;
pub use kafka::{KafkaConfig, dead_letter_topic};
pub use logging::LoggingConfig;
pub use processing::{ProcessingConfig, RejectionPolicy};
pub use web::WebConfig;

use anyhow::Result;
use constants::DEFAULT_RUST_LOG;

/// Main configuration structure for the validator service
#[derive(Clone, Debug)]
pub struct Config {
    pub rust_log: String,

    // Sub-configurations
    pub kafka: KafkaConfig,
    pub authority: AuthorityConfig,
    pub processing: ProcessingConfig,
    pub web: WebConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Failed to read .env file");
            }
        }

        Ok(Self {
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.to_string()),
            kafka: KafkaConfig::from_env()?,
            authority: AuthorityConfig::from_env()?,
            processing: ProcessingConfig::from_env()?,
            web: WebConfig::from_env(),
            logging: LoggingConfig::from_env()?,
        })
    }
}
