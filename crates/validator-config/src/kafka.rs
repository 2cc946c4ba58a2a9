// ============================================================================
// Kafka Configuration
// ============================================================================

use anyhow::{Context, Result};
use std::time::Duration;

use crate::constants::{
    DEAD_LETTER_SUFFIX, DEFAULT_CONSUMER_GROUP_ID, DEFAULT_CONSUMPTION_INTERVAL,
    DEFAULT_PRODUCER_TIMEOUT_MS,
};
use crate::duration::parse_duration;
use crate::flag::env_flag;

/// Kafka connection, topic and consumer settings
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Topic this instance consumes votes from
    pub topic: String,
    /// Topic validated votes are forwarded to
    pub chain_topic: String,
    /// Whether `topic` is itself a dead-letter topic
    pub topic_is_dead: bool,
    /// Consumer group ID
    pub consumer_group: String,
    /// Pacing interval between messages when consuming a dead-letter topic
    pub consumption_interval: Duration,
    /// How long a produce waits for the broker acknowledgment
    pub producer_timeout: Duration,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let consumption_interval = match std::env::var("KAFKA_CONSUMER_CONSUMPTION_INTERVAL") {
            Ok(raw) => parse_duration(&raw).context("Invalid KAFKA_CONSUMER_CONSUMPTION_INTERVAL")?,
            Err(_) => DEFAULT_CONSUMPTION_INTERVAL,
        };

        Ok(Self {
            brokers: std::env::var("KAFKA_ADDR").context("KAFKA_ADDR must be set")?,
            topic: std::env::var("KAFKA_TOPIC_NAME").context("KAFKA_TOPIC_NAME must be set")?,
            chain_topic: std::env::var("KAFKA_TOPIC_CHAIN_NAME")
                .context("KAFKA_TOPIC_CHAIN_NAME must be set")?,
            topic_is_dead: env_flag("KAFKA_TOPIC_IS_DEAD")?,
            consumer_group: std::env::var("KAFKA_CONSUMER_GROUP_ID")
                .unwrap_or_else(|_| DEFAULT_CONSUMER_GROUP_ID.to_string()),
            consumption_interval,
            producer_timeout: Duration::from_millis(
                std::env::var("KAFKA_PRODUCER_TIMEOUT_MS")
                    .unwrap_or_else(|_| DEFAULT_PRODUCER_TIMEOUT_MS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_PRODUCER_TIMEOUT_MS),
            ),
            ssl_enabled: env_flag("KAFKA_SSL_ENABLED")?,
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
        })
    }

    /// Dead-letter topic derived from the consumed topic
    pub fn dead_letter_topic(&self) -> String {
        dead_letter_topic(&self.topic)
    }
}

/// Derive the dead-letter topic name for `topic`
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{}{}", topic, DEAD_LETTER_SUFFIX)
}
