use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use validator_config::KafkaConfig;
use validator_metrics::PRODUCE_FAILURES_TOTAL;

use super::config::create_client_config;

/// Anything the claim loop can publish records through
#[async_trait]
pub trait RecordProducer: Send + Sync {
    /// Write one record and wait for the broker acknowledgment.
    /// Returns the (partition, offset) it landed at.
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(i32, i64)>;
}

/// Kafka producer for chain and dead-letter records
///
/// This producer is configured for:
/// - At-least-once delivery guarantees
/// - Idempotent writes (no duplicates within producer session)
/// - Low latency (10ms linger)
#[derive(Clone)]
pub struct MessageProducer {
    producer: Arc<FutureProducer>,
    timeout: Duration,
}

impl MessageProducer {
    /// Create a new Kafka producer from the application configuration.
    ///
    /// # Configuration
    /// - `acks=all`: Wait for all in-sync replicas to acknowledge.
    /// - `enable.idempotence=true`: Prevent duplicate writes.
    /// - `linger.ms=10`: Small batching window for low latency.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!("Initializing Kafka producer...");
        let mut client_config = create_client_config(config)?;

        let producer: FutureProducer = client_config
            // Reliability settings
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5")
            // Performance settings
            .set("linger.ms", "10")
            // Timeout settings
            .set("request.timeout.ms", "30000")
            .set("message.timeout.ms", &config.producer_timeout.as_millis().to_string())
            .create()
            .context("Failed to create Kafka producer")?;

        info!("Kafka producer initialized successfully");

        Ok(Self {
            producer: Arc::new(producer),
            timeout: config.producer_timeout,
        })
    }

    /// Flush pending messages (for graceful shutdown)
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        info!("Flushing Kafka producer (timeout: {:?})", timeout);

        self.producer
            .flush(Timeout::After(timeout))
            .context("Failed to flush Kafka producer")?;

        info!("Kafka producer flushed successfully");
        Ok(())
    }
}

#[async_trait]
impl RecordProducer for MessageProducer {
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(i32, i64)> {
        let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        let start = Instant::now();

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %topic,
                    partition = partition,
                    offset = offset,
                    latency_ms = start.elapsed().as_millis(),
                    "Record persisted to Kafka"
                );
                Ok((partition, offset))
            }
            Err((kafka_err, _)) => {
                PRODUCE_FAILURES_TOTAL.inc();
                error!(
                    error = %kafka_err,
                    topic = %topic,
                    latency_ms = start.elapsed().as_millis(),
                    "Failed to send record to Kafka"
                );
                Err(anyhow::anyhow!("Kafka send failed: {}", kafka_err))
            }
        }
    }
}
