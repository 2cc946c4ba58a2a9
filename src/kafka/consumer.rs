use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::consumer::{
    CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaResult;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use validator_config::KafkaConfig;

use super::config::create_client_config;
use super::types::MessageEnvelope;
use crate::claim::dispatcher::WorkerExit;
use crate::claim::{
    ClaimHandler, ClaimKey, ClaimRegistry, ClaimSession, Dispatcher, PartitionControl,
};
use crate::shutdown::Shutdown;

/// How often paused partitions are drained and restarts are resumed
const MAINTENANCE_INTERVAL: Duration = Duration::from_millis(500);
/// How long a rebalance waits for in-flight claims on revoked partitions
const REVOKE_TIMEOUT: Duration = Duration::from_secs(30);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const COMMITTED_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer context: drains revoked claims and surfaces commit results
pub struct ClaimContext {
    registry: Arc<ClaimRegistry>,
}

impl ClaimContext {
    pub fn new(registry: Arc<ClaimRegistry>) -> Self {
        Self { registry }
    }
}

impl ClientContext for ClaimContext {}

impl ConsumerContext for ClaimContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                let keys: Vec<ClaimKey> = partitions
                    .elements()
                    .iter()
                    .map(|elem| (elem.topic().to_string(), elem.partition()))
                    .collect();
                info!(partitions = keys.len(), "Rebalance revoking partitions");
                // Blocks the rebalance until no claim touches these partitions
                self.registry.revoke(&keys, REVOKE_TIMEOUT);
            }
            Rebalance::Assign(partitions) => {
                info!(partitions = partitions.count(), "Rebalance assigning partitions");
            }
            Rebalance::Error(e) => warn!(error = %e, "Rebalance failed"),
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!(partitions = offsets.count(), "Offsets committed"),
            Err(e) => warn!(error = %e, "Offset commit failed"),
        }
    }
}

/// Kafka consumer that fans messages out to one claim per partition
///
/// This consumer is configured for:
/// - Manual offset commits (after a terminal decision, per partition)
/// - Consumer group coordination (multiple validator instances)
/// - Per-partition backpressure (pause while the claim is behind)
pub struct ClaimConsumer {
    consumer: Arc<StreamConsumer<ClaimContext>>,
    registry: Arc<ClaimRegistry>,
    topic: String,
}

enum Event {
    Shutdown,
    Message(KafkaResult<MessageEnvelope>),
    WorkerDone(Result<WorkerExit, JoinError>),
    Tick,
}

impl ClaimConsumer {
    /// Create a new Kafka consumer subscribed to `config.topic`.
    ///
    /// # Configuration
    /// - `enable.auto.commit=false`: Manual offset management.
    /// - `auto.offset.reset=earliest`: Read from beginning on first start.
    /// - `session.timeout.ms=30000`: 30s session timeout.
    /// - `heartbeat.interval.ms=3000`: 3s heartbeat interval.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!("Initializing Kafka consumer...");
        let mut client_config = create_client_config(config)?;
        let registry = Arc::new(ClaimRegistry::default());

        let consumer: StreamConsumer<ClaimContext> = client_config
            .set("group.id", &config.consumer_group)
            // Offset management
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            // Performance
            .set("fetch.min.bytes", "1")
            .set("fetch.wait.max.ms", "500")
            .set("max.partition.fetch.bytes", "1048576")
            // Session management
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .create_with_context(ClaimContext::new(Arc::clone(&registry)))
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.topic])
            .context("Failed to subscribe to Kafka topic")?;

        info!(
            topic = %config.topic,
            consumer_group = %config.consumer_group,
            "Kafka consumer initialized"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            registry,
            topic: config.topic.clone(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Dispatch messages until `shutdown` fires.
    ///
    /// A failing claim restarts its own partition from the last commit.
    /// Only a dispatcher failure ends the loop early and is returned.
    pub async fn run(&self, handler: Arc<dyn ClaimHandler>, shutdown: Shutdown) -> Result<()> {
        let partitions = Arc::new(KafkaPartitions {
            consumer: Arc::clone(&self.consumer),
        });
        let mut dispatcher = Dispatcher::new(
            partitions,
            handler,
            shutdown.clone(),
            Arc::clone(&self.registry),
        );
        let mut tick = tokio::time::interval(MAINTENANCE_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut outcome: Result<()> = Ok(());

        info!(topic = %self.topic, "Dispatcher started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Event::Shutdown,
                Some(done) = dispatcher.join_next() => Event::WorkerDone(done),
                _ = tick.tick() => Event::Tick,
                received = self.consumer.recv() => {
                    Event::Message(received.map(|message| MessageEnvelope::from_message(&message)))
                }
            };

            // Rebalances run inside recv(); settle them before routing anything
            dispatcher.retire(self.registry.take_revoked());

            match event {
                Event::Shutdown => {
                    info!("Shutdown requested; stopping dispatcher");
                    break;
                }
                Event::WorkerDone(done) => {
                    if let Err(e) = dispatcher.on_worker_done(done) {
                        outcome = Err(e);
                        break;
                    }
                }
                Event::Tick => dispatcher.maintain(),
                Event::Message(Ok(envelope)) => dispatcher.dispatch(envelope),
                Event::Message(Err(e)) => {
                    warn!(error = %e, "Kafka consumer error");
                }
            }
        }

        let stopped = dispatcher.shutdown().await;
        info!("Dispatcher stopped");
        outcome.and(stopped)
    }
}

fn partition_list(key: &ClaimKey) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition(&key.0, key.1);
    tpl
}

/// Partition operations on the shared consumer
struct KafkaPartitions {
    consumer: Arc<StreamConsumer<ClaimContext>>,
}

impl PartitionControl for KafkaPartitions {
    fn pause(&self, key: &ClaimKey) -> Result<()> {
        self.consumer
            .pause(&partition_list(key))
            .context("Failed to pause partition")
    }

    fn resume(&self, key: &ClaimKey) -> Result<()> {
        self.consumer
            .resume(&partition_list(key))
            .context("Failed to resume partition")
    }

    fn rewind_to_committed(&self, key: &ClaimKey) -> Result<()> {
        let committed = self
            .consumer
            .committed_offsets(partition_list(key), COMMITTED_TIMEOUT)
            .context("Failed to fetch committed offset")?;

        // Nothing committed yet: start over, as auto.offset.reset=earliest would
        let offset = match committed.find_partition(&key.0, key.1).map(|elem| elem.offset()) {
            Some(Offset::Offset(offset)) => Offset::Offset(offset),
            _ => Offset::Beginning,
        };

        self.consumer
            .seek(&key.0, key.1, offset, SEEK_TIMEOUT)
            .context("Failed to seek consumer")?;

        info!(
            topic = %key.0,
            partition = key.1,
            offset = ?offset,
            "Partition rewound to last commit"
        );
        Ok(())
    }

    fn session(
        &self,
        key: &ClaimKey,
        shutdown: Shutdown,
        epoch: Arc<AtomicU64>,
    ) -> Box<dyn ClaimSession> {
        Box::new(KafkaClaimSession {
            consumer: Arc::clone(&self.consumer),
            topic: key.0.clone(),
            partition: key.1,
            shutdown,
            epoch,
        })
    }
}

/// Broker side of one partition claim
pub struct KafkaClaimSession {
    consumer: Arc<StreamConsumer<ClaimContext>>,
    topic: String,
    partition: i32,
    shutdown: Shutdown,
    epoch: Arc<AtomicU64>,
}

#[async_trait]
impl ClaimSession for KafkaClaimSession {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Commit `offset + 1` for this partition only
    async fn commit(&self, message: &MessageEnvelope) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .context("Failed to build commit offsets")?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .context("Failed to commit offset")?;

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Offset committed"
        );
        Ok(())
    }

    async fn redeliver(&self, message: &MessageEnvelope) -> Result<u64> {
        // Bumped first: whatever the dispatcher receives from here on is tagged new
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                SEEK_TIMEOUT,
            )
            .context("Failed to seek consumer")?;

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            epoch,
            "Partition rewound for redelivery"
        );
        Ok(epoch)
    }
}
