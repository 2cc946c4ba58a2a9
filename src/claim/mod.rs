// ============================================================================
// Partition Claims
// ============================================================================
//
// A claim is one assigned (topic, partition) and the ordered stream of its
// messages. A ClaimHandler consumes it sequentially; the ClaimSession is the
// handler's only way back to the broker (commit, redeliver) and carries the
// shutdown signal for this partition.
//
// ============================================================================

pub mod backoff;
pub mod dispatcher;
pub mod handler;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ClaimResult;
use crate::kafka::MessageEnvelope;
use crate::shutdown::Shutdown;

pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff};
pub use dispatcher::{ClaimKey, ClaimRegistry, Dispatcher, PartitionControl};
pub use handler::{ProcessResult, ValidateVoterHandler, ValidateVoterHandlerBuilder};

/// Which topic an instance consumes, and therefore how it treats transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerMode {
    /// Primary topic: escalate transient failures to the dead-letter topic
    #[default]
    Normal,
    /// Dead-letter topic: pace consumption and block on transient failures
    DeadLetter,
}

impl ConsumerMode {
    pub fn from_topic_is_dead(topic_is_dead: bool) -> Self {
        if topic_is_dead {
            ConsumerMode::DeadLetter
        } else {
            ConsumerMode::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerMode::Normal => "normal",
            ConsumerMode::DeadLetter => "dead_letter",
        }
    }
}

/// Messages of one partition, in offset order
pub struct Claim {
    topic: String,
    partition: i32,
    messages: mpsc::Receiver<MessageEnvelope>,
}

impl Claim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        messages: mpsc::Receiver<MessageEnvelope>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            messages,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Next message, or `None` once the dispatcher has closed the claim
    pub async fn next(&mut self) -> Option<MessageEnvelope> {
        self.messages.recv().await
    }
}

/// Broker-facing side of a claim
#[async_trait]
pub trait ClaimSession: Send + Sync {
    fn topic(&self) -> &str;

    fn partition(&self) -> i32;

    /// Fires on process shutdown or when the partition is revoked
    fn shutdown(&self) -> &Shutdown;

    /// Acknowledge `message`: the group resumes after it on reassignment
    async fn commit(&self, message: &MessageEnvelope) -> anyhow::Result<()>;

    /// Rewind the partition so `message` is delivered again.
    ///
    /// Returns the partition's new rewind epoch: anything the claim still
    /// holds with an older epoch was buffered before the rewind.
    async fn redeliver(&self, message: &MessageEnvelope) -> anyhow::Result<u64>;
}

/// Lifecycle of a partition claim
#[async_trait]
pub trait ClaimHandler: Send + Sync {
    async fn setup(&self, _session: &dyn ClaimSession) -> ClaimResult<()> {
        Ok(())
    }

    /// Process the claim until it closes or shutdown fires.
    /// An error ends the claim without committing the failing message.
    async fn consume_claim(&self, session: &dyn ClaimSession, claim: &mut Claim)
    -> ClaimResult<()>;

    async fn cleanup(&self, _session: &dyn ClaimSession) -> ClaimResult<()> {
        Ok(())
    }
}

/// Run a full claim lifecycle. Cleanup runs even when consumption fails.
pub async fn run_claim<H>(
    handler: &H,
    session: &dyn ClaimSession,
    claim: &mut Claim,
) -> ClaimResult<()>
where
    H: ClaimHandler + ?Sized,
{
    handler.setup(session).await?;
    let consumed = handler.consume_claim(session, claim).await;
    let cleaned = handler.cleanup(session).await;
    consumed.and(cleaned)
}
