// ============================================================================
// ValidateVoterHandler
// ============================================================================
//
// Per message:  decode → authority lookup → route → act → commit
//
//   Forward / Reject(forward)  produce re-encoded vote to the chain topic
//   Reject(drop) / Skip        nothing produced
//   DeadLetter                 produce the raw payload to <topic>.dead
//   RetryLater                 no commit; sleep, rewind, drop what was buffered
//                              before the rewind
//   Abort                      no commit; claim ends
//
// A produce, commit or rewind failure ends the claim with the failing message
// uncommitted. In dead-letter mode every commit is followed by the pacing delay.
//
// ============================================================================

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use validator_config::{RejectionPolicy, dead_letter_topic};
use validator_metrics::{
    MALFORMED_RECORDS_TOTAL, MESSAGES_CONSUMED_TOTAL, OFFSETS_COMMITTED_TOTAL,
    RECORDS_PRODUCED_TOTAL, REDELIVERIES_TOTAL, ROUTING_DECISIONS_TOTAL,
};
use validator_types::{Vote, decode_with_voter, encode};

use super::backoff::{BackoffPolicy, FixedBackoff};
use super::{Claim, ClaimHandler, ClaimSession, ConsumerMode};
use crate::authority::VoterAuthority;
use crate::error::{ClaimError, ClaimResult};
use crate::kafka::{MessageEnvelope, RecordProducer};
use crate::router::{Router, RoutingDecision};
use crate::utils::log_safe_id;

/// What the claim loop does with a message after processing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    Commit,
    Redeliver,
    Abort,
}

pub struct ValidateVoterHandler {
    chain_topic: String,
    authority: Arc<dyn VoterAuthority>,
    producer: Arc<dyn RecordProducer>,
    mode: ConsumerMode,
    backoff: Arc<dyn BackoffPolicy>,
    strict_structural_validation: bool,
    router: Router,
    hash_salt: String,
}

pub struct ValidateVoterHandlerBuilder {
    chain_topic: String,
    authority: Arc<dyn VoterAuthority>,
    producer: Arc<dyn RecordProducer>,
    mode: ConsumerMode,
    backoff: Option<Arc<dyn BackoffPolicy>>,
    strict_structural_validation: bool,
    rejection_policy: RejectionPolicy,
    hash_salt: String,
}

impl ValidateVoterHandler {
    pub fn builder(
        chain_topic: impl Into<String>,
        authority: Arc<dyn VoterAuthority>,
        producer: Arc<dyn RecordProducer>,
    ) -> ValidateVoterHandlerBuilder {
        ValidateVoterHandlerBuilder {
            chain_topic: chain_topic.into(),
            authority,
            producer,
            mode: ConsumerMode::Normal,
            backoff: None,
            strict_structural_validation: false,
            rejection_policy: RejectionPolicy::default(),
            hash_salt: String::new(),
        }
    }

    /// Decode, verify, route and act on one message. Never commits.
    pub async fn process_message(
        &self,
        session: &dyn ClaimSession,
        message: &MessageEnvelope,
    ) -> ClaimResult<ProcessResult> {
        MESSAGES_CONSUMED_TOTAL.inc();

        let (vote, voter) = match decode_with_voter(&message.payload) {
            Ok(decoded) => decoded,
            Err(source) => {
                MALFORMED_RECORDS_TOTAL.inc();
                if self.strict_structural_validation {
                    return Err(ClaimError::Malformed {
                        topic: message.topic.clone(),
                        partition: message.partition,
                        offset: message.offset,
                        source,
                    });
                }
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %source,
                    "Skipping malformed vote"
                );
                return Ok(ProcessResult::Commit);
            }
        };

        let candidate_id = vote.candidate_id;
        let passport_hash = log_safe_id(&voter.passport, &self.hash_salt);

        let outcome = self.authority.verify(session.shutdown(), &voter).await;

        let decision = self.router.route(vote, outcome);
        ROUTING_DECISIONS_TOTAL
            .with_label_values(&[decision.kind()])
            .inc();

        match decision {
            RoutingDecision::Forward(vote) => {
                self.publish_vote(message, &vote).await?;
                info!(
                    offset = message.offset,
                    candidate_id,
                    passport_hash = %passport_hash,
                    status = vote.status().as_str_name(),
                    "Vote forwarded to chain"
                );
                Ok(ProcessResult::Commit)
            }
            RoutingDecision::Reject { vote, forward } => {
                let reason = vote.fail_reason.clone().unwrap_or_default();
                if forward {
                    self.publish_vote(message, &vote).await?;
                    info!(
                        offset = message.offset,
                        candidate_id,
                        passport_hash = %passport_hash,
                        reason = %reason,
                        "Rejected vote forwarded to chain"
                    );
                } else {
                    info!(
                        offset = message.offset,
                        candidate_id,
                        passport_hash = %passport_hash,
                        reason = %reason,
                        "Rejected vote dropped"
                    );
                }
                Ok(ProcessResult::Commit)
            }
            RoutingDecision::Skip { reason } => {
                error!(
                    offset = message.offset,
                    candidate_id,
                    passport_hash = %passport_hash,
                    reason = %reason,
                    "Authority refused the request; skipping vote"
                );
                Ok(ProcessResult::Commit)
            }
            RoutingDecision::DeadLetter { reason } => {
                let topic = dead_letter_topic(&message.topic);
                self.producer
                    .send(&topic, message.key.as_deref(), &message.payload)
                    .await
                    .map_err(|source| ClaimError::Publish {
                        topic: topic.clone(),
                        source,
                    })?;
                RECORDS_PRODUCED_TOTAL
                    .with_label_values(&["dead_letter"])
                    .inc();
                warn!(
                    offset = message.offset,
                    candidate_id,
                    passport_hash = %passport_hash,
                    dead_letter_topic = %topic,
                    reason = %reason,
                    "Vote moved to dead-letter topic"
                );
                Ok(ProcessResult::Commit)
            }
            RoutingDecision::RetryLater { reason } => {
                warn!(
                    offset = message.offset,
                    candidate_id,
                    passport_hash = %passport_hash,
                    reason = %reason,
                    "Authority still unavailable; vote will be redelivered"
                );
                Ok(ProcessResult::Redeliver)
            }
            RoutingDecision::Abort => {
                debug!(offset = message.offset, "Verification cancelled");
                Ok(ProcessResult::Abort)
            }
        }
    }

    async fn publish_vote(&self, message: &MessageEnvelope, vote: &Vote) -> ClaimResult<()> {
        self.producer
            .send(&self.chain_topic, message.key.as_deref(), &encode(vote))
            .await
            .map_err(|source| ClaimError::Publish {
                topic: self.chain_topic.clone(),
                source,
            })?;
        RECORDS_PRODUCED_TOTAL.with_label_values(&["chain"]).inc();
        Ok(())
    }
}

impl ValidateVoterHandlerBuilder {
    /// Consume a dead-letter topic, pacing by `interval`
    pub fn dead_letter(mut self, interval: Duration) -> Self {
        self.mode = ConsumerMode::DeadLetter;
        if self.backoff.is_none() {
            self.backoff = Some(Arc::new(FixedBackoff::new(interval)));
        }
        self
    }

    pub fn backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn strict_structural_validation(mut self, strict: bool) -> Self {
        self.strict_structural_validation = strict;
        self
    }

    pub fn rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    pub fn hash_salt(mut self, salt: impl Into<String>) -> Self {
        self.hash_salt = salt.into();
        self
    }

    pub fn build(self) -> ValidateVoterHandler {
        ValidateVoterHandler {
            chain_topic: self.chain_topic,
            authority: self.authority,
            producer: self.producer,
            mode: self.mode,
            backoff: self
                .backoff
                .unwrap_or_else(|| Arc::new(FixedBackoff::new(Duration::ZERO))),
            strict_structural_validation: self.strict_structural_validation,
            router: Router::new(self.mode, self.rejection_policy),
            hash_salt: self.hash_salt,
        }
    }
}

#[async_trait]
impl ClaimHandler for ValidateVoterHandler {
    async fn setup(&self, session: &dyn ClaimSession) -> ClaimResult<()> {
        info!(
            topic = %session.topic(),
            partition = session.partition(),
            mode = self.mode.as_str(),
            "Partition claimed"
        );
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: &dyn ClaimSession,
        claim: &mut Claim,
    ) -> ClaimResult<()> {
        let shutdown = session.shutdown();
        // Offset being redelivered and the epoch its rewind started
        let mut awaiting: Option<(i64, u64)> = None;
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = claim.next() => match next {
                    Some(message) => message,
                    None => break,
                },
            };

            if let Some((offset, epoch)) = awaiting {
                if message.epoch < epoch {
                    debug!(
                        offset = message.offset,
                        awaiting = offset,
                        "Discarding message buffered before rewind"
                    );
                    continue;
                }
                if message.offset != offset {
                    // Retention removed the record between attempts
                    warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        expected = offset,
                        offset = message.offset,
                        "Rewound record is gone; resuming from the next available offset"
                    );
                }
                awaiting = None;
            }

            match self.process_message(session, &message).await? {
                ProcessResult::Commit => {
                    session
                        .commit(&message)
                        .await
                        .map_err(|source| ClaimError::Commit {
                            topic: message.topic.clone(),
                            partition: message.partition,
                            offset: message.offset,
                            source,
                        })?;
                    OFFSETS_COMMITTED_TOTAL.inc();
                    attempt = 0;

                    if self.mode == ConsumerMode::DeadLetter
                        && !shutdown.sleep(self.backoff.pacing()).await
                    {
                        break;
                    }
                }
                ProcessResult::Redeliver => {
                    attempt = attempt.saturating_add(1);
                    if !shutdown.sleep(self.backoff.retry_delay(attempt)).await {
                        break;
                    }
                    let epoch = session.redeliver(&message).await.map_err(|source| {
                        ClaimError::Redeliver {
                            topic: message.topic.clone(),
                            partition: message.partition,
                            offset: message.offset,
                            source,
                        }
                    })?;
                    REDELIVERIES_TOTAL.inc();
                    awaiting = Some((message.offset, epoch));
                }
                ProcessResult::Abort => break,
            }
        }

        Ok(())
    }

    async fn cleanup(&self, session: &dyn ClaimSession) -> ClaimResult<()> {
        info!(
            topic = %session.topic(),
            partition = session.partition(),
            "Partition claim closed"
        );
        Ok(())
    }
}
