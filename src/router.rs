// ============================================================================
// Outcome Router
// ============================================================================
//
// Turns an authority outcome into what the claim loop does with the message.
// Pure: no I/O, no logging. The same vote and outcome always route the same
// way, which is what makes dead-letter replays idempotent.
//
//   Updated       → Forward (voter replaced) | Reject (name mismatch, dead)
//   Rejected      → Reject (status FAIL + reason)
//   InvalidInput  → Skip
//   Transient     → DeadLetter (normal mode) | RetryLater (dead-letter mode)
//   Cancelled     → Abort
//
// ============================================================================

use validator_config::RejectionPolicy;
use validator_types::{Vote, Voter};

use crate::authority::VerificationOutcome;
use crate::claim::ConsumerMode;

/// What to do with one message
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Publish the (possibly updated) vote to the chain topic
    Forward(Vote),
    /// Vote failed verification; `vote` already carries FAIL and its reason
    Reject { vote: Vote, forward: bool },
    /// Nothing to publish; consume the message and move on
    Skip { reason: String },
    /// Copy the original payload to the dead-letter topic
    DeadLetter { reason: String },
    /// Leave the message uncommitted and have it redelivered after a pause
    RetryLater { reason: String },
    /// Stop without committing
    Abort,
}

impl RoutingDecision {
    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingDecision::Forward(_) => "forward",
            RoutingDecision::Reject { .. } => "reject",
            RoutingDecision::Skip { .. } => "skip",
            RoutingDecision::DeadLetter { .. } => "dead_letter",
            RoutingDecision::RetryLater { .. } => "retry_later",
            RoutingDecision::Abort => "abort",
        }
    }

    /// Whether the message's offset may be committed once the decision is carried out
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RoutingDecision::RetryLater { .. } | RoutingDecision::Abort
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Router {
    mode: ConsumerMode,
    rejection_policy: RejectionPolicy,
}

impl Router {
    pub fn new(mode: ConsumerMode, rejection_policy: RejectionPolicy) -> Self {
        Self {
            mode,
            rejection_policy,
        }
    }

    pub fn route(&self, mut vote: Vote, outcome: VerificationOutcome) -> RoutingDecision {
        match outcome {
            VerificationOutcome::Updated(updated) => {
                let original = vote.voter.take().unwrap_or_default();
                match reconcile(&original, updated) {
                    Ok(voter) => {
                        vote.voter = Some(voter);
                        RoutingDecision::Forward(vote)
                    }
                    Err(reason) => {
                        vote.voter = Some(original);
                        self.reject(vote, reason)
                    }
                }
            }
            VerificationOutcome::Rejected(reason) => self.reject(vote, reason),
            VerificationOutcome::InvalidInput(reason) => RoutingDecision::Skip { reason },
            VerificationOutcome::Transient(err) => {
                let reason = err.to_string();
                match self.mode {
                    ConsumerMode::Normal => RoutingDecision::DeadLetter { reason },
                    ConsumerMode::DeadLetter => RoutingDecision::RetryLater { reason },
                }
            }
            VerificationOutcome::Cancelled => RoutingDecision::Abort,
        }
    }

    fn reject(&self, mut vote: Vote, reason: String) -> RoutingDecision {
        vote.mark_failed(reason);
        RoutingDecision::Reject {
            vote,
            forward: self.rejection_policy == RejectionPolicy::Forward,
        }
    }
}

/// Accept the registry's copy of a voter only if it is the same living person
pub fn reconcile(original: &Voter, updated: Voter) -> Result<Voter, String> {
    if updated.fullname != original.fullname {
        return Err("fullnames don't match".to_string());
    }
    if let Some(date) = updated.died_on() {
        return Err(format!("voter died in {}", date));
    }
    if updated.death_date.is_some() {
        return Err("voter died".to_string());
    }
    Ok(updated)
}
