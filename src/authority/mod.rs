// ============================================================================
// Validation Authority
// ============================================================================
//
// Boundary to the external identity registry. One lookup per vote, keyed by
// passport. The raw HTTP response is classified into a VerificationOutcome
// here; deciding what that means for the vote is the router's job.
//
// ============================================================================

pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;
use validator_types::Voter;

use crate::shutdown::Shutdown;

pub use client::HttpAuthority;

/// Semantic result of one authority lookup
#[derive(Debug)]
pub enum VerificationOutcome {
    /// Registry returned a (possibly updated) voter record
    Updated(Voter),
    /// Registry definitively says the voter is invalid
    Rejected(String),
    /// Registry refused the request itself; a defect on our side
    InvalidInput(String),
    /// Registry unreachable or failing; worth retrying later
    Transient(AuthorityError),
    /// Shutdown fired while the lookup was in flight
    Cancelled,
}

impl VerificationOutcome {
    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationOutcome::Updated(_) => "updated",
            VerificationOutcome::Rejected(_) => "rejected",
            VerificationOutcome::InvalidInput(_) => "invalid_input",
            VerificationOutcome::Transient(_) => "transient",
            VerificationOutcome::Cancelled => "cancelled",
        }
    }
}

/// Why a lookup failed transiently
#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("failed to validate voter: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authority responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode authority response ({status}): {reason}")]
    MalformedResponse { status: u16, reason: String },
}

/// Anything that can verify a voter's identity
#[async_trait]
pub trait VoterAuthority: Send + Sync {
    /// Look the voter up. Must return `Cancelled` promptly once `shutdown` fires.
    async fn verify(&self, shutdown: &Shutdown, voter: &Voter) -> VerificationOutcome;
}
