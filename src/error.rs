use thiserror::Error;
use validator_types::CodecError;

pub type ClaimResult<T> = Result<T, ClaimError>;

/// Failures that end a partition claim
///
/// Everything permanent about a single vote (rejections, invalid input,
/// skipped malformed records) is resolved inside the claim loop and never
/// shows up here. What remains needs the broker to reassign the partition
/// and resume from the last committed offset.
#[derive(Error, Debug)]
pub enum ClaimError {
    // ===== Record Errors =====
    #[error("malformed record at {topic}/{partition}@{offset}: {source}")]
    Malformed {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: CodecError,
    },

    // ===== Kafka Errors =====
    #[error("failed to send message to topic {topic:?}: {source:#}")]
    Publish {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to commit offset {offset} on {topic}/{partition}: {source:#}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to rewind {topic}/{partition} to offset {offset}: {source:#}")]
    Redeliver {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: anyhow::Error,
    },

    // ===== Worker Errors =====
    #[error("claim on {topic}/{partition} panicked")]
    Panicked { topic: String, partition: i32 },
}

impl ClaimError {
    /// Short machine-readable code for logs and metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            ClaimError::Malformed { .. } => "MALFORMED_RECORD",
            ClaimError::Publish { .. } => "PUBLISH_FAILED",
            ClaimError::Commit { .. } => "COMMIT_FAILED",
            ClaimError::Redeliver { .. } => "REDELIVER_FAILED",
            ClaimError::Panicked { .. } => "CLAIM_PANICKED",
        }
    }
}
