// ============================================================================
// HTTP Authority Client
// ============================================================================
//
// POST {base}/api/users/passport  {"passport": "..."}
//
//   200 → Updated(voter)
//   400 → {"error", "code"}: not-found codes → Rejected, others → InvalidInput
//   *   → Transient (as are transport failures and undecodable bodies)
//
// ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Instant;
use tracing::{debug, warn};
use validator_config::AuthorityConfig;
use validator_metrics::{AUTHORITY_LATENCY_SECONDS, VERIFICATION_OUTCOMES_TOTAL};
use validator_types::Voter;

use super::types::{ErrorResponse, PassportRequest, VoterRecord};
use super::{AuthorityError, VerificationOutcome, VoterAuthority};
use crate::shutdown::Shutdown;

const PASSPORT_PATH: &str = "/api/users/passport";
const READINESS_PATH: &str = "/health/readiness";

/// Identity registry reached over HTTP
pub struct HttpAuthority {
    client: reqwest::Client,
    passport_url: String,
    readiness_url: String,
    not_found_codes: Vec<i64>,
}

impl HttpAuthority {
    pub fn new(config: &AuthorityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to create authority HTTP client")?;

        Ok(Self {
            client,
            passport_url: format!("{}{}", config.base_url, PASSPORT_PATH),
            readiness_url: format!("{}{}", config.base_url, READINESS_PATH),
            not_found_codes: config.not_found_codes.clone(),
        })
    }

    /// Reachability check used by the readiness probe
    pub async fn check_ready(&self) -> Result<()> {
        let res = self
            .client
            .get(&self.readiness_url)
            .send()
            .await
            .context("authority unreachable")?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("authority not ready ({}): {}", status, body);
        }
        Ok(())
    }

    async fn lookup(&self, voter: &Voter) -> VerificationOutcome {
        let res = match self
            .client
            .post(&self.passport_url)
            .json(&PassportRequest {
                passport: &voter.passport,
            })
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return VerificationOutcome::Transient(AuthorityError::Transport(e)),
        };

        let status = res.status();
        match res.bytes().await {
            Ok(body) => classify(status, &body, &voter.passport, &self.not_found_codes),
            Err(e) => VerificationOutcome::Transient(AuthorityError::Transport(e)),
        }
    }
}

#[async_trait]
impl VoterAuthority for HttpAuthority {
    async fn verify(&self, shutdown: &Shutdown, voter: &Voter) -> VerificationOutcome {
        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Shutdown during authority lookup, request aborted");
                VerificationOutcome::Cancelled
            }
            outcome = self.lookup(voter) => outcome,
        };

        AUTHORITY_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        VERIFICATION_OUTCOMES_TOTAL
            .with_label_values(&[outcome.kind()])
            .inc();

        outcome
    }
}

/// Map a registry response onto an outcome
pub fn classify(
    status: StatusCode,
    body: &[u8],
    original_passport: &str,
    not_found_codes: &[i64],
) -> VerificationOutcome {
    match status {
        StatusCode::OK => {
            let record: VoterRecord = match serde_json::from_slice(body) {
                Ok(record) => record,
                Err(e) => return malformed(status, e.to_string()),
            };
            match record.into_voter(original_passport) {
                Ok(voter) => VerificationOutcome::Updated(voter),
                Err(reason) => malformed(status, reason),
            }
        }
        StatusCode::BAD_REQUEST => {
            let err: ErrorResponse = match serde_json::from_slice(body) {
                Ok(err) => err,
                Err(e) => return malformed(status, e.to_string()),
            };
            if not_found_codes.contains(&err.code) {
                VerificationOutcome::Rejected(err.error)
            } else {
                warn!(
                    code = err.code,
                    error = %err.error,
                    "Authority rejected the request as invalid input"
                );
                VerificationOutcome::InvalidInput(err.error)
            }
        }
        other => VerificationOutcome::Transient(AuthorityError::Status {
            status: other.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        }),
    }
}

fn malformed(status: StatusCode, reason: String) -> VerificationOutcome {
    VerificationOutcome::Transient(AuthorityError::MalformedResponse {
        status: status.as_u16(),
        reason,
    })
}
