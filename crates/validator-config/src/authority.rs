// ============================================================================
// Validation Authority Configuration
// ============================================================================

use anyhow::{Context, Result};
use std::time::Duration;

use crate::constants::{DEFAULT_AUTHORITY_TIMEOUT_SECS, DEFAULT_NOT_FOUND_CODES};

/// External identity registry the validator checks voters against
#[derive(Clone, Debug)]
pub struct AuthorityConfig {
    /// Base URL, always carrying a scheme (e.g., "http://registry:8080")
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Error codes in a 400 response that mean the voter does not exist
    pub not_found_codes: Vec<i64>,
}

impl AuthorityConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let raw_url = std::env::var("AUTHORITY_URL")
            .or_else(|_| std::env::var("GOSUSLUGI_HOST"))
            .context("AUTHORITY_URL must be set")?;

        let not_found_codes = match std::env::var("AUTHORITY_NOT_FOUND_CODES") {
            Ok(raw) => parse_codes(&raw).context("Invalid AUTHORITY_NOT_FOUND_CODES")?,
            Err(_) => DEFAULT_NOT_FOUND_CODES.to_vec(),
        };

        Ok(Self {
            base_url: normalize_base_url(&raw_url),
            timeout: Duration::from_secs(
                std::env::var("AUTHORITY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| DEFAULT_AUTHORITY_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_AUTHORITY_TIMEOUT_SECS),
            ),
            not_found_codes,
        })
    }
}

/// Prefix bare hosts with `http://` and drop trailing slashes
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn parse_codes(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            code.parse::<i64>()
                .with_context(|| format!("invalid error code {:?}", code))
        })
        .collect()
}
