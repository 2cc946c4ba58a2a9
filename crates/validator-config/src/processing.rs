// ============================================================================
// Processing Policy Configuration
// ============================================================================

use anyhow::{Result, bail};
use std::str::FromStr;

use crate::flag::env_flag;

/// What happens to a vote the authority definitively rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RejectionPolicy {
    /// Forward it to the chain topic with FAIL status and a reason
    #[default]
    Forward,
    /// Log it and drop it without forwarding
    Drop,
}

impl FromStr for RejectionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "drop" => Ok(Self::Drop),
            other => bail!("unknown rejection policy {:?} (expected forward|drop)", other),
        }
    }
}

/// Knobs that decide how the claim loop treats permanent failures
#[derive(Clone, Debug, Default)]
pub struct ProcessingConfig {
    /// Halt the claim on undecodable or incomplete records instead of skipping them
    pub strict_structural_validation: bool,
    pub rejection_policy: RejectionPolicy,
}

impl ProcessingConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let rejection_policy = match std::env::var("VALIDATOR_REJECTION_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => RejectionPolicy::default(),
        };

        Ok(Self {
            strict_structural_validation: env_flag("VALIDATOR_STRICT_STRUCTURAL")?,
            rejection_policy,
        })
    }
}
