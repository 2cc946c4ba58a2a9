// ============================================================================
// Configuration Constants
// ============================================================================

use std::time::Duration;

pub(crate) const DEFAULT_CONSUMER_GROUP_ID: &str = "validator";
pub(crate) const DEFAULT_CONSUMPTION_INTERVAL: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_PRODUCER_TIMEOUT_MS: u64 = 5000;

pub(crate) const DEFAULT_AUTHORITY_TIMEOUT_SECS: u64 = 10;
// Authority error code meaning "no user with this passport"
pub(crate) const DEFAULT_NOT_FOUND_CODES: &[i64] = &[2];

pub(crate) const DEFAULT_WEB_ADDR: &str = "0.0.0.0:3000";
pub(crate) const DEFAULT_WEB_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

pub(crate) const DEFAULT_RUST_LOG: &str = "info";

/// Suffix appended to a source topic to derive its dead-letter topic
pub const DEAD_LETTER_SUFFIX: &str = ".dead";
