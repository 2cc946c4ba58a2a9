use std::time::Duration;

use crate::constants::{DEFAULT_WEB_ADDR, DEFAULT_WEB_SHUTDOWN_TIMEOUT_SECS};

/// Health/metrics HTTP server settings
#[derive(Clone, Debug)]
pub struct WebConfig {
    pub addr: String,
    pub shutdown_timeout: Duration,
}

impl WebConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            addr: std::env::var("WEB_ADDR").unwrap_or_else(|_| DEFAULT_WEB_ADDR.to_string()),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WEB_SHUTDOWN_TIMEOUT_SECS")
                    .unwrap_or_else(|_| DEFAULT_WEB_SHUTDOWN_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_WEB_SHUTDOWN_TIMEOUT_SECS),
            ),
        }
    }
}
