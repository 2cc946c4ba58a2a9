// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Salt mixed into hashed identifiers (passports) before they are logged
    pub hash_salt: String,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let salt = std::env::var("LOG_HASH_SALT").unwrap_or_default();
        if salt.is_empty() || salt == "default-salt-please-change" {
            anyhow::bail!("LOG_HASH_SALT must be set to a unique, secret value");
        }
        Ok(Self { hash_salt: salt })
    }
}
