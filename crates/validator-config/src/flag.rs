use anyhow::{Context, Result, bail};

/// Parse a boolean switch the way the deployment manifests write them.
///
/// Accepts `1`, `t`, `T`, `true`, `TRUE`, `True` and their false
/// counterparts. Anything else is an error rather than a silent `false`.
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => bail!("invalid boolean {:?} (expected true|false|1|0)", other),
    }
}

/// Read boolean `name`; unset means false
pub(crate) fn env_flag(name: &str) -> Result<bool> {
    match std::env::var(name) {
        Ok(raw) => parse_bool(&raw).with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(false),
    }
}
