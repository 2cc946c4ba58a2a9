use anyhow::{Context, Result, bail};
use std::time::Duration;

/// Parse a human readable duration such as `10s`, `500ms`, `2m` or `1h`.
///
/// A bare number is read as seconds, matching how the intervals were
/// configured before units were accepted.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("duration must not be empty");
    }

    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (value, unit) = raw.split_at(split);

    let value: u64 = value
        .parse()
        .with_context(|| format!("invalid duration value in {:?}", raw))?;

    let duration = match unit.trim() {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(scale(value, 60, raw)?),
        "h" => Duration::from_secs(scale(value, 3600, raw)?),
        other => bail!("unknown duration unit {:?} in {:?}", other, raw),
    };

    Ok(duration)
}

fn scale(value: u64, factor: u64, raw: &str) -> Result<u64> {
    match value.checked_mul(factor) {
        Some(secs) => Ok(secs),
        None => bail!("duration {:?} is out of range", raw),
    }
}
