use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Number of hash bytes kept in log output
const LOG_HASH_BYTES: usize = 4;

/// Salted, truncated SHA-256 of an identifier, safe to put in logs.
///
/// Passports are personal data; every log line that needs to correlate a
/// voter uses this instead of the raw value.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(id.as_bytes())
        .finalize();

    digest[..LOG_HASH_BYTES]
        .iter()
        .fold(String::with_capacity(LOG_HASH_BYTES * 2), |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        })
}
