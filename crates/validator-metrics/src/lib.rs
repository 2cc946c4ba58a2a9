//! Prometheus metrics for the vote validator
//!
//! Provides centralized metrics collection for monitoring:
//! - Message consumption and commits
//! - Validation outcomes and routing decisions
//! - Authority latency
//! - Claim restarts and Kafka produce failures

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder, opts, register_histogram,
    register_int_counter, register_int_counter_vec,
};

// ============================================================================
// Consumption Metrics
// ============================================================================

/// Messages pulled from the consumed topic
pub static MESSAGES_CONSUMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "validator_messages_consumed_total",
        "Total number of messages claimed from the consumed topic"
    ))
    .expect("Failed to register MESSAGES_CONSUMED_TOTAL metric")
});

/// Offsets committed after a terminal decision
pub static OFFSETS_COMMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "validator_offsets_committed_total",
        "Total number of offsets committed after a terminal decision"
    ))
    .expect("Failed to register OFFSETS_COMMITTED_TOTAL metric")
});

/// Records that failed to decode or were structurally invalid
pub static MALFORMED_RECORDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "validator_malformed_records_total",
        "Total number of undecodable or incomplete vote records"
    ))
    .expect("Failed to register MALFORMED_RECORDS_TOTAL metric")
});

// ============================================================================
// Validation Metrics
// ============================================================================

/// Authority outcomes (updated, rejected, invalid_input, transient, cancelled)
pub static VERIFICATION_OUTCOMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "validator_verification_outcomes_total",
            "Validation authority outcomes by kind"
        ),
        &["outcome"]
    )
    .expect("Failed to register VERIFICATION_OUTCOMES_TOTAL metric")
});

/// Authority request latency in seconds
pub static AUTHORITY_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "validator_authority_latency_seconds",
        "Validation authority request latency in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register AUTHORITY_LATENCY_SECONDS metric")
});

// ============================================================================
// Routing Metrics
// ============================================================================

/// Routing decisions (forward, reject, skip, dead_letter, retry_later, abort)
pub static ROUTING_DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "validator_routing_decisions_total",
            "Routing decisions taken per message"
        ),
        &["decision"]
    )
    .expect("Failed to register ROUTING_DECISIONS_TOTAL metric")
});

/// Messages handed back to the broker for redelivery (dead-letter mode)
pub static REDELIVERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "validator_redeliveries_total",
        "Total number of messages left uncommitted for redelivery"
    ))
    .expect("Failed to register REDELIVERIES_TOTAL metric")
});

/// Claims that ended with an error and were restarted from the last commit
pub static CLAIM_RESTARTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "validator_claim_restarts_total",
            "Partition claims restarted after a failure, by error code"
        ),
        &["error_code"]
    )
    .expect("Failed to register CLAIM_RESTARTS_TOTAL metric")
});

// ============================================================================
// Kafka Producer Metrics
// ============================================================================

/// Produced records by destination kind (chain, dead_letter)
pub static RECORDS_PRODUCED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "validator_records_produced_total",
            "Records produced by destination kind"
        ),
        &["destination"]
    )
    .expect("Failed to register RECORDS_PRODUCED_TOTAL metric")
});

pub static PRODUCE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "validator_produce_failures_total",
        "Total number of failed Kafka produce operations"
    ))
    .expect("Failed to register PRODUCE_FAILURES_TOTAL metric")
});

// ============================================================================
// Metrics Collection
// ============================================================================

/// Gather all registered metrics and encode as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
