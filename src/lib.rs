// ============================================================================
// Vote Validator
// ============================================================================
//
// Consumes votes from Kafka, verifies each voter against the identity
// registry and forwards the result to the chain topic. Votes the registry
// could not be asked about are parked on <topic>.dead; an instance consuming
// the dead-letter topic retries them at a steady pace.
//
// Architecture:
// - One claim per assigned partition, processed strictly in offset order
// - Offsets committed only after a terminal decision (at-least-once)
// - Health/metrics server alongside the dispatcher
//
// ============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use validator_config::Config;

pub mod authority;
pub mod claim;
pub mod error;
pub mod health;
pub mod kafka;
pub mod router;
pub mod shutdown;
pub mod utils;

use authority::HttpAuthority;
use claim::{ClaimHandler, ConsumerMode, ValidateVoterHandler};
use health::{AuthorityProbe, KafkaProbe, Probe};
use kafka::{ClaimConsumer, MessageProducer, RecordProducer};
use shutdown::ShutdownTrigger;

/// Build the handler for the configured mode
pub fn build_handler(
    config: &Config,
    authority: Arc<HttpAuthority>,
    producer: Arc<dyn RecordProducer>,
) -> ValidateVoterHandler {
    let builder = ValidateVoterHandler::builder(config.kafka.chain_topic.clone(), authority, producer)
        .strict_structural_validation(config.processing.strict_structural_validation)
        .rejection_policy(config.processing.rejection_policy)
        .hash_salt(config.logging.hash_salt.clone());

    match ConsumerMode::from_topic_is_dead(config.kafka.topic_is_dead) {
        ConsumerMode::DeadLetter => builder
            .dead_letter(config.kafka.consumption_interval)
            .build(),
        ConsumerMode::Normal => builder.build(),
    }
}

/// Run the validator until SIGINT/SIGTERM or a dispatcher failure
pub async fn run(config: Config) -> Result<()> {
    let mode = ConsumerMode::from_topic_is_dead(config.kafka.topic_is_dead);
    info!(
        topic = %config.kafka.topic,
        chain_topic = %config.kafka.chain_topic,
        dead_letter_topic = %config.kafka.dead_letter_topic(),
        mode = mode.as_str(),
        "=== Vote Validator Starting ==="
    );

    let authority = Arc::new(
        HttpAuthority::new(&config.authority).context("Failed to create authority client")?,
    );
    let producer = MessageProducer::new(&config.kafka).context("Failed to create Kafka producer")?;
    let record_producer: Arc<dyn RecordProducer> = Arc::new(producer.clone());
    let consumer = ClaimConsumer::new(&config.kafka).context("Failed to create Kafka consumer")?;

    let handler: Arc<dyn ClaimHandler> = Arc::new(build_handler(
        &config,
        Arc::clone(&authority),
        Arc::clone(&record_producer),
    ));

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(watch_signals(trigger));

    // Health server
    let probes: Vec<Arc<dyn Probe>> = vec![
        Arc::new(KafkaProbe::new(&config.kafka, Arc::clone(&record_producer))?),
        Arc::new(AuthorityProbe::new(Arc::clone(&authority))),
    ];
    let listener = TcpListener::bind(&config.web.addr)
        .await
        .context("Failed to bind health server")?;
    let (web_trigger, web_shutdown) = shutdown.child();
    let web = tokio::spawn(health::serve(
        listener,
        health::router(probes),
        web_shutdown,
    ));

    let dispatched = consumer.run(handler, shutdown.clone()).await;
    if let Err(e) = &dispatched {
        error!(error = %e, "Dispatcher failed");
    }

    // The dispatcher may have stopped on its own; the health server goes with it
    web_trigger.trigger();
    match tokio::time::timeout(config.web.shutdown_timeout, web).await {
        Ok(Ok(Err(e))) => error!(error = %e, "Health server failed"),
        Ok(Err(e)) => error!(error = %e, "Health server task panicked"),
        Err(_) => error!("Health server did not stop in time"),
        Ok(Ok(Ok(()))) => {}
    }

    if let Err(e) = producer.flush(config.kafka.producer_timeout) {
        error!(error = %e, "Failed to flush Kafka producer");
    }

    info!("=== Vote Validator Stopped ===");
    dispatched
}

async fn watch_signals(trigger: ShutdownTrigger) {
    wait_for_signal().await;
    info!("Shutdown signal received. Shutting down...");
    trigger.trigger();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
