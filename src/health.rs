// ============================================================================
// Health and Metrics Server
// ============================================================================
//
// Endpoints:
// - GET /health/live       - Always {"status":"ok"} while the process runs
// - GET /health/readiness  - Runs every probe in order; first failure → 500
// - GET /metrics           - Prometheus metrics
//
// ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use validator_config::KafkaConfig;

use crate::authority::HttpAuthority;
use crate::kafka::{RecordProducer, create_client_config};
use crate::shutdown::Shutdown;

const HEALTH_TOPIC: &str = "health";
const ADMIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A dependency the service cannot work without
#[async_trait]
pub trait Probe: Send + Sync {
    /// Component name reported on failure
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<()>;
}

/// Round-trips topic create → produce → delete against the brokers
pub struct KafkaProbe {
    admin: AdminClient<DefaultClientContext>,
    producer: Arc<dyn RecordProducer>,
}

impl KafkaProbe {
    pub fn new(config: &KafkaConfig, producer: Arc<dyn RecordProducer>) -> Result<Self> {
        let admin = create_client_config(config)?
            .create()
            .context("Failed to create Kafka admin client")?;
        Ok(Self { admin, producer })
    }
}

#[async_trait]
impl Probe for KafkaProbe {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn check(&self) -> Result<()> {
        let options = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

        let created = self
            .admin
            .create_topics(
                &[NewTopic::new(HEALTH_TOPIC, 1, TopicReplication::Fixed(1))],
                &options,
            )
            .await
            .context("failed to create health topic")?;
        for result in created {
            match result {
                Ok(_) | Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((topic, code)) => anyhow::bail!("failed to create topic {}: {}", topic, code),
            }
        }

        self.producer
            .send(HEALTH_TOPIC, None, &[])
            .await
            .context("failed to produce to health topic")?;

        let deleted = self
            .admin
            .delete_topics(&[HEALTH_TOPIC], &options)
            .await
            .context("failed to delete health topic")?;
        for result in deleted {
            if let Err((topic, code)) = result {
                anyhow::bail!("failed to delete topic {}: {}", topic, code);
            }
        }

        Ok(())
    }
}

/// GET {authority}/health/readiness must answer 200
pub struct AuthorityProbe {
    authority: Arc<HttpAuthority>,
}

impl AuthorityProbe {
    pub fn new(authority: Arc<HttpAuthority>) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl Probe for AuthorityProbe {
    fn name(&self) -> &'static str {
        "authority"
    }

    async fn check(&self) -> Result<()> {
        self.authority.check_ready().await
    }
}

#[derive(Clone)]
struct HealthState {
    probes: Arc<Vec<Arc<dyn Probe>>>,
}

/// GET /health/live
async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// GET /health/readiness
async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    for probe in state.probes.iter() {
        if let Err(e) = probe.check().await {
            error!(component = probe.name(), error = %e, "Readiness check failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": format!("{}: {:#}", probe.name(), e)})),
            );
        }
    }
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// GET /metrics
async fn metrics() -> impl IntoResponse {
    match validator_metrics::gather_metrics() {
        Ok(metrics_data) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            metrics_data,
        ),
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                "Internal Server Error".to_string(),
            )
        }
    }
}

pub fn router(probes: Vec<Arc<dyn Probe>>) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(HealthState {
            probes: Arc::new(probes),
        })
}

/// Serve until `shutdown` fires, then drain in-flight requests
pub async fn serve(listener: TcpListener, app: Router, shutdown: Shutdown) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Health server listening on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Health server failed")?;

    info!("Health server stopped");
    Ok(())
}
