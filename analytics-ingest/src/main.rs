use std::future::ready;
use std::sync::Arc;

use analytics_ingest::config::Config;
use analytics_ingest::consumer::IngestConsumer;
use analytics_ingest::handler::IngestHandler;
use analytics_ingest::health::HealthRegistry;
use analytics_ingest::metrics::{IngestMetrics, DURATION_BUCKETS};
use analytics_ingest::rollups::{NoopRollups, PgViewerRollups, ViewerRollups};
use analytics_ingest::store::clickhouse::ClickhouseStore;
use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "periscope analytics ingest"
}

fn start_health_liveness_server(
    config: &Config,
    liveness: HealthRegistry,
    prometheus: PrometheusHandle,
) -> JoinHandle<Result<(), std::io::Error>> {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/metrics", get(move || ready(prometheus.render())));
    let bind = config.bind();
    tokio::task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        info!(%bind, "Serving health and metrics");
        axum::serve(listener, router).await
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_with_defaults().context("Failed to load configuration")?;

    let recorder = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context("Invalid histogram buckets")?
        .build_recorder();
    let prometheus = recorder.handle();
    let metrics = IngestMetrics::new(Arc::new(recorder));

    let liveness = HealthRegistry::new("liveness");

    let store = Arc::new(ClickhouseStore::new(&config.clickhouse).await?);
    let rollups: Arc<dyn ViewerRollups> = if config.database_url.is_empty() {
        info!("DATABASE_URL not set, viewer rollups disabled");
        Arc::new(NoopRollups)
    } else {
        let rollups = PgViewerRollups::connect(&config.database_url, config.max_pg_connections)
            .await
            .context("Failed to connect to Postgres")?;
        Arc::new(rollups)
    };

    let handler = Arc::new(
        IngestHandler::new(store, rollups, metrics.clone())
            .with_legacy_tenant_fallback(config.legacy_tenant_fallback),
    );

    let consumer_liveness = liveness
        .register("ingest_consumer".to_string(), config.heartbeat_interval())
        .await;
    let consumer = IngestConsumer::new(&config.kafka, handler, metrics, consumer_liveness)
        .context("Failed to create Kafka consumer")?;

    let server = start_health_liveness_server(&config, liveness, prometheus);

    info!(
        analytics_topic = %config.kafka.kafka_analytics_topic,
        service_topic = %config.kafka.kafka_service_topic,
        dlq_topic = %config.kafka.kafka_dlq_topic,
        "Consuming"
    );

    tokio::select! {
        result = consumer.run() => {
            if let Err(err) = &result {
                error!(error = %err, "Consumer stopped");
            }
            result.context("Consumer stopped")?;
        }
        result = server => {
            result
                .context("Health server task panicked")?
                .context("Health server failed")?;
        }
    }

    Ok(())
}
