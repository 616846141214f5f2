use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use featureflag_rs::{
    create_app, init_observability,
    observability::TracedStore,
    repositories::{DynamoDbStore, InMemoryStore, TableStore},
    shutdown_observability, ApiState, Config, Metrics, Repositories, StorageBackend,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_environment().context("failed to load configuration")?;

    init_observability(
        &config.observability.service_name,
        &config.observability.service_version,
        config.observability.otlp_endpoint.as_deref(),
        config.observability.enable_json_logging,
    )
    .context("failed to initialize observability")?;

    info!(
        "Starting {} v{}",
        config.observability.service_name, config.observability.service_version
    );

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let tables = config.database.table_names();

    let store: Arc<dyn TableStore> = match config.database.storage_backend {
        StorageBackend::DynamoDb => {
            info!(
                region = %config.database.region,
                environments = %tables.environments,
                feature_flags = %tables.feature_flags,
                api_keys = %tables.api_keys,
                "Using DynamoDB storage"
            );
            let client = Arc::new(config.database.dynamodb_client().await);
            Arc::new(DynamoDbStore::new(client, config.database.region.clone()))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; data is lost on shutdown");
            Arc::new(InMemoryStore::with_tables(&tables))
        }
    };
    let store: Arc<dyn TableStore> = Arc::new(TracedStore::new(store, metrics.clone()));

    let repositories = Repositories::new(store, &tables);
    let state = ApiState::new(repositories, Some(metrics.clone()));

    let app = create_app(
        state,
        metrics,
        config.observability.enable_metrics,
        config.server.request_timeout(),
    );

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .context("invalid server host")?,
        config.server.port,
    );
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown_observability().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
