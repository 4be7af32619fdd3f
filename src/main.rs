use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot_files::{
    ContentStore, DEFAULT_STORAGE_ROOT, StoreConfig, flag_from_env_value,
    hash_algorithm_from_env_value, namespacing_from_env_value, timeout_from_env_value,
};

/// Default request body limit for uploads (64 MiB).
const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Main entry point for the Depot server
///
/// Opens the content store and serves the REST API until interrupted.
///
/// # Environment Variables
/// - `DEPOT_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `DEPOT_STORAGE_ROOT`: Storage root directory (default: "Files")
/// - `DEPOT_HASH_ALGORITHM`: "sha256" (default) or "sha512"
/// - `DEPOT_NAMESPACING`: "per-owner" (default) or "global"
/// - `DEPOT_VERIFY_ON_READ`: Re-hash objects on read (default: false)
/// - `DEPOT_OPERATION_TIMEOUT_MS`: Per-operation timeout; unset or 0 disables it
/// - `DEPOT_MAX_UPLOAD_BYTES`: Upload size limit (default: 64 MiB)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - a configuration value is invalid,
/// - the storage root cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depot_run=info".parse()?)
                .add_directive("depot_files=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("DEPOT_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let config = store_config_from_env()?;
    let max_upload_bytes = max_upload_bytes_from_env_value(std::env::var("DEPOT_MAX_UPLOAD_BYTES").ok())?;

    let store = ContentStore::open(&config).await?;
    let app = api_rest::router(store, max_upload_bytes);

    tracing::info!("++ Starting Depot REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Depot REST stopped");
    Ok(())
}

/// Resolve the store configuration once from the process environment.
fn store_config_from_env() -> anyhow::Result<StoreConfig> {
    let storage_root = std::env::var("DEPOT_STORAGE_ROOT")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STORAGE_ROOT.into());

    Ok(StoreConfig::new(PathBuf::from(storage_root))
        .with_hash_algorithm(hash_algorithm_from_env_value(
            std::env::var("DEPOT_HASH_ALGORITHM").ok(),
        )?)
        .with_namespacing(namespacing_from_env_value(
            std::env::var("DEPOT_NAMESPACING").ok(),
        )?)
        .with_verify_on_read(flag_from_env_value(
            std::env::var("DEPOT_VERIFY_ON_READ").ok(),
        )?)
        .with_operation_timeout(timeout_from_env_value(
            std::env::var("DEPOT_OPERATION_TIMEOUT_MS").ok(),
        )?))
}

fn max_upload_bytes_from_env_value(value: Option<String>) -> anyhow::Result<usize> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => Ok(v.parse::<usize>().map_err(|e| {
            anyhow::anyhow!("DEPOT_MAX_UPLOAD_BYTES must be a byte count, got '{}': {}", v, e)
        })?),
        None => Ok(DEFAULT_MAX_UPLOAD_BYTES),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
