use anyhow::Result;
use config::BackendKind;
use services::{
    memory_store::MemoryStore,
    object_store::ObjectStore,
    storage_service::{DiskStore, apply_schema},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-gate with config: {:?}", cfg);

    let store: Arc<dyn ObjectStore> = match cfg.backend {
        BackendKind::Memory => {
            if migrate {
                anyhow::bail!("--migrate only applies to the disk backend");
            }
            tracing::warn!("Using in-memory backend; objects are lost on exit");
            Arc::new(MemoryStore::new())
        }
        BackendKind::Disk => {
            let db = Arc::new(connect_sqlite(&cfg.database_url).await?);

            // --- Handle migration mode ---
            if migrate {
                apply_schema(&db).await?;
                tracing::info!("Database migration complete.");
                return Ok(());
            }

            Arc::new(DiskStore::open(db, cfg.storage_dir.clone()).await?)
        }
    };

    if cfg.token.is_none() {
        tracing::warn!("No access token configured; every route is open");
    }

    // --- Build router ---
    let state = state::AppState::new(store, cfg.token.clone());
    let app = routes::routes::app(state, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the metadata database, creating the file and its parent directory
/// when missing.
async fn connect_sqlite(database_url: &str) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let db_path = options.get_filename();
    tracing::debug!("Interpreted SQLite path => {}", db_path.display());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !Path::new(parent).exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}
