use anyhow::{Context, Result};
use axum::Router;
use config::{AppConfig, Backend};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use store::{
    ObjectStore, azure::AzureBlobStore, ensure_container, local::LocalObjectStore,
    memory::MemoryObjectStore,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let connect_options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database URL `{}`", cfg.database_url))?
        .create_if_missing(true);
    if let Some(parent) = connect_options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .context("connecting to task database")?,
    );

    services::task_service::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize object store, once per process ---
    let store = build_store(&cfg)?;
    ensure_container(store.as_ref())
        .await
        .with_context(|| format!("ensuring container `{}`", cfg.storage.container_name))?;

    let blobs = services::blob_service::BlobService::new(&cfg.storage, store);
    let tasks = services::task_service::TaskService::new(db.clone());
    tracing::info!(
        "Serving objects from {}/{}",
        cfg.storage.account_url(),
        cfg.storage.container_name
    );

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes)
        .with_state(routes::routes::AppState { blobs, tasks });

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

/// Construct the object store client selected by `--backend`.
fn build_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let container = cfg.storage.container_name.clone();
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        Backend::Azure => Arc::new(
            AzureBlobStore::new(&cfg.storage).context("configuring Azure Blob Storage client")?,
        ),
        Backend::Local => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            Arc::new(LocalObjectStore::new(&cfg.storage_dir, container))
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory object store; uploads are lost on exit");
            Arc::new(MemoryObjectStore::without_container(container))
        }
    };
    Ok(store)
}
