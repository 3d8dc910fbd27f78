use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod storage;

use services::file_adapter::FileAdapter;
use storage::{BucketClient, gcs, local::LocalBucket};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        bucket = %cfg.adapter.bucket_name,
        direct_access = cfg.adapter.direct_access,
        thumbnail_sizes = cfg.adapter.thumbnail_sizes.len(),
        "starting file-store"
    );

    // --- Select bucket backend ---
    let bucket: Arc<dyn BucketClient> = match &cfg.local_dir {
        Some(dir) => {
            tracing::info!("using local bucket backend at {}", dir);
            Arc::new(LocalBucket::new(dir)?)
        }
        None => {
            let raw = cfg
                .service_account
                .as_deref()
                .context("FILE_STORE_SERVICE_ACCOUNT is required for the GCS backend")?;
            let credentials = gcs::resolve_credentials(raw)?;
            Arc::new(
                gcs::GcsBucket::connect(credentials, cfg.adapter.bucket_name.clone()).await?,
            )
        }
    };

    // --- Initialize the adapter ---
    let adapter = FileAdapter::new(bucket, cfg.adapter.clone());
    let state = handlers::AppState {
        adapter,
        mount: cfg.mount.clone(),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

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
