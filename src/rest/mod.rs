use std::net::SocketAddr;

use axum::{routing::get, Router};

use crate::storage::StorageRead;

mod handlers;
mod models;

pub use models::{ErrorResponse, HealthResponse, SearchHitResponse, SearchResponse};

use handlers::{health, last_run, not_found, search, stats};

#[derive(Clone)]
pub struct AppState<S: StorageRead> {
    pub storage: S,
    pub started_at: std::time::SystemTime,
}

pub fn router<S: StorageRead + Clone + Send + Sync + 'static>(storage: S) -> Router {
    let state = AppState {
        storage,
        started_at: std::time::SystemTime::now(),
    };

    Router::new()
        .route("/health", get(health::<S>))
        .route("/stats", get(stats::<S>))
        .route("/runs/last", get(last_run::<S>))
        .route("/search", get(search::<S>))
        .fallback(not_found)
        .with_state(state)
}

pub async fn serve<S: StorageRead + Clone + Send + Sync + 'static>(
    addr: SocketAddr,
    storage: S,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    log::info!("🌐 REST service on http://{}", addr);

    let app = router(storage);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("🛑 REST shutdown requested");
        })
        .await?;
    log::info!("👋 REST server exited");
    Ok(())
}
