use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{
    services::{create_download, delete_task, download_file, get_status, health, trigger_cleanup},
    state::AppState,
};
use crate::config::Config;
use crate::orchestrator::DownloadManager;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes, bound to `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/download", post(create_download))
        .route("/api/status/{task_id}", get(get_status))
        .route("/api/task/{task_id}", delete(delete_task))
        .route("/api/cleanup", get(trigger_cleanup).post(trigger_cleanup))
        .route("/download/{task_id}", get(download_file))
        .route("/health", get(health))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestDecompressionLayer::new()),
        )
}

pub async fn run(address: SocketAddr, config: Config) -> Result<(), AnyError> {
    let manager = DownloadManager::from_config(&config);
    manager
        .dirs()
        .ensure_root()
        .await
        .map_err(|e| format!("Failed to create downloads root: {}", e))?;
    info!(
        root = %manager.dirs().root().display(),
        max_concurrent = manager.gate().capacity(),
        "Downloads root ready"
    );

    let cleanup_enabled = config.cleanup.enabled;
    let state = AppState::new(config, manager.clone());
    if cleanup_enabled {
        state.cleanup.start();
    } else {
        warn!("Periodic cleanup disabled");
    }

    let app = router(state.clone());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "mediafetch API listening");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.cleanup.stop().await;
    manager.shutdown();

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
