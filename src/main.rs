use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use horse_pool::api;
use horse_pool::config::Config;
use horse_pool::engine::sweeper::spawn_presence_sweeper;
use horse_pool::error::AppError;
use horse_pool::state::AppState;
use horse_pool::store::memory::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store = Arc::new(MemoryStore::new());
    let shared_state = Arc::new(AppState::new(store, config.pool_target));

    let app = api::rest::router(shared_state.clone());

    let cancel = CancellationToken::new();
    let sweeper = spawn_presence_sweeper(shared_state.clone(), config.sweeper(), cancel.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        pool_target = config.pool_target,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    cancel.cancel();
    if let Err(err) = sweeper.await {
        tracing::error!(error = %err, "presence sweeper task failed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
