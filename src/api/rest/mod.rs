pub mod horses;
pub mod presence;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;

use crate::engine::pool::HORSES_COLLECTION;
use crate::error::AppError;
use crate::models::presence::PresenceKind;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(horses::router())
        .merge(presence::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    horses: usize,
    users: usize,
    drivers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        horses: count_children(&state, HORSES_COLLECTION).await?,
        users: count_children(&state, PresenceKind::Users.collection()).await?,
        drivers: count_children(&state, PresenceKind::Drivers.collection()).await?,
    }))
}

async fn count_children(state: &AppState, collection: &str) -> Result<usize, AppError> {
    let snapshot = state.store.get(collection).await?;
    Ok(snapshot
        .as_ref()
        .and_then(|value| value.as_object())
        .map_or(0, |children| children.len()))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
