use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use chrono::Utc;
use serde::Deserialize;

use crate::engine::presence::{PresenceUpdate, record_heartbeat, update_presence};
use crate::engine::range::fetch_presence_in_range;
use crate::error::AppError;
use crate::models::location::RangeQuery;
use crate::models::presence::{PresenceKind, PresenceRecord};
use crate::state::AppState;

/// Same three routes under `/api/users` and `/api/drivers`.
pub fn router() -> Router<Arc<AppState>> {
    PresenceKind::ALL
        .into_iter()
        .fold(Router::new(), |router, kind| router.merge(kind_router(kind)))
}

fn kind_router(kind: PresenceKind) -> Router<Arc<AppState>> {
    let base = format!("/api/{kind}");

    Router::new()
        .route(
            &base,
            put(
                move |state: State<Arc<AppState>>, payload: Json<PresenceUpdate>| {
                    update(state, kind, payload)
                },
            ),
        )
        .route(
            &format!("{base}/heartbeat"),
            post(
                move |state: State<Arc<AppState>>, payload: Json<HeartbeatRequest>| {
                    heartbeat(state, kind, payload)
                },
            ),
        )
        .route(
            &format!("{base}/:lat/:lon/:range"),
            get(
                move |state: State<Arc<AppState>>, path: Path<(f64, f64, f64)>| {
                    in_range(state, kind, path)
                },
            ),
        )
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub uid: String,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    kind: PresenceKind,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<StatusCode, AppError> {
    record_heartbeat(&state, kind, &payload.uid, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update(
    State(state): State<Arc<AppState>>,
    kind: PresenceKind,
    Json(payload): Json<PresenceUpdate>,
) -> Result<Json<PresenceRecord>, AppError> {
    let record = update_presence(&state, kind, payload, Utc::now()).await?;
    Ok(Json(record))
}

async fn in_range(
    State(state): State<Arc<AppState>>,
    kind: PresenceKind,
    Path((lat, lon, range_km)): Path<(f64, f64, f64)>,
) -> Result<Json<Vec<PresenceRecord>>, AppError> {
    let query = RangeQuery::new(lat, lon, range_km)?;
    let records = fetch_presence_in_range(&state, kind, &query).await?;
    Ok(Json(records))
}
