use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use serde::Deserialize;

use crate::engine::pool::fetch_horses_in_range;
use crate::error::AppError;
use crate::models::horse::Horse;
use crate::models::location::RangeQuery;
use crate::state::AppState;

const MAX_POOL_TARGET: usize = 500;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/horses/:lat/:lon/:range", get(horses_in_range))
}

#[derive(Deserialize)]
pub struct PoolParams {
    pub target: Option<usize>,
}

async fn horses_in_range(
    State(state): State<Arc<AppState>>,
    Path((lat, lon, range_km)): Path<(f64, f64, f64)>,
    Query(params): Query<PoolParams>,
) -> Result<Json<Vec<Horse>>, AppError> {
    let query = RangeQuery::new(lat, lon, range_km)?;

    let target = params.target.unwrap_or(state.pool_target);
    if target > MAX_POOL_TARGET {
        return Err(AppError::BadRequest(format!(
            "target must be <= {MAX_POOL_TARGET}"
        )));
    }

    let horses = fetch_horses_in_range(&state, &query, target).await?;
    Ok(Json(horses))
}
