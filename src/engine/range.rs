use serde_json::Value;

use crate::error::AppError;
use crate::geo::located_in_range;
use crate::models::location::RangeQuery;
use crate::models::presence::{PresenceKind, PresenceRecord};
use crate::state::AppState;
use crate::store::decode_children;

/// Presence records within the query radius. Records without a usable
/// location are left out.
pub fn compute_in_range(
    kind: PresenceKind,
    existing: Option<&Value>,
    query: &RangeQuery,
) -> Vec<PresenceRecord> {
    decode_children::<PresenceRecord>(kind.collection(), existing)
        .into_iter()
        .filter(|(_, record)| {
            located_in_range(record.location.as_ref(), &query.center, query.radius_km)
        })
        .map(|(id, mut record)| {
            record.id = id;
            record
        })
        .collect()
}

pub async fn fetch_presence_in_range(
    state: &AppState,
    kind: PresenceKind,
    query: &RangeQuery,
) -> Result<Vec<PresenceRecord>, AppError> {
    let snapshot = state.store.get(kind.collection()).await;

    let outcome = if snapshot.is_ok() { "success" } else { "error" };
    state
        .metrics
        .range_queries_total
        .with_label_values(&[kind.collection(), outcome])
        .inc();

    Ok(compute_in_range(kind, snapshot?.as_ref(), query))
}
