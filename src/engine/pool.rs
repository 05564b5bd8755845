use futures::future::join_all;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::generator::generate_horses_with;
use crate::error::AppError;
use crate::geo::is_in_range;
use crate::models::horse::Horse;
use crate::models::location::RangeQuery;
use crate::state::AppState;
use crate::store::{DocumentStore, StoreError, decode_children};

pub const HORSES_COLLECTION: &str = "horses";
pub const DEFAULT_POOL_TARGET: usize = 20;

/// Result of topping up a pool: stored horses in range plus id-less horses
/// the caller must persist.
#[derive(Debug, Clone, Default)]
pub struct TopUp {
    pub matched: Vec<Horse>,
    pub to_create: Vec<Horse>,
}

pub fn top_up(existing: Option<&Value>, query: &RangeQuery, target_count: usize) -> TopUp {
    top_up_with(&mut rand::thread_rng(), existing, query, target_count)
}

pub fn top_up_with<R>(
    rng: &mut R,
    existing: Option<&Value>,
    query: &RangeQuery,
    target_count: usize,
) -> TopUp
where
    R: Rng + ?Sized,
{
    let matched: Vec<Horse> = decode_children::<Horse>(HORSES_COLLECTION, existing)
        .into_iter()
        .filter(|(_, horse)| is_in_range(&horse.location, &query.center, query.radius_km))
        .map(|(id, horse)| horse.with_id(id))
        .collect();

    let missing = target_count.saturating_sub(matched.len());
    let to_create = if missing > 0 {
        generate_horses_with(rng, &query.center, query.radius_km, missing)
    } else {
        Vec::new()
    };

    TopUp { matched, to_create }
}

/// Returns at least `target_count` horses around the query center, persisting
/// any generated ones first so they carry store-assigned ids.
pub async fn fetch_horses_in_range(
    state: &AppState,
    query: &RangeQuery,
    target_count: usize,
) -> Result<Vec<Horse>, AppError> {
    let result = load_and_top_up(state, query, target_count).await;

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .range_queries_total
        .with_label_values(&[HORSES_COLLECTION, outcome])
        .inc();

    result
}

async fn load_and_top_up(
    state: &AppState,
    query: &RangeQuery,
    target_count: usize,
) -> Result<Vec<Horse>, AppError> {
    let snapshot = state.store.get(HORSES_COLLECTION).await?;
    let TopUp {
        mut matched,
        to_create,
    } = top_up(snapshot.as_ref(), query, target_count);

    if to_create.is_empty() {
        debug!(matched = matched.len(), "horse pool already full");
        return Ok(matched);
    }

    let store = state.store.as_ref();
    let requested = to_create.len();
    let results = join_all(to_create.into_iter().map(|horse| persist_horse(store, horse))).await;

    let mut created = Vec::with_capacity(requested);
    let mut first_error = None;
    for result in results {
        match result {
            Ok(horse) => created.push(horse),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    state
        .metrics
        .horses_generated_total
        .inc_by(created.len() as u64);

    if let Some(err) = first_error {
        warn!(
            requested,
            persisted = created.len(),
            error = %err,
            "horse top-up failed part way; persisted horses remain in the store"
        );
        return Err(err.into());
    }

    info!(
        lat = query.center.latitude,
        lon = query.center.longitude,
        radius_km = query.radius_km,
        matched = matched.len(),
        created = created.len(),
        "horse pool topped up"
    );

    matched.extend(created);
    Ok(matched)
}

async fn persist_horse(store: &dyn DocumentStore, horse: Horse) -> Result<Horse, StoreError> {
    let value = serde_json::to_value(&horse)?;
    let id = store.push(HORSES_COLLECTION, value).await?;
    Ok(horse.with_id(id))
}
