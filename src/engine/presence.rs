use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::engine::sweeper::LOGGED_IN_FIELD;
use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::presence::{PresenceKind, PresenceRecord};
use crate::state::AppState;

pub const LAST_ACTIVE_FIELD: &str = "lastActiveAt";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub uid: String,
    pub email: Option<String>,
    pub location: Option<GeoPoint>,
    pub logged_in: Option<bool>,
}

fn record_path(kind: PresenceKind, uid: &str) -> Result<String, AppError> {
    let uid = uid.trim();
    if uid.is_empty() || uid.contains('/') {
        return Err(AppError::BadRequest(format!("invalid uid {uid:?}")));
    }
    Ok(format!("{}/{uid}", kind.collection()))
}

/// Marks a known record as alive at `now`.
pub async fn record_heartbeat(
    state: &AppState,
    kind: PresenceKind,
    uid: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let path = record_path(kind, uid)?;

    if state.store.get(&path).await?.is_none() {
        return Err(AppError::NotFound(format!("{} {uid} not found", kind.collection())));
    }

    let mut fields = Map::new();
    fields.insert(
        LAST_ACTIVE_FIELD.to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    fields.insert(LOGGED_IN_FIELD.to_string(), Value::Bool(true));
    state.store.update(&path, fields).await?;

    debug!(collection = %kind, uid, "heartbeat recorded");
    Ok(())
}

/// Applies a partial update to a presence record, creating it if needed.
///
/// Logging in also stamps `lastActiveAt` so the sweeper does not demote the
/// record before its first heartbeat.
pub async fn update_presence(
    state: &AppState,
    kind: PresenceKind,
    update: PresenceUpdate,
    now: DateTime<Utc>,
) -> Result<PresenceRecord, AppError> {
    let path = record_path(kind, &update.uid)?;

    let mut fields = Map::new();
    if let Some(email) = update.email {
        fields.insert("email".to_string(), Value::String(email));
    }
    if let Some(location) = update.location {
        let location = GeoPoint::new(location.latitude, location.longitude)?;
        fields.insert(
            "location".to_string(),
            serde_json::to_value(location).map_err(|err| AppError::Internal(err.to_string()))?,
        );
    }
    if let Some(logged_in) = update.logged_in {
        fields.insert(LOGGED_IN_FIELD.to_string(), Value::Bool(logged_in));
        if logged_in {
            fields.insert(
                LAST_ACTIVE_FIELD.to_string(),
                Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
    }

    if fields.is_empty() {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }

    state.store.update(&path, fields).await?;

    let stored = state
        .store
        .get(&path)
        .await?
        .ok_or_else(|| AppError::Internal(format!("{path} vanished after update")))?;
    let mut record: PresenceRecord =
        serde_json::from_value(stored).map_err(|err| AppError::Internal(err.to_string()))?;
    record.id = update.uid.trim().to_string();

    info!(
        collection = %kind,
        uid = %record.id,
        logged_in = record.logged_in,
        "presence updated"
    );
    Ok(record)
}
