pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend unreachable: {0}")]
    Unavailable(String),

    #[error("invalid store path: {0}")]
    InvalidPath(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Path-addressed document store, in the shape of a realtime JSON database.
///
/// Paths are `/`-separated (`"users/abc123"`). `update` field paths are
/// relative to `path` and may themselves contain `/`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Appends `value` under a store-generated key and returns that key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;
}

/// Decodes every child of a collection snapshot, keyed by its store key.
///
/// Children that do not decode as `T` are skipped with a warning, so one bad
/// record never hides the rest of the collection.
pub fn decode_children<T>(collection: &str, snapshot: Option<&Value>) -> Vec<(String, T)>
where
    T: DeserializeOwned,
{
    let Some(Value::Object(children)) = snapshot else {
        return Vec::new();
    };

    children
        .iter()
        .filter_map(|(key, child)| match serde_json::from_value::<T>(child.clone()) {
            Ok(decoded) => Some((key.clone(), decoded)),
            Err(err) => {
                warn!(collection, key = %key, error = %err, "skipping undecodable record");
                None
            }
        })
        .collect()
}

pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
