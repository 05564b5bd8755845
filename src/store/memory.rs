use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::store::{DocumentStore, StoreError, split_path};

/// In-process document store keyed by top-level collection.
///
/// Writes inside one collection hold that collection's shard lock, so a
/// multi-field `update` is applied atomically.
pub struct MemoryStore {
    collections: DashMap<String, Value>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates losing the backend; every call fails with `Unavailable` while false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn child_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .and_then(|root| root.as_object().map(Map::len))
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }

    fn write(&self, segments: &[&str], value: Value) {
        let Some((root, rest)) = segments.split_first() else {
            return;
        };

        if rest.is_empty() {
            if value.is_null() {
                self.collections.remove(*root);
            } else {
                self.collections.insert((*root).to_string(), value);
            }
            return;
        }

        let mut entry = self
            .collections
            .entry((*root).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        write_at(entry.value_mut(), rest, value);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_available()?;
        let segments = split_path(path)?;

        let Some(root) = self.collections.get(segments[0]) else {
            return Ok(None);
        };

        let found = segments[1..]
            .iter()
            .try_fold(root.value(), |node, segment| node.get(*segment));

        Ok(found.cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_available()?;
        let segments = split_path(path)?;
        self.write(&segments, value);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.ensure_available()?;
        let base = split_path(path)?;

        let mut writes = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            let field_segments = split_path(&field)?;
            let full: Vec<String> = base
                .iter()
                .chain(field_segments.iter())
                .map(|s| (*s).to_string())
                .collect();
            writes.push((full, value));
        }

        let mut entry = self
            .collections
            .entry(base[0].to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for (full, value) in writes {
            let rest: Vec<&str> = full[1..].iter().map(String::as_str).collect();
            write_at(entry.value_mut(), &rest, value);
        }

        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        self.ensure_available()?;
        let key = Uuid::new_v4().simple().to_string();

        let mut segments = split_path(path)?;
        segments.push(&key);
        self.write(&segments, value);

        Ok(key)
    }
}

fn write_at(node: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *node = value;
        return;
    };

    let mut current = node;
    for segment in parents {
        current = ensure_object(current)
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let parent = ensure_object(current);
    if value.is_null() {
        parent.remove(*last);
    } else {
        parent.insert((*last).to_string(), value);
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }

    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}
