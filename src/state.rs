use std::sync::Arc;

use crate::engine::pool::DEFAULT_POOL_TARGET;
use crate::observability::metrics::Metrics;
use crate::store::DocumentStore;

pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub metrics: Metrics,
    pub pool_target: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, pool_target: usize) -> Self {
        Self {
            store,
            metrics: Metrics::new(),
            pool_target,
        }
    }

    pub fn with_default_target(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(store, DEFAULT_POOL_TARGET)
    }
}
