use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::{BatchId, BatchResult};
use crate::config::ResultStoreConfig;

/// Terminal batch results, keyed by batch id, for the lifetime of the process.
#[derive(Clone)]
pub struct BatchResultStore {
    cache: Cache<BatchId, Arc<BatchResult>>,
}

impl BatchResultStore {
    pub fn new(config: &ResultStoreConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries.max(1));

        if config.ttl_seconds > 0 {
            builder = builder.time_to_live(Duration::from_secs(config.ttl_seconds));
        }

        Self {
            cache: builder.build(),
        }
    }

    pub async fn get(&self, id: &BatchId) -> Option<Arc<BatchResult>> {
        self.cache.get(id).await
    }

    pub async fn insert(&self, result: BatchResult) -> Arc<BatchResult> {
        let result = Arc::new(result);
        self.cache.insert(result.batch_id, result.clone()).await;
        result
    }

    pub async fn remove(&self, id: &BatchId) -> Option<Arc<BatchResult>> {
        self.cache.remove(id).await
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for BatchResultStore {
    fn default() -> Self {
        Self::new(&ResultStoreConfig::default())
    }
}
