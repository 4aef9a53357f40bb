//! Read-through cached queries.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tradewire_core::TtlCache;

use crate::error::ClientResult;
use crate::pipeline::RequestPipeline;
use crate::transport::HttpRequest;

/// JSON payload cache in front of the request pipeline.
///
/// Only payloads that were fetched successfully and decoded into the
/// caller's type are stored.
#[derive(Debug, Clone)]
pub struct CachedQuery {
    pipeline: Arc<RequestPipeline>,
    cache: Arc<TtlCache<Value>>,
}

impl CachedQuery {
    pub fn new(pipeline: Arc<RequestPipeline>, cache: Arc<TtlCache<Value>>) -> Self {
        Self { pipeline, cache }
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    /// Return the cached payload for `key`, fetching it on a miss.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
        request: HttpRequest,
        ttl: Duration,
    ) -> ClientResult<T> {
        if let Some(value) = self.cache.get(key) {
            tracing::trace!(key, "Cache hit");
            return Ok(serde_json::from_value(value)?);
        }
        tracing::trace!(key, "Cache miss");
        self.refresh_json(key, request, ttl).await
    }

    /// Fetch unconditionally and overwrite the cached payload.
    pub async fn refresh_json<T: DeserializeOwned>(
        &self,
        key: &str,
        request: HttpRequest,
        ttl: Duration,
    ) -> ClientResult<T> {
        let value: Value = self.pipeline.execute(request).await?.json()?;
        let typed = T::deserialize(&value)?;
        self.cache.put(key, value, ttl);
        Ok(typed)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.invalidate(key)
    }

    /// Drop every cached payload whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = self.cache.invalidate_prefix(prefix);
        tracing::debug!(prefix, removed, "Invalidated cache prefix");
        removed
    }
}
