//! Process-wide cache of loaded models.
//!
//! Loading weights is the expensive part of building a pipeline. Models are
//! `Clone` over shared tensors, so the cache hands out clones that reuse the
//! same weights.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::Result;

/// Implemented by model option types to produce a stable cache key.
pub trait ModelOptions {
    fn cache_key(&self) -> String;
}

type CacheStorage = HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>;

pub struct ModelCache {
    cache: Arc<Mutex<CacheStorage>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the cached model for `key`, or run `loader` and cache its result.
    ///
    /// Entries are keyed by model type as well as `key`, so two model types
    /// may share a key without colliding.
    pub async fn get_or_create<M, F>(&self, key: &str, loader: F) -> Result<M>
    where
        M: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<M>,
    {
        let cache_key = (TypeId::of::<M>(), key.to_string());

        // Held across the load so concurrent builders don't load twice.
        let mut cache = self.cache.lock().await;
        if let Some(model) = cache
            .get(&cache_key)
            .and_then(|cached| cached.downcast_ref::<M>())
        {
            tracing::debug!(key, "model cache hit");
            return Ok(model.clone());
        }

        tracing::debug!(key, "model cache miss, loading");
        let model = loader()?;
        cache.insert(cache_key, Arc::new(model.clone()) as Arc<dyn Any + Send + Sync>);

        Ok(model)
    }

    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_MODEL_CACHE: once_cell::sync::Lazy<ModelCache> =
    once_cell::sync::Lazy::new(ModelCache::new);

pub fn global_cache() -> &'static ModelCache {
    &GLOBAL_MODEL_CACHE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentError;

    #[derive(Clone)]
    struct TestModel {
        id: String,
    }

    #[tokio::test]
    async fn test_cache_returns_same_instance() {
        let cache = ModelCache::new();

        let model1 = cache
            .get_or_create::<TestModel, _>("test-model", || {
                Ok(TestModel {
                    id: "original".to_string(),
                })
            })
            .await
            .unwrap();

        let model2 = cache
            .get_or_create::<TestModel, _>("test-model", || {
                // Must not be called.
                Ok(TestModel {
                    id: "new".to_string(),
                })
            })
            .await
            .unwrap();

        assert_eq!(model1.id, model2.id);
        assert_eq!(model1.id, "original");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache = ModelCache::new();

        let err = cache
            .get_or_create::<TestModel, _>("broken", || {
                Err(AgentError::ModelNotFound("broken".into()))
            })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty().await);

        let model = cache
            .get_or_create::<TestModel, _>("broken", || {
                Ok(TestModel {
                    id: "recovered".to_string(),
                })
            })
            .await
            .unwrap();
        assert_eq!(model.id, "recovered");
    }

    #[tokio::test]
    async fn test_clear_empties_cache() {
        let cache = ModelCache::new();
        cache
            .get_or_create::<TestModel, _>("a", || Ok(TestModel { id: "a".into() }))
            .await
            .unwrap();
        assert!(!cache.is_empty().await);
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
