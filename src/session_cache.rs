//! In-memory cache of initialized inference sessions
//!
//! Loading an ONNX model and optimizing its graph dominates the cost of a
//! single request. The cache keeps one initialized backend per
//! [`SegmentationModel`] and hands out shared handles; requests for the same
//! model serialize on that backend's mutex.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::{BackendFactory, InferenceBackend},
    models::SegmentationModel,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to an initialized backend
pub type SharedBackend = Arc<Mutex<Box<dyn InferenceBackend>>>;

/// Session cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionCacheStats {
    /// Number of sessions currently held
    pub total_sessions: usize,
    /// Lookups answered from the cache
    pub cache_hits: u64,
    /// Lookups that had to create a session
    pub cache_misses: u64,
    /// Cumulative model load time in milliseconds
    pub total_load_ms: u64,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SegmentationModel, SharedBackend>,
    stats: SessionCacheStats,
}

/// Cache of initialized backends keyed by model
#[derive(Default)]
pub struct SessionCache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| BgRemovalError::internal("Session cache lock poisoned"))
    }

    /// Return the cached backend for `model`, creating and initializing it on a miss
    ///
    /// The cache lock is held while a missing session loads, so concurrent
    /// first requests for a model load it once.
    ///
    /// # Errors
    /// - Backend creation or initialization failures (nothing is cached)
    pub fn get_or_create(
        &self,
        model: SegmentationModel,
        model_path: &Path,
        factory: &dyn BackendFactory,
        config: &RemovalConfig,
    ) -> Result<SharedBackend> {
        let mut inner = self.lock()?;

        if let Some(backend) = inner.sessions.get(&model).cloned() {
            inner.stats.cache_hits += 1;
            tracing::debug!(model = %model, "Session cache hit");
            return Ok(backend);
        }

        inner.stats.cache_misses += 1;
        tracing::debug!(model = %model, "Session cache miss");

        let mut backend = factory.create_backend(model, model_path)?;
        if let Some(load_time) = backend.initialize(config)? {
            inner.stats.total_load_ms += load_time.as_millis() as u64;
        }

        let shared: SharedBackend = Arc::new(Mutex::new(backend));
        inner.sessions.insert(model, Arc::clone(&shared));
        inner.stats.total_sessions = inner.sessions.len();
        Ok(shared)
    }

    /// Drop the session for `model` if it is still `stale`
    ///
    /// A session replaced since `stale` was handed out is left alone, so
    /// concurrent callers evicting the same handle rebuild it once.
    pub fn evict(&self, model: SegmentationModel, stale: &SharedBackend) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        let is_current = inner
            .sessions
            .get(&model)
            .is_some_and(|current| Arc::ptr_eq(current, stale));
        if is_current {
            inner.sessions.remove(&model);
            inner.stats.total_sessions = inner.sessions.len();
            tracing::debug!(model = %model, "Session evicted");
        }
        is_current
    }

    /// Snapshot of the cache statistics
    #[must_use]
    pub fn stats(&self) -> SessionCacheStats {
        self.lock()
            .map(|inner| inner.stats.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackendFactory;

    #[test]
    fn test_hit_and_miss_accounting() {
        let cache = SessionCache::new();
        let factory = MockBackendFactory::new();
        let config = RemovalConfig::default();
        let path = Path::new("unused.onnx");

        let first = cache
            .get_or_create(SegmentationModel::U2netp, path, &factory, &config)
            .unwrap();
        let second = cache
            .get_or_create(SegmentationModel::U2netp, path, &factory, &config)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache
            .get_or_create(SegmentationModel::U2net, path, &factory, &config)
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(factory.created_count(), 2);
    }

    #[test]
    fn test_cached_backend_is_initialized() {
        let cache = SessionCache::new();
        let backend = cache
            .get_or_create(
                SegmentationModel::IsnetGeneralUse,
                Path::new("unused.onnx"),
                &MockBackendFactory::new(),
                &RemovalConfig::default(),
            )
            .unwrap();
        assert!(backend.lock().unwrap().is_initialized());
        assert_eq!(cache.stats().total_sessions, 1);
    }

    #[test]
    fn test_poisoned_session_is_evicted_and_rebuilt() {
        let cache = SessionCache::new();
        let factory = MockBackendFactory::new();
        let config = RemovalConfig::default();
        let path = Path::new("unused.onnx");

        let backend = cache
            .get_or_create(SegmentationModel::U2net, path, &factory, &config)
            .unwrap();
        let held = Arc::clone(&backend);
        let _ = std::thread::spawn(move || {
            let _guard = held.lock().unwrap();
            panic!("inference panicked");
        })
        .join();
        assert!(backend.is_poisoned());

        assert!(cache.evict(SegmentationModel::U2net, &backend));
        assert!(!cache.evict(SegmentationModel::U2net, &backend));
        assert_eq!(cache.stats().total_sessions, 0);

        let rebuilt = cache
            .get_or_create(SegmentationModel::U2net, path, &factory, &config)
            .unwrap();
        assert!(!Arc::ptr_eq(&backend, &rebuilt));
        assert!(!rebuilt.is_poisoned());
        assert_eq!(factory.created_count(), 2);
    }

    #[test]
    fn test_evict_keeps_replaced_session() {
        let cache = SessionCache::new();
        let factory = MockBackendFactory::new();
        let config = RemovalConfig::default();
        let path = Path::new("unused.onnx");

        let first = cache
            .get_or_create(SegmentationModel::U2netp, path, &factory, &config)
            .unwrap();
        assert!(cache.evict(SegmentationModel::U2netp, &first));
        let second = cache
            .get_or_create(SegmentationModel::U2netp, path, &factory, &config)
            .unwrap();

        // A stale handle does not remove the session that replaced it
        assert!(!cache.evict(SegmentationModel::U2netp, &first));
        assert_eq!(cache.stats().total_sessions, 1);
        let again = cache
            .get_or_create(SegmentationModel::U2netp, path, &factory, &config)
            .unwrap();
        assert!(Arc::ptr_eq(&second, &again));
    }
}
