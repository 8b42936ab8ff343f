use std::sync::Arc;

use futures::future::BoxFuture;
use pitch_common::redis::RedisCache;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::AnalysisResult;

/// Key/value backend for the score cache. Every operation degrades to a miss or a no-op.
pub trait CacheStore: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;
    /// Unconditional write.
    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl_secs: u64) -> BoxFuture<'a, bool>;
    /// Write only when the key does not exist yet.
    fn set_if_absent<'a>(&'a self, key: &'a str, value: &'a str, ttl_secs: u64)
        -> BoxFuture<'a, bool>;
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool>;
}

impl CacheStore for RedisCache {
    fn is_enabled(&self) -> bool {
        RedisCache::is_enabled(self)
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(RedisCache::get(self, key))
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl_secs: u64) -> BoxFuture<'a, bool> {
        Box::pin(self.set_with_ttl(key, value, ttl_secs))
    }

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl_secs: u64,
    ) -> BoxFuture<'a, bool> {
        Box::pin(self.set_if_absent_with_ttl(key, value, ttl_secs))
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(RedisCache::delete(self, key))
    }
}

/// Cache of the latest result per startup.
///
/// Key schema: `pitch:v1:latest:{startup_id}`, a JSON-encoded `AnalysisResult` with TTL.
///
/// A save overwrites the entry with the new result (`publish`). A read miss fills the entry
/// only if it is still absent (`fill`), so a reader holding an older result cannot
/// replace one published after its database read.
#[derive(Clone)]
pub struct ScoreCache {
    store: Arc<dyn CacheStore>,
    ttl_secs: u64,
}

impl ScoreCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(RedisCache::disabled()), 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    pub async fn get(&self, startup_id: Uuid) -> Option<AnalysisResult> {
        let key = key(startup_id);
        let raw = self.store.get(&key).await?;
        match serde_json::from_str(&raw) {
            Ok(result) => {
                debug!(startup_id = %startup_id, "score cache hit");
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, startup_id = %startup_id, "discarding undecodable cache entry");
                self.store.delete(&key).await;
                None
            }
        }
    }

    /// Populate after a read miss. Never replaces an existing entry.
    pub async fn fill(&self, result: &AnalysisResult) {
        let Some(json) = self.encode(result) else {
            return;
        };
        self.store
            .set_if_absent(&key(result.startup_id), &json, self.ttl_secs)
            .await;
    }

    /// Make a freshly saved result the cached latest. If the write fails the entry is
    /// dropped so readers fall back to the database.
    pub async fn publish(&self, result: &AnalysisResult) {
        let key = key(result.startup_id);
        let written = match self.encode(result) {
            Some(json) => self.store.set(&key, &json, self.ttl_secs).await,
            None => false,
        };
        if !written {
            self.store.delete(&key).await;
        }
    }

    fn encode(&self, result: &AnalysisResult) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        serde_json::to_string(result)
            .inspect_err(|e| warn!(error = %e, "failed to encode score for cache"))
            .ok()
    }
}

fn key(startup_id: Uuid) -> String {
    format!("pitch:v1:latest:{startup_id}")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::model::{Category, CategoryScores};

    /// In-process store with Redis `SET` / `SET NX` semantics; TTLs are ignored.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        entries: Mutex<HashMap<String, String>>,
    }

    impl CacheStore for MemoryStore {
        fn is_enabled(&self) -> bool {
            true
        }

        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
            let value = self.entries.lock().unwrap().get(key).cloned();
            Box::pin(async move { value })
        }

        fn set<'a>(&'a self, key: &'a str, value: &'a str, _ttl: u64) -> BoxFuture<'a, bool> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Box::pin(async { true })
        }

        fn set_if_absent<'a>(
            &'a self,
            key: &'a str,
            value: &'a str,
            _ttl: u64,
        ) -> BoxFuture<'a, bool> {
            let mut entries = self.entries.lock().unwrap();
            let created = !entries.contains_key(key);
            if created {
                entries.insert(key.to_string(), value.to_string());
            }
            Box::pin(async move { created })
        }

        fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool> {
            let removed = self.entries.lock().unwrap().remove(key).is_some();
            Box::pin(async move { removed })
        }
    }

    pub(crate) fn memory_cache() -> ScoreCache {
        ScoreCache::new(Arc::new(MemoryStore::default()), 300)
    }

    fn result(startup_id: Uuid, total: f64) -> AnalysisResult {
        AnalysisResult {
            id: Uuid::new_v4(),
            startup_id,
            founder_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            total_score: total,
            category_scores: Category::ALL.iter().map(|&c| (c, total / 100.0)).collect::<CategoryScores>(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn key_is_versioned_per_startup() {
        let id = Uuid::nil();
        assert_eq!(key(id), "pitch:v1:latest:00000000-0000-0000-0000-000000000000");
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = ScoreCache::disabled();
        assert!(!cache.is_enabled());
        let r = result(Uuid::new_v4(), 100.0);
        cache.publish(&r).await;
        cache.fill(&r).await;
        assert!(cache.get(r.startup_id).await.is_none());
    }

    #[tokio::test]
    async fn late_fill_does_not_replace_published_result() {
        let cache = memory_cache();
        let startup = Uuid::new_v4();
        let older = result(startup, 100.0);
        let newer = result(startup, 300.0);

        // A reader loaded `older` from the database, then a save published `newer`
        // before the reader got around to filling the cache.
        cache.publish(&newer).await;
        cache.fill(&older).await;

        assert_eq!(cache.get(startup).await.unwrap().id, newer.id);
    }

    #[tokio::test]
    async fn publish_replaces_filled_result() {
        let cache = memory_cache();
        let startup = Uuid::new_v4();
        let older = result(startup, 100.0);
        let newer = result(startup, 300.0);

        cache.fill(&older).await;
        assert_eq!(cache.get(startup).await.unwrap().id, older.id);
        cache.publish(&newer).await;
        assert_eq!(cache.get(startup).await.unwrap().id, newer.id);
    }

    #[tokio::test]
    async fn undecodable_entry_is_dropped() {
        let store = Arc::new(MemoryStore::default());
        let cache = ScoreCache::new(store.clone(), 300);
        let startup = Uuid::new_v4();
        store.set(&key(startup), "{not json", 300).await;

        assert!(cache.get(startup).await.is_none());
        assert!(store.get(&key(startup)).await.is_none());
    }
}
