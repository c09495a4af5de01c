//! Bounded plan cache with TTL expiry and least-used eviction.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use adaptive_query_core::types::{QueryIntent, TaskPlan};

/// Cache of task plans keyed by intent profile.
#[derive(Debug)]
pub struct PlanCache {
    entries: Arc<RwLock<HashMap<String, CachedPlan>>>,
    ttl: Duration,
    capacity: usize,
    stats: Arc<RwLock<PlanCacheStats>>,
}

#[derive(Debug, Clone)]
struct CachedPlan {
    plan: TaskPlan,
    inserted: Instant,
    last_accessed: Instant,
}

impl CachedPlan {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted.elapsed() >= ttl
    }
}

/// Plan cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanCacheStats {
    /// Lookups that returned a plan.
    pub hits: usize,
    /// Lookups that returned nothing.
    pub misses: usize,
    /// Live entries.
    pub entries: usize,
    /// Entries dropped by expiry or capacity.
    pub evictions: usize,
}

impl PlanCacheStats {
    /// Fraction of lookups that hit.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl PlanCache {
    /// Create a cache.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
            stats: Arc::new(RwLock::new(PlanCacheStats::default())),
        }
    }

    /// Cache key for an intent: type, domain and complexity to two decimals.
    pub fn key_for(intent: &QueryIntent) -> String {
        format!(
            "{}_{}_{:.2}",
            intent.intent_type, intent.domain, intent.complexity
        )
    }

    /// Look up a live plan.
    pub async fn get(&self, key: &str) -> Option<TaskPlan> {
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        if let Some(cached) = entries.get_mut(key) {
            if !cached.is_expired(self.ttl) {
                cached.last_accessed = Instant::now();
                stats.hits += 1;
                debug!(key, "Plan cache hit");
                return Some(cached.plan.clone());
            }
            entries.remove(key);
            stats.evictions += 1;
            stats.entries = entries.len();
        }

        stats.misses += 1;
        None
    }

    /// Store a plan, evicting expired entries and then the least recently used
    /// one when the cache is full.
    pub async fn put(&self, key: String, plan: TaskPlan) {
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        let ttl = self.ttl;
        let before = entries.len();
        entries.retain(|_, cached| !cached.is_expired(ttl));
        stats.evictions += before - entries.len();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, cached)| cached.last_accessed)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
                stats.evictions += 1;
                debug!(key = %victim, "Evicted least recently used plan");
            }
        }

        let now = Instant::now();
        entries.insert(
            key,
            CachedPlan {
                plan,
                inserted: now,
                last_accessed: now,
            },
        );
        stats.entries = entries.len();
    }

    /// Live entry count, including entries not yet noticed as expired.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.stats.write().await.entries = 0;
    }

    /// Snapshot of the statistics.
    pub async fn stats(&self) -> PlanCacheStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_query_core::types::{Domain, IntentType};

    fn plan(id: &str) -> TaskPlan {
        TaskPlan::new(id, Vec::new())
    }

    #[test]
    fn test_key_format() {
        let intent = QueryIntent::new("q", IntentType::Debugging, Domain::Database)
            .with_complexity(0.456);
        assert_eq!(PlanCache::key_for(&intent), "debugging_database_0.46");
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = PlanCache::new(Duration::from_secs(60), 4);
        assert!(cache.get("a").await.is_none());
        cache.put("a".to_string(), plan("p1")).await;
        assert_eq!(cache.get("a").await.unwrap().plan_id, "p1");

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = PlanCache::new(Duration::ZERO, 4);
        cache.put("a".to_string(), plan("p1")).await;
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = PlanCache::new(Duration::from_secs(60), 2);
        cache.put("a".to_string(), plan("p1")).await;
        cache.put("b".to_string(), plan("p2")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.get("a").await;
        cache.put("c".to_string(), plan("p3")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_fresh_plan_outlives_stale_hit() {
        let cache = PlanCache::new(Duration::from_secs(60), 2);
        cache.put("a".to_string(), plan("p1")).await;
        cache.get("a").await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("b".to_string(), plan("p2")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("c".to_string(), plan("p3")).await;

        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }
}
