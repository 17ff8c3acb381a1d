//! Concurrent cache storage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CacheConfig, Namespace, NamespacePolicy};
use crate::metrics;

/// A cached payload with its timestamps.
#[derive(Debug)]
pub struct CacheEntry {
    /// Stored value.
    pub payload: Arc<Value>,
    /// When the entry was written.
    pub inserted_at: Instant,
    /// Logical access clock at the last read or write.
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn new(payload: Value, inserted_at: Instant, clock: u64) -> Self {
        Self {
            payload: Arc::new(payload),
            inserted_at,
            last_accessed: AtomicU64::new(clock),
        }
    }

    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < ttl
    }

    /// Logical time of the last access; larger is more recent.
    pub fn last_accessed(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }
}

struct Shard {
    policy: NamespacePolicy,
    entries: DashMap<String, CacheEntry>,
    write_lock: Mutex<()>,
}

impl Shard {
    fn new(policy: NamespacePolicy) -> Self {
        Self {
            policy,
            entries: DashMap::with_capacity(policy.capacity.min(1024)),
            write_lock: Mutex::new(()),
        }
    }
}

/// Size and policy of one namespace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    /// Entries currently stored, expired ones not yet swept included.
    pub size: usize,
    /// Maximum entries.
    pub capacity: usize,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
}

/// Cache counters.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Writes.
    pub sets: u64,
    /// Entries removed under capacity pressure.
    pub evictions: u64,
    /// Entries removed after their TTL.
    pub expirations: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_rate: f64,
    /// Per-namespace sizes.
    pub namespaces: BTreeMap<String, NamespaceStats>,
}

/// Namespaced TTL cache with approximate LRU eviction.
pub struct OpportunityCache {
    shards: [Shard; 4],
    sweep_interval: Duration,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl std::fmt::Debug for OpportunityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpportunityCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for OpportunityCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl OpportunityCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shards: Namespace::ALL.map(|ns| Shard::new(config.policy(ns))),
            sweep_interval: config.sweep_interval,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    fn shard(&self, ns: Namespace) -> &Shard {
        &self.shards[ns.slot()]
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a live entry.
    pub fn get(&self, ns: Namespace, key: &str) -> Option<Arc<Value>> {
        self.get_at(ns, key, Instant::now())
    }

    /// Look up a live entry as of `now`, evicting it if it has expired.
    pub fn get_at(&self, ns: Namespace, key: &str, now: Instant) -> Option<Arc<Value>> {
        let shard = self.shard(ns);
        let ttl = shard.policy.ttl;

        {
            let Some(entry) = shard.entries.get(key) else {
                self.record_miss();
                return None;
            };
            if entry.is_fresh(now, ttl) {
                entry.last_accessed.store(self.tick(), Ordering::Relaxed);
                self.record_hit();
                return Some(Arc::clone(&entry.payload));
            }
        }

        if shard
            .entries
            .remove_if(key, |_, e| !e.is_fresh(now, ttl))
            .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.record_miss();
        None
    }

    /// Look up and decode a live entry.
    pub fn get_as<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> Option<T> {
        let payload = self.get(ns, key)?;
        match T::deserialize(payload.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(namespace = %ns, key, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    /// Store a serializable value.
    pub fn set<T: Serialize>(&self, ns: Namespace, key: &str, value: &T) -> serde_json::Result<()> {
        let payload = serde_json::to_value(value)?;
        self.set_value_at(ns, key, payload, Instant::now());
        Ok(())
    }

    /// Store a JSON payload.
    pub fn set_value(&self, ns: Namespace, key: &str, payload: Value) {
        self.set_value_at(ns, key, payload, Instant::now());
    }

    /// Store a JSON payload as of `now`.
    ///
    /// When the namespace is full and `key` is new, the entry with the oldest
    /// access is evicted first.
    pub fn set_value_at(&self, ns: Namespace, key: &str, payload: Value, now: Instant) {
        let shard = self.shard(ns);
        let _guard = shard
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !shard.entries.contains_key(key) && shard.entries.len() >= shard.policy.capacity {
            let victim = shard
                .entries
                .iter()
                .min_by_key(|e| e.value().last_accessed())
                .map(|e| e.key().clone());
            if let Some(victim) = victim {
                shard.entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::inc_cache_evictions();
                debug!(namespace = %ns, key = %victim, "Evicted least recently used entry");
            }
        }

        shard
            .entries
            .insert(key.to_string(), CacheEntry::new(payload, now, self.tick()));
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove an entry.
    pub fn remove(&self, ns: Namespace, key: &str) -> bool {
        let shard = self.shard(ns);
        let _guard = shard
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        shard.entries.remove(key).is_some()
    }

    /// Entries stored in a namespace, expired ones not yet swept included.
    pub fn len(&self, ns: Namespace) -> usize {
        self.shard(ns).entries.len()
    }

    /// Whether a namespace has no entries.
    pub fn is_empty(&self, ns: Namespace) -> bool {
        self.shard(ns).entries.is_empty()
    }

    /// Remove every expired entry in every namespace.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Remove every entry expired as of `now`.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let _guard = shard
                .write_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let ttl = shard.policy.ttl;
            shard.entries.retain(|_, e| {
                let keep = e.is_fresh(now, ttl);
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        let namespaces = Namespace::ALL
            .iter()
            .map(|&ns| {
                let shard = self.shard(ns);
                (
                    ns.to_string(),
                    NamespaceStats {
                        size: shard.entries.len(),
                        capacity: shard.policy.capacity,
                        ttl_secs: shard.policy.ttl.as_secs(),
                    },
                )
            })
            .collect();

        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            namespaces,
        }
    }

    /// Run the expiry sweep on the configured interval until aborted.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep_expired();
                if removed > 0 {
                    debug!(removed, "Cache sweep removed expired entries");
                }
            }
        })
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::inc_cache_hits();
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::inc_cache_misses();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn small_cache(capacity: usize, ttl_secs: u64) -> OpportunityCache {
        let policy = NamespacePolicy::new(Duration::from_secs(ttl_secs), capacity);
        OpportunityCache::new(CacheConfig::default().with_policy(Namespace::Opportunities, policy))
    }

    #[test]
    fn set_then_get_returns_same_payload() {
        let cache = OpportunityCache::default();
        let payload = json!({"pair": "USDC/WETH", "spread": 3.9, "venues": ["a", "b"]});

        cache.set_value(Namespace::Prices, "USDC/WETH", payload.clone());

        assert_eq!(*cache.get(Namespace::Prices, "USDC/WETH").unwrap(), payload);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn get_after_ttl_is_a_miss_and_evicts() {
        let cache = small_cache(10, 30);
        let start = Instant::now();

        cache.set_value_at(Namespace::Opportunities, "k", json!(1), start);
        assert!(cache
            .get_at(Namespace::Opportunities, "k", start + Duration::from_secs(29))
            .is_some());
        assert!(cache
            .get_at(Namespace::Opportunities, "k", start + Duration::from_secs(30))
            .is_none());

        assert_eq!(cache.len(Namespace::Opportunities), 0);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn full_namespace_evicts_least_recently_accessed() {
        let cache = small_cache(3, 60);

        cache.set_value(Namespace::Opportunities, "a", json!("a"));
        cache.set_value(Namespace::Opportunities, "b", json!("b"));
        cache.set_value(Namespace::Opportunities, "c", json!("c"));
        cache.get(Namespace::Opportunities, "a");
        cache.get(Namespace::Opportunities, "c");

        cache.set_value(Namespace::Opportunities, "d", json!("d"));

        assert_eq!(cache.len(Namespace::Opportunities), 3);
        assert!(cache.get(Namespace::Opportunities, "b").is_none());
        for key in ["a", "c", "d"] {
            assert!(cache.get(Namespace::Opportunities, key).is_some(), "{key}");
        }
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn overwriting_existing_key_does_not_evict() {
        let cache = small_cache(2, 60);

        cache.set_value(Namespace::Opportunities, "a", json!(1));
        cache.set_value(Namespace::Opportunities, "b", json!(2));
        cache.set_value(Namespace::Opportunities, "a", json!(3));

        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(*cache.get(Namespace::Opportunities, "a").unwrap(), json!(3));
    }

    #[test]
    fn namespaces_are_independent() {
        let cache = OpportunityCache::default();

        cache.set_value(Namespace::Prices, "k", json!("price"));
        cache.set_value(Namespace::Pools, "k", json!("pool"));

        assert_eq!(*cache.get(Namespace::Prices, "k").unwrap(), json!("price"));
        assert_eq!(*cache.get(Namespace::Pools, "k").unwrap(), json!("pool"));
        assert!(cache.get(Namespace::Opportunities, "k").is_none());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let cache = OpportunityCache::default();
        let start = Instant::now();

        cache.set_value_at(Namespace::Prices, "old", json!(1), start);
        cache.set_value_at(Namespace::MarketSnapshots, "snap", json!(2), start);

        let removed = cache.sweep_expired_at(start + Duration::from_secs(20));

        assert_eq!(removed, 1);
        assert!(cache.is_empty(Namespace::Prices));
        assert_eq!(cache.len(Namespace::MarketSnapshots), 1);
    }

    #[test]
    fn typed_round_trip() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Quote {
            rate: f64,
            venue: String,
        }

        let cache = OpportunityCache::default();
        let quote = Quote {
            rate: 0.00026,
            venue: "uniswap".to_string(),
        };

        cache.set(Namespace::Prices, "q", &quote).unwrap();

        assert_eq!(cache.get_as::<Quote>(Namespace::Prices, "q"), Some(quote));
        assert_eq!(cache.get_as::<Vec<u8>>(Namespace::Prices, "q"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_readers_and_writer() {
        let cache = Arc::new(OpportunityCache::default());
        cache.set_value(Namespace::Opportunities, "latest", json!([]));

        let writer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..200 {
                    cache.set_value(Namespace::Opportunities, "latest", json!([i]));
                    tokio::task::yield_now().await;
                }
            })
        };
        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let value = cache.get(Namespace::Opportunities, "latest").unwrap();
                    assert!(value.is_array());
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn writes_to_one_namespace_do_not_block_another() {
        let cache = Arc::new(OpportunityCache::default());
        cache.set_value(Namespace::Prices, "USDC/WETH", json!({"venueA": 0.00026}));

        // an in-flight Opportunities write holds its namespace lock
        let _writing = cache
            .shard(Namespace::Opportunities)
            .write_lock
            .lock()
            .unwrap();

        let prices = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let value = cache.get(Namespace::Prices, "USDC/WETH");
                cache.set_value(Namespace::Prices, "DAI/USDC", json!({"curve": 1.0}));
                value
            })
        };

        let value = tokio::time::timeout(Duration::from_secs(1), prices)
            .await
            .expect("prices namespace blocked by an opportunities write")
            .unwrap();
        assert_eq!(value.unwrap()["venueA"], 0.00026);
        assert_eq!(cache.len(Namespace::Prices), 2);
    }
}
