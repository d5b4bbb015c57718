/// TTL cache shared by every component of the scoring pipeline
///
/// Each component owns its own `TtlCache` instance (injected, never global)
/// so tests get isolated caches. Reads and writes are not atomic with
/// respect to each other; a cold-key race causes a duplicate upstream fetch,
/// never a wrong value.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    /// How long an entry survives the sweeper; `get_stale` serves up to this age
    retain_for: Duration,
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            retain_for: ttl,
            entries: DashMap::new(),
        }
    }

    /// Entries stay readable through `get_stale` for `ttl * factor`
    pub fn with_stale_window(name: &'static str, ttl: Duration, factor: u32) -> Self {
        Self {
            name,
            ttl,
            retain_for: ttl * factor.max(1),
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Value younger than the TTL
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_within(key, self.ttl)
    }

    /// Value younger than the widened stale window
    pub fn get_stale(&self, key: &K) -> Option<V> {
        self.get_within(key, self.retain_for)
    }

    fn get_within(&self, key: &K, max_age: Duration) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() < max_age {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn set(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict everything past the retention window, returns the eviction count
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let retain_for = self.retain_for;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < retain_for);
        before.saturating_sub(self.entries.len())
    }
}

/// Object-safe handle used by the background sweeper
pub trait Sweep: Send + Sync {
    fn cache_name(&self) -> &'static str;
    fn sweep_expired(&self) -> usize;
}

impl<K, V> Sweep for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn cache_name(&self) -> &'static str {
        self.name
    }

    fn sweep_expired(&self) -> usize {
        self.sweep()
    }
}

/// Periodically evict expired entries independent of request traffic
pub fn spawn_sweeper(caches: Vec<Arc<dyn Sweep>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(every);
        loop {
            timer.tick().await;
            for cache in &caches {
                let evicted = cache.sweep_expired();
                if evicted > 0 {
                    debug!("🧹 Swept {} expired entries from {}", evicted, cache.cache_name());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new("test", Duration::from_secs(30));
        cache.set("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_window_widens_freshness() {
        let cache: TtlCache<String, u32> =
            TtlCache::with_stale_window("stats", Duration::from_secs(30), 10);
        cache.set("w".into(), 7);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(cache.get(&"w".to_string()), None);
        assert_eq!(cache.get_stale(&"w".to_string()), Some(7));
        assert_eq!(cache.sweep(), 0);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(cache.get_stale(&"w".to_string()), None);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_is_per_key() {
        let cache: TtlCache<(String, String), u32> = TtlCache::new("metrics", Duration::from_secs(30));
        cache.set(("w".into(), "bridge".into()), 1);
        cache.set(("w".into(), "swap".into()), 2);

        cache.invalidate(&("w".into(), "bridge".into()));
        assert_eq!(cache.get(&("w".into(), "bridge".into())), None);
        assert_eq!(cache.get(&("w".into(), "swap".into())), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_evicts() {
        let cache = Arc::new(TtlCache::<String, u32>::new("swept", Duration::from_secs(5)));
        cache.set("k".into(), 1);

        let handle = spawn_sweeper(vec![cache.clone() as Arc<dyn Sweep>], Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.is_empty());
        handle.abort();
    }
}
