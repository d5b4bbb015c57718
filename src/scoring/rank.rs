/// Rank tier lookup
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::core::{Rank, Sweep, TtlCache};
use crate::database::{ReferenceStore, StoreError};

/// First rank, in ascending `min_points` order, whose range contains `points`
pub fn resolve_rank(ranks: &[Rank], points: u64) -> Option<Rank> {
    ranks
        .iter()
        .find(|r| points >= r.min_points && r.max_points.map_or(true, |max| points <= max))
        .cloned()
}

/// Rank table behind its own TTL cache
pub struct RankResolver {
    store: Arc<dyn ReferenceStore>,
    cache: Arc<TtlCache<(), Arc<Vec<Rank>>>>,
}

impl RankResolver {
    pub fn new(store: Arc<dyn ReferenceStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: Arc::new(TtlCache::with_stale_window("ranks", ttl, 10)),
        }
    }

    pub async fn ranks(&self) -> Result<Arc<Vec<Rank>>, StoreError> {
        if let Some(hit) = self.cache.get(&()) {
            return Ok(hit);
        }

        match self.store.ranks().await {
            Ok(mut ranks) => {
                ranks.sort_by_key(|r| r.min_points);
                let ranks = Arc::new(ranks);
                self.cache.set((), ranks.clone());
                Ok(ranks)
            }
            Err(e) => self.cache.get_stale(&()).map(Ok).unwrap_or(Err(e)),
        }
    }

    /// `None` when no rank matches or the table is unreadable
    pub async fn resolve(&self, points: u64) -> Option<Rank> {
        match self.ranks().await {
            Ok(ranks) => resolve_rank(&ranks, points),
            Err(e) => {
                warn!("⚠️ Rank table unavailable: {}", e);
                None
            }
        }
    }

    pub fn cache(&self) -> Arc<dyn Sweep> {
        self.cache.clone()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn rank(name: &str, min_points: u64, max_points: Option<u64>) -> Rank {
        Rank {
            name: name.to_string(),
            min_points,
            max_points,
            color: "#888888".to_string(),
            logo_url: None,
            display_order: min_points as i32,
        }
    }

    /// 0-999, 1000-4999, 5000+
    pub fn tiled() -> Vec<Rank> {
        vec![
            rank("Bronze", 0, Some(999)),
            rank("Silver", 1000, Some(4999)),
            rank("Gold", 5000, None),
        ]
    }
}
