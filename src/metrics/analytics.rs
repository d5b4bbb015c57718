/// Analytics surface: slug dispatch over built-in extractors and admin metrics
///
/// Two cache layers sit here. The whole-wallet response (every admin
/// metric) is cached per wallet, and each `(wallet, slug)` route response
/// is cached on its own. They share the TTL but are never invalidated
/// together.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::engine::{MetricEngine, MetricResult};
use crate::core::{Sweep, TtlCache, WalletAddress};
use crate::database::{ReferenceData, StoreError};
use crate::extractors::Extractors;

#[derive(thiserror::Error, Debug)]
pub enum AnalyticsError {
    #[error("Unknown metric: {0}")]
    UnknownSlug(String),

    #[error("Reference data unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletAnalytics {
    pub wallet_address: String,
    pub metrics: Vec<MetricResult>,
}

impl WalletAnalytics {
    pub fn metric(&self, slug: &str) -> Option<&MetricResult> {
        self.metrics.iter().find(|m| m.slug == slug)
    }
}

pub struct AnalyticsService {
    engine: Arc<MetricEngine>,
    extractors: Arc<Extractors>,
    reference: Arc<ReferenceData>,
    wallet_cache: Arc<TtlCache<WalletAddress, WalletAnalytics>>,
    route_cache: Arc<TtlCache<(WalletAddress, String), serde_json::Value>>,
}

impl AnalyticsService {
    pub fn new(
        engine: Arc<MetricEngine>,
        extractors: Arc<Extractors>,
        reference: Arc<ReferenceData>,
        ttl: Duration,
    ) -> Self {
        Self {
            engine,
            extractors,
            reference,
            wallet_cache: Arc::new(TtlCache::new("wallet_analytics", ttl)),
            route_cache: Arc::new(TtlCache::new("analytics_routes", ttl)),
        }
    }

    pub fn extractors(&self) -> &Extractors {
        &self.extractors
    }

    /// Every admin metric for the wallet; an unreadable catalog yields none
    #[instrument(skip_all, fields(wallet = %wallet))]
    pub async fn wallet_analytics(&self, wallet: &WalletAddress) -> WalletAnalytics {
        if let Some(hit) = self.wallet_cache.get(wallet) {
            return hit;
        }

        let definitions = match self.reference.metric_definitions().await {
            Ok(definitions) => definitions,
            Err(e) => {
                warn!("⚠️ Metric definitions unavailable: {}", e);
                return WalletAnalytics {
                    wallet_address: wallet.to_string(),
                    metrics: Vec::new(),
                };
            }
        };

        let metrics = futures_util::future::join_all(
            definitions.iter().map(|metric| self.engine.query(wallet, metric)),
        )
        .await;

        let analytics = WalletAnalytics {
            wallet_address: wallet.to_string(),
            metrics,
        };
        self.wallet_cache.set(wallet.clone(), analytics.clone());
        analytics
    }

    /// Route-level dispatch: built-in extractor slugs first, then admin metrics
    #[instrument(skip_all, fields(wallet = %wallet, slug = %slug))]
    pub async fn by_slug(&self, wallet: &WalletAddress, slug: &str) -> Result<serde_json::Value, AnalyticsError> {
        let key = (wallet.clone(), slug.to_string());
        if let Some(hit) = self.route_cache.get(&key) {
            debug!("📦 Analytics route cache hit for {}/{}", wallet, slug);
            return Ok(hit);
        }

        let value = if let Some(extractor) = self.extractors.by_slug(slug) {
            extractor.extract_json(wallet).await
        } else {
            let metric = self
                .reference
                .metric_by_slug(slug)
                .await?
                .ok_or_else(|| AnalyticsError::UnknownSlug(slug.to_string()))?;
            let result = self.engine.query(wallet, &metric).await;
            serde_json::to_value(result).unwrap_or(serde_json::Value::Null)
        };

        self.route_cache.set(key, value.clone());
        Ok(value)
    }

    pub fn caches(&self) -> Vec<Arc<dyn Sweep>> {
        vec![
            self.wallet_cache.clone() as Arc<dyn Sweep>,
            self.route_cache.clone() as Arc<dyn Sweep>,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::{AggregationType, MetricCurrency};
    use crate::database::memory::fixtures::{tx, wallet};
    use crate::database::InMemoryStore;
    use crate::extractors::fixtures::context;
    use crate::metrics::engine::fixtures::metric;
    use crate::util::token_pricing::fixtures::pricer;

    const GAME: &str = "0x00000000000000000000000000000000000000d1";

    async fn service(store: Arc<InMemoryStore>) -> AnalyticsService {
        store
            .set_metric_definitions(vec![metric(
                "arcade",
                AggregationType::Count,
                MetricCurrency::Count,
                &[GAME],
                &[],
            )])
            .await;

        AnalyticsService::new(
            Arc::new(MetricEngine::new(store.clone(), Arc::new(pricer()))),
            Arc::new(Extractors::new(context(store.clone()), &Config::default())),
            Arc::new(ReferenceData::new(store, Duration::from_secs(300))),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_dispatch_builtin_admin_and_unknown() {
        let store = Arc::new(InMemoryStore::new());
        store.add_transactions(vec![tx(GAME, "play", "0"), tx(GAME, "play", "0")]).await;
        let service = service(store).await;

        let builtin = service.by_slug(&wallet(), "swap").await.unwrap();
        assert_eq!(builtin["swap_count"], 0);

        let admin = service.by_slug(&wallet(), "arcade").await.unwrap();
        assert_eq!(admin["total_count"], 2);
        assert_eq!(admin["slug"], "arcade");

        let unknown = service.by_slug(&wallet(), "nope").await;
        assert!(matches!(unknown, Err(AnalyticsError::UnknownSlug(_))));
    }

    #[tokio::test]
    async fn test_route_cache_serves_repeat_requests() {
        let store = Arc::new(InMemoryStore::new());
        store.add_transactions(vec![tx(GAME, "play", "0")]).await;
        let service = service(store.clone()).await;

        let first = service.by_slug(&wallet(), "arcade").await.unwrap();
        let reads = store.query_count();
        let second = service.by_slug(&wallet(), "arcade").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.query_count(), reads);
    }

    #[tokio::test]
    async fn test_wallet_analytics_covers_every_definition() {
        let store = Arc::new(InMemoryStore::new());
        store.add_transactions(vec![tx(GAME, "play", "0")]).await;
        let service = service(store).await;

        let analytics = service.wallet_analytics(&wallet()).await;
        assert_eq!(analytics.metrics.len(), 1);
        assert_eq!(analytics.metric("arcade").map(|m| m.total_count), Some(1));
    }
}
