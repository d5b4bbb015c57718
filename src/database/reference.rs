/// Cached view over the admin reference tables
///
/// Tracked assets, metric definitions and points rules change rarely, so
/// each list is cached for the reference TTL. A failed refresh serves the
/// previous list when one is still retained.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{ReferenceStore, StoreError};
use crate::core::{AssetType, MetricDefinition, PointsRule, Sweep, TrackedAsset, TtlCache};

pub struct ReferenceData {
    store: Arc<dyn ReferenceStore>,
    assets: Arc<TtlCache<(), Arc<Vec<TrackedAsset>>>>,
    metrics: Arc<TtlCache<(), Arc<Vec<MetricDefinition>>>>,
    rules: Arc<TtlCache<(), Arc<Vec<PointsRule>>>>,
}

impl ReferenceData {
    pub fn new(store: Arc<dyn ReferenceStore>, ttl: Duration) -> Self {
        Self {
            store,
            assets: Arc::new(TtlCache::with_stale_window("tracked_assets", ttl, 10)),
            metrics: Arc::new(TtlCache::with_stale_window("metric_definitions", ttl, 10)),
            rules: Arc::new(TtlCache::with_stale_window("points_rules", ttl, 10)),
        }
    }

    pub async fn tracked_assets(&self) -> Result<Arc<Vec<TrackedAsset>>, StoreError> {
        if let Some(cached) = self.assets.get(&()) {
            return Ok(cached);
        }

        match self.store.tracked_assets().await {
            Ok(rows) => {
                debug!("📋 Loaded {} tracked assets", rows.len());
                let rows = Arc::new(rows);
                self.assets.set((), rows.clone());
                Ok(rows)
            }
            Err(e) => self.assets.get_stale(&()).map(Ok).unwrap_or(Err(e)),
        }
    }

    pub async fn tracked_assets_of(&self, asset_type: AssetType) -> Vec<TrackedAsset> {
        match self.tracked_assets().await {
            Ok(assets) => assets
                .iter()
                .filter(|a| a.asset_type == asset_type)
                .cloned()
                .collect(),
            Err(e) => {
                warn!("⚠️ Tracked assets unavailable: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn metric_definitions(&self) -> Result<Arc<Vec<MetricDefinition>>, StoreError> {
        if let Some(cached) = self.metrics.get(&()) {
            return Ok(cached);
        }

        match self.store.metric_definitions().await {
            Ok(rows) => {
                let rows = Arc::new(rows);
                self.metrics.set((), rows.clone());
                Ok(rows)
            }
            Err(e) => self.metrics.get_stale(&()).map(Ok).unwrap_or(Err(e)),
        }
    }

    pub async fn metric_by_slug(&self, slug: &str) -> Result<Option<MetricDefinition>, StoreError> {
        let metrics = self.metric_definitions().await?;
        Ok(metrics.iter().find(|m| m.slug == slug).cloned())
    }

    pub async fn points_rules(&self) -> Result<Arc<Vec<PointsRule>>, StoreError> {
        if let Some(cached) = self.rules.get(&()) {
            return Ok(cached);
        }

        match self.store.points_rules().await {
            Ok(rows) => {
                let rows = Arc::new(rows);
                self.rules.set((), rows.clone());
                Ok(rows)
            }
            Err(e) => self.rules.get_stale(&()).map(Ok).unwrap_or(Err(e)),
        }
    }

    /// Drop every cached list so the next read hits the store
    pub fn invalidate(&self) {
        self.assets.clear();
        self.metrics.clear();
        self.rules.clear();
    }

    pub fn caches(&self) -> Vec<Arc<dyn Sweep>> {
        vec![
            self.assets.clone() as Arc<dyn Sweep>,
            self.metrics.clone() as Arc<dyn Sweep>,
            self.rules.clone() as Arc<dyn Sweep>,
        ]
    }
}
