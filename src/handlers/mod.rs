/// HTTP handlers and service wiring
///
/// `AppState` owns one instance of every service. `AppState::assemble`
/// builds the whole graph from a store, an explorer client and a pricer,
/// so the binary and the route tests wire services identically.

pub mod error;
pub mod wallet_handler;
pub mod analytics_handler;
pub mod rank_handler;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use tracing::info;

use crate::config::Config;
use crate::core::{Sweep, WalletAddress};
use crate::database::{ReferenceData, ReferenceStore, ScoreStore, TransactionStore};
use crate::extractors::{ExtractorContext, Extractors};
use crate::holdings::HoldingsAggregator;
use crate::metrics::{AnalyticsService, MetricEngine};
use crate::scoring::{RankResolver, ScoreEngine};
use crate::util::{ExplorerClient, TokenPricer};

/// Shared services behind every route
#[derive(Clone)]
pub struct AppState {
    pub holdings: Arc<HoldingsAggregator>,
    pub analytics: Arc<AnalyticsService>,
    pub scores: Arc<ScoreEngine>,
    pub reference: Arc<ReferenceData>,
    pub pricer: Arc<TokenPricer>,
}

impl AppState {
    pub fn assemble<S>(
        config: &Config,
        store: Arc<S>,
        explorer: Arc<dyn ExplorerClient>,
        pricer: Arc<TokenPricer>,
    ) -> Self
    where
        S: TransactionStore + ReferenceStore + ScoreStore + 'static,
    {
        info!("🚀 Wiring scoring services");
        let cache = &config.cache;

        let reference = Arc::new(ReferenceData::new(
            store.clone(),
            Duration::from_secs(cache.reference_ttl_secs),
        ));

        let ctx = ExtractorContext {
            store: store.clone(),
            pricer: pricer.clone(),
            sanity: config.sanity.clone(),
        };
        let extractors = Arc::new(Extractors::new(ctx, config));

        let holdings = Arc::new(HoldingsAggregator::new(
            explorer,
            pricer.clone(),
            reference.clone(),
            &config.apis,
            cache,
        ));

        let analytics = Arc::new(AnalyticsService::new(
            Arc::new(MetricEngine::new(store.clone(), pricer.clone())),
            extractors,
            reference.clone(),
            Duration::from_secs(cache.analytics_ttl_secs),
        ));

        let ranks = Arc::new(RankResolver::new(
            store.clone(),
            Duration::from_secs(cache.ranks_ttl_secs),
        ));

        let mut scores = ScoreEngine::new(
            holdings.clone(),
            analytics.clone(),
            reference.clone(),
            ranks,
            Duration::from_secs(cache.score_ttl_secs),
        );
        if config.database.persist_scores {
            scores = scores.with_store(store);
        }

        info!("✅ Scoring services ready");
        Self {
            holdings,
            analytics,
            scores: Arc::new(scores),
            reference,
            pricer,
        }
    }

    /// Every TTL cache in the service graph, for the background sweeper
    pub fn caches(&self) -> Vec<Arc<dyn Sweep>> {
        let mut caches = vec![
            self.holdings.cache(),
            self.pricer.oracle().cache(),
            self.pricer.dex().cache(),
        ];
        caches.extend(self.reference.caches());
        caches.extend(self.analytics.caches());
        caches.extend(self.analytics.extractors().caches());
        caches.extend(self.scores.caches());
        caches
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ranks", get(rank_handler::ranks))
        .route("/api/wallet/:address/stats", get(wallet_handler::stats))
        .route("/api/wallet/:address/score", get(wallet_handler::score))
        .route("/api/wallet/:address/:slug", get(wallet_handler::protocol))
        .route("/api/analytics/:address/:slug", get(analytics_handler::metric))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Validate before any service call
pub(crate) fn parse_address(raw: &str) -> Result<WalletAddress, ApiError> {
    Ok(WalletAddress::parse(raw)?)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::holdings::aggregator::fixtures::FakeExplorer;
    use crate::scoring::rank::fixtures::tiled;
    use crate::util::token_pricing::fixtures::pricer;

    pub struct TestServer {
        pub base: String,
        pub store: Arc<InMemoryStore>,
        pub explorer: Arc<FakeExplorer>,
    }

    /// Serve the full router on an ephemeral port
    pub async fn serve(config: Config, explorer: FakeExplorer) -> TestServer {
        let store = Arc::new(InMemoryStore::new());
        store.set_ranks(tiled()).await;
        let explorer = Arc::new(explorer);
        let state = AppState::assemble(&config, store.clone(), explorer.clone(), Arc::new(pricer()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            store,
            explorer,
        }
    }

    pub async fn get(url: String) -> (u16, serde_json::Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }
}
