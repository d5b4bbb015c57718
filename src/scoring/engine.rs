/// Wallet score computation
///
/// One computation fans out to the holdings aggregator and every built-in
/// extractor at once. Holdings are mandatory: if they are unavailable the
/// computation fails. Extractors absorb their own failures as zeros.
///
/// Scores are cached per wallet; `refresh` skips the cache read but still
/// writes the fresh score. Concurrent misses for one wallet share a single
/// computation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::formula::{apply_rule_overrides, rule_points, CanonicalFormula, ScoreFormula, ScoreInputs};
use super::rank::RankResolver;
use super::types::{MetricEntry, WalletScore};
use crate::core::{MetricType, SingleFlight, Sweep, TtlCache, WalletAddress};
use crate::database::{ReferenceData, ScoreStore};
use crate::holdings::HoldingsAggregator;
use crate::metrics::AnalyticsService;

#[derive(thiserror::Error, Debug, Clone)]
pub enum ScoreError {
    #[error("Holdings unavailable: {0}")]
    Holdings(String),
}

pub struct ScoreEngine {
    holdings: Arc<HoldingsAggregator>,
    analytics: Arc<AnalyticsService>,
    reference: Arc<ReferenceData>,
    ranks: Arc<RankResolver>,
    formula: Arc<dyn ScoreFormula>,
    store: Option<Arc<dyn ScoreStore>>,
    ttl: Duration,
    cache: Arc<TtlCache<WalletAddress, WalletScore>>,
    inflight: SingleFlight<WalletAddress, Result<WalletScore, ScoreError>>,
}

impl ScoreEngine {
    pub fn new(
        holdings: Arc<HoldingsAggregator>,
        analytics: Arc<AnalyticsService>,
        reference: Arc<ReferenceData>,
        ranks: Arc<RankResolver>,
        ttl: Duration,
    ) -> Self {
        Self {
            holdings,
            analytics,
            reference,
            ranks,
            formula: Arc::new(CanonicalFormula),
            store: None,
            ttl,
            cache: Arc::new(TtlCache::new("wallet_scores", ttl)),
            inflight: SingleFlight::new(),
        }
    }

    pub fn with_formula(mut self, formula: Arc<dyn ScoreFormula>) -> Self {
        self.formula = formula;
        self
    }

    /// Persist computed scores and serve fresh persisted ones on a cache miss
    pub fn with_store(mut self, store: Arc<dyn ScoreStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ranks(&self) -> &RankResolver {
        &self.ranks
    }

    pub fn caches(&self) -> Vec<Arc<dyn Sweep>> {
        vec![self.cache.clone() as Arc<dyn Sweep>, self.ranks.cache()]
    }

    /// Score for the wallet, or the empty fallback score when holdings are down
    pub async fn score_or_fallback(self: &Arc<Self>, wallet: &WalletAddress, refresh: bool) -> WalletScore {
        match self.calculate_wallet_score(wallet, refresh).await {
            Ok(score) => score,
            Err(e) => {
                warn!("⚠️ Score for {} unavailable, serving empty score: {}", wallet, e);
                WalletScore::empty(wallet)
            }
        }
    }

    #[instrument(skip_all, fields(wallet = %wallet, refresh = refresh))]
    pub async fn calculate_wallet_score(
        self: &Arc<Self>,
        wallet: &WalletAddress,
        refresh: bool,
    ) -> Result<WalletScore, ScoreError> {
        if !refresh {
            if let Some(hit) = self.cache.get(wallet) {
                debug!("📦 Score cache hit for {}", wallet);
                return Ok(hit);
            }
            if let Some(persisted) = self.load_persisted(wallet).await {
                self.cache.set(wallet.clone(), persisted.clone());
                return Ok(persisted);
            }
        }

        let engine = Arc::clone(self);
        let key = wallet.clone();
        self.inflight
            .run(wallet.clone(), move || async move { engine.compute_and_store(&key).await })
            .await
    }

    async fn load_persisted(&self, wallet: &WalletAddress) -> Option<WalletScore> {
        let store = self.store.as_ref()?;
        match store.load_score(wallet).await {
            Ok(Some(score)) => {
                let fresh = (Utc::now() - score.last_updated)
                    .to_std()
                    .map_or(false, |age| age < self.ttl);
                fresh.then_some(score)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("⚠️ Persisted score unreadable for {}: {}", wallet, e);
                None
            }
        }
    }

    async fn compute_and_store(&self, wallet: &WalletAddress) -> Result<WalletScore, ScoreError> {
        let score = self.compute(wallet).await?;
        self.cache.set(wallet.clone(), score.clone());

        if let Some(store) = &self.store {
            if let Err(e) = store.save_score(&score).await {
                warn!("⚠️ Failed to persist score for {}: {}", wallet, e);
            }
        }

        info!(
            "🏆 {} scored {} points ({})",
            wallet,
            score.total_points,
            score.rank.as_ref().map_or("unranked", |r| r.name.as_str())
        );
        Ok(score)
    }

    async fn compute(&self, wallet: &WalletAddress) -> Result<WalletScore, ScoreError> {
        let rules = match self.reference.points_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("⚠️ Points rules unavailable, using formulas only: {}", e);
                Arc::new(Vec::new())
            }
        };
        let wants_metrics = rules.iter().any(|r| r.metric_type == MetricType::Metric);

        let x = self.analytics.extractors();
        let (
            stats,
            bridge,
            swap,
            tydro,
            gm,
            inkypump,
            shellies,
            zns,
            nft2me,
            nft_trading,
            marvk,
            perp_deposits,
            nado,
            analytics,
        ) = tokio::join!(
            self.holdings.try_stats(wallet),
            x.bridge.extract(wallet),
            x.swap.extract(wallet),
            x.tydro.extract(wallet),
            x.gm.extract(wallet),
            x.inkypump.extract(wallet),
            x.shellies.extract(wallet),
            x.zns.extract(wallet),
            x.nft2me.extract(wallet),
            x.nft_trading.extract(wallet),
            x.marvk.extract(wallet),
            x.perp_deposits.extract(wallet),
            x.nado.extract(wallet),
            async {
                if wants_metrics {
                    Some(self.analytics.wallet_analytics(wallet).await)
                } else {
                    None
                }
            },
        );

        let stats = stats.map_err(|e| ScoreError::Holdings(e.to_string()))?;

        let inputs = ScoreInputs {
            stats,
            bridge,
            swap,
            tydro,
            gm,
            inkypump,
            shellies,
            zns,
            nft2me,
            nft_trading,
            marvk,
            perp_deposits,
            nado,
        };

        let mut breakdown = self.formula.score(&inputs);
        apply_rule_overrides(&mut breakdown, &rules);

        if let Some(analytics) = analytics {
            for rule in rules.iter().filter(|r| r.metric_type == MetricType::Metric) {
                let Some(result) = analytics.metric(&rule.metric_key) else {
                    debug!("No metric definition for rule {}", rule.metric_key);
                    continue;
                };
                breakdown.metrics.insert(
                    rule.metric_key.clone(),
                    MetricEntry {
                        value: result.total_value,
                        points: rule_points(rule, result.total_value),
                    },
                );
            }
        }

        let total_points = breakdown.total_points();
        let rank = self.ranks.resolve(total_points).await;

        Ok(WalletScore {
            wallet_address: wallet.clone(),
            total_points,
            rank,
            breakdown,
            last_updated: Utc::now(),
            is_fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::{
        AggregationType, AssetType, CalculationMode, MetricCurrency, PointsRange, PointsRule,
    };
    use crate::database::memory::fixtures::{enriched, tx, wallet, WALLET};
    use crate::database::InMemoryStore;
    use crate::enrichment::events::fixtures::transfer_log;
    use crate::extractors::{ExtractorContext, Extractors};
    use crate::holdings::aggregator::fixtures::{asset, token, FakeExplorer};
    use crate::metrics::engine::fixtures::metric;
    use crate::metrics::MetricEngine;
    use crate::scoring::rank::fixtures::tiled;
    use crate::util::explorer::TxStats;
    use crate::util::token_pricing::fixtures::{pricer, USDC};
    use crate::util::{CoingeckoSource, DexScreenerClient, PriceOracle, TokenPricer};
    use alloy_primitives::U256;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BRIDGE: &str = "0x00000000000000000000000000000000000000b2";
    const RELAYER: &str = "0x00000000000000000000000000000000000000c3";
    const ROUTER: &str = "0x00000000000000000000000000000000000000e1";
    const GAME: &str = "0x00000000000000000000000000000000000000d1";
    const MEME: &str = "0x000000000000000000000000000000000000d06e";

    struct Harness {
        store: Arc<InMemoryStore>,
        explorer: Arc<FakeExplorer>,
        engine: Arc<ScoreEngine>,
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.protocols.bridge.contracts = vec![BRIDGE.to_string()];
        config.protocols.swap.routers = vec![ROUTER.to_string()];
        config
    }

    async fn harness_with(explorer: FakeExplorer, config: Config, pricer: TokenPricer) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        store.set_ranks(tiled()).await;

        let explorer = Arc::new(explorer);
        let pricer = Arc::new(pricer);
        let reference = Arc::new(ReferenceData::new(store.clone(), Duration::from_secs(300)));
        let ctx = ExtractorContext {
            store: store.clone(),
            pricer: pricer.clone(),
            sanity: config.sanity.clone(),
        };
        let extractors = Arc::new(Extractors::new(ctx, &config));
        let holdings = Arc::new(HoldingsAggregator::new(
            explorer.clone(),
            pricer.clone(),
            reference.clone(),
            &config.apis,
            &config.cache,
        ));
        let analytics = Arc::new(AnalyticsService::new(
            Arc::new(MetricEngine::new(store.clone(), pricer)),
            extractors,
            reference.clone(),
            Duration::from_secs(30),
        ));
        let ranks = Arc::new(RankResolver::new(store.clone(), Duration::from_secs(60)));
        let engine = ScoreEngine::new(holdings, analytics, reference, ranks, Duration::from_secs(30))
            .with_store(store.clone());

        Harness {
            store,
            explorer,
            engine: Arc::new(engine),
        }
    }

    async fn harness(explorer: FakeExplorer) -> Harness {
        harness_with(explorer, test_config(), pricer()).await
    }

    #[tokio::test]
    async fn test_empty_wallet_scores_zero_with_lowest_rank() {
        let h = harness(FakeExplorer::default()).await;
        let score = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();

        assert_eq!(score.total_points, 0);
        assert_eq!(score.rank.map(|r| r.name), Some("Bronze".to_string()));
        assert!(!score.is_fallback);
        assert!(score.breakdown.platforms.values().all(|p| p.points == 0));
    }

    #[tokio::test]
    async fn test_hundred_transactions_hit_first_tier() {
        let h = harness(FakeExplorer {
            stats: TxStats {
                total_txns: 100,
                ..TxStats::default()
            },
            ..FakeExplorer::default()
        })
        .await;

        let score = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        assert_eq!(score.breakdown.native["total_transactions"].points, 100);
        assert_eq!(score.total_points, 100);
    }

    #[tokio::test]
    async fn test_thousand_dollar_token_holdings() {
        let h = harness(FakeExplorer {
            token_pages: vec![vec![token(USDC, "1000000000", Some(1000.0))]],
            ..FakeExplorer::default()
        })
        .await;
        h.store.set_tracked_assets(vec![asset(AssetType::Erc20Token, USDC, 6)]).await;

        let score = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        assert_eq!(score.breakdown.native["token_holdings"].points, 1500);
        assert_eq!(score.total_points, 1500);
        assert_eq!(score.rank.map(|r| r.name), Some("Silver".to_string()));
    }

    #[tokio::test]
    async fn test_bridge_in_uses_ceil() {
        let h = harness(FakeExplorer::default()).await;
        h.store
            .add_enriched(vec![enriched(
                BRIDGE,
                "relay",
                "0",
                json!([transfer_log(USDC, RELAYER, WALLET, 199_995_000)]),
                json!([]),
            )])
            .await;

        let score = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        assert_eq!(score.breakdown.platforms["bridge_in"].points, 1000);
        assert_eq!(score.breakdown.platforms["bridge_in"].tx_count, 1);
    }

    #[tokio::test]
    async fn test_price_timeouts_still_produce_a_score() {
        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&slow)
            .await;

        let config = test_config();
        let source = CoingeckoSource::new(&slow.uri(), Duration::from_millis(200)).unwrap();
        let oracle = Arc::new(PriceOracle::new(Arc::new(source), &config.prices));
        let dex = Arc::new(
            DexScreenerClient::new(&slow.uri(), "ink", Duration::from_millis(200), Duration::from_secs(30)).unwrap(),
        );
        let pricer = TokenPricer::new(oracle, dex, &config.tokens);

        let h = harness_with(
            FakeExplorer {
                balance_wei: U256::from(1_000_000_000_000_000_000u128),
                stats: TxStats {
                    total_txns: 5,
                    ..TxStats::default()
                },
                token_pages: vec![vec![token(MEME, "1000000000000000000000", None)]],
                ..FakeExplorer::default()
            },
            config,
            pricer,
        )
        .await;
        h.store.set_tracked_assets(vec![asset(AssetType::MemeCoin, MEME, 18)]).await;

        let score = h.engine.score_or_fallback(&wallet(), false).await;
        assert!(!score.is_fallback);
        assert_eq!(score.breakdown.native["meme_coins"].points, 0);
        assert_eq!(score.total_points, 100);

        let stats = h.engine.holdings.get_all_stats(&wallet()).await;
        // Canonical ETH fallback
        assert_eq!(stats.balance_usd, 3500.0);
    }

    #[tokio::test]
    async fn test_holdings_outage_serves_empty_score_uncached() {
        let h = harness(FakeExplorer::default()).await;
        h.explorer.failing.store(true, Ordering::SeqCst);

        assert!(h.engine.calculate_wallet_score(&wallet(), false).await.is_err());
        let score = h.engine.score_or_fallback(&wallet(), false).await;
        assert!(score.is_fallback);
        assert_eq!(score.total_points, 0);
        assert!(score.rank.is_none());
        assert!(h.engine.cache.get(&wallet()).is_none());
    }

    #[tokio::test]
    async fn test_second_request_is_cached_and_identical() {
        let h = harness(FakeExplorer::default()).await;
        h.store.add_transactions(vec![tx(ROUTER, "swap", "0")]).await;

        let first = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        let reads = h.store.query_count();
        let calls = h.explorer.calls.load(Ordering::SeqCst);
        assert!(reads > 0);

        let second = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(h.store.query_count(), reads);
        assert_eq!(h.explorer.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache_read() {
        let h = harness(FakeExplorer::default()).await;
        let first = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        let refreshed = h.engine.calculate_wallet_score(&wallet(), true).await.unwrap();
        assert!(refreshed.last_updated >= first.last_updated);

        let cached = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        assert_eq!(cached.last_updated, refreshed.last_updated);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_computation() {
        let h = harness(FakeExplorer::default()).await;
        let w = wallet();
        let (a, b) = tokio::join!(
            h.engine.calculate_wallet_score(&w, false),
            h.engine.calculate_wallet_score(&w, false),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        // balance, tx stats, one NFT page, one token page
        assert_eq!(h.explorer.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_persisted_score_served_by_fresh_engine() {
        let h = harness(FakeExplorer {
            stats: TxStats {
                total_txns: 150,
                ..TxStats::default()
            },
            ..FakeExplorer::default()
        })
        .await;
        let original = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();

        let other = harness(FakeExplorer::default()).await;
        let engine = Arc::new(
            ScoreEngine::new(
                other.engine.holdings.clone(),
                other.engine.analytics.clone(),
                other.engine.reference.clone(),
                other.engine.ranks.clone(),
                Duration::from_secs(30),
            )
            .with_store(h.store.clone()),
        );

        let served = engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        assert_eq!(served.total_points, original.total_points);
        assert_eq!(other.explorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_points_rules_override_and_score_metrics() {
        let h = harness(FakeExplorer {
            stats: TxStats {
                total_txns: 100,
                ..TxStats::default()
            },
            ..FakeExplorer::default()
        })
        .await;
        h.store
            .add_transactions(vec![tx(GAME, "play", "0"), tx(GAME, "play", "0")])
            .await;
        h.store
            .set_metric_definitions(vec![metric(
                "arcade",
                AggregationType::Count,
                MetricCurrency::Count,
                &[GAME],
                &[],
            )])
            .await;
        h.store
            .set_points_rules(vec![
                PointsRule {
                    metric_key: "total_transactions".into(),
                    metric_type: MetricType::Native,
                    calculation_mode: CalculationMode::Range,
                    ranges: vec![PointsRange { min: 0.0, max: None, points: 40.0 }],
                },
                PointsRule {
                    metric_key: "arcade".into(),
                    metric_type: MetricType::Metric,
                    calculation_mode: CalculationMode::Multiplier,
                    ranges: vec![PointsRange { min: 0.0, max: None, points: 3.0 }],
                },
            ])
            .await;

        let score = h.engine.calculate_wallet_score(&wallet(), false).await.unwrap();
        assert_eq!(score.breakdown.native["total_transactions"].points, 40);
        assert_eq!(score.breakdown.metrics["arcade"].points, 6);
        assert_eq!(score.total_points, 46);
    }
}
