/// Per-protocol metric extractors
///
/// Every extractor implements `ProtocolExtractor::try_extract`, which may
/// fail. Callers go through `Cached::extract`, which serves the per-wallet
/// TTL cache and turns any failure into the zero-valued output after
/// logging it. The scoring engine therefore never sees an extractor error.

pub mod amounts;
pub mod bridge;
pub mod swap;
pub mod lending;
pub mod token_launch;
pub mod activity;
pub mod nft_trading;
pub mod vesting;
pub mod deposits;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Config, SanityConfig};
use crate::core::{Sweep, TtlCache, WalletAddress};
use crate::database::{StoreError, TransactionStore};
use crate::enrichment::ParseError;
use crate::util::TokenPricer;

pub use activity::{ActivityCounts, ActivityExtractor};
pub use bridge::{BridgeExtractor, BridgeVolume};
pub use deposits::{DepositExtractor, DepositStats};
pub use lending::{LendingExtractor, LendingPosition};
pub use nft_trading::{NftTradingExtractor, NftTradingStats};
pub use swap::{SwapExtractor, SwapVolume};
pub use token_launch::{TokenLaunchExtractor, TokenLaunchStats};
pub use vesting::{VestingExtractor, VestingStats};

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Transaction store error: {0}")]
    Store(#[from] StoreError),

    #[error("Decode error: {0}")]
    Parse(#[from] ParseError),
}

/// Shared dependencies handed to every extractor
#[derive(Clone)]
pub struct ExtractorContext {
    pub store: Arc<dyn TransactionStore>,
    pub pricer: Arc<TokenPricer>,
    pub sanity: SanityConfig,
}

#[async_trait]
pub trait ProtocolExtractor: Send + Sync {
    type Output: Serialize + Default + Clone + Send + Sync + 'static;

    fn slug(&self) -> &'static str;

    async fn try_extract(&self, wallet: &WalletAddress) -> Result<Self::Output, ExtractError>;
}

/// TTL-cached, failure-absorbing wrapper around an extractor
pub struct Cached<E: ProtocolExtractor> {
    inner: E,
    cache: Arc<TtlCache<WalletAddress, E::Output>>,
}

impl<E: ProtocolExtractor> Cached<E> {
    pub fn new(inner: E, ttl: Duration) -> Self {
        let cache = Arc::new(TtlCache::new(inner.slug(), ttl));
        Self { inner, cache }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub async fn extract(&self, wallet: &WalletAddress) -> E::Output {
        if let Some(hit) = self.cache.get(wallet) {
            return hit;
        }

        match self.inner.try_extract(wallet).await {
            Ok(output) => {
                self.cache.set(wallet.clone(), output.clone());
                output
            }
            Err(e) => {
                warn!("⚠️ {} extractor failed for {}: {}", self.inner.slug(), wallet, e);
                E::Output::default()
            }
        }
    }

    pub fn invalidate(&self, wallet: &WalletAddress) {
        self.cache.invalidate(wallet);
    }
}

/// Object-safe view used for slug dispatch
#[async_trait]
pub trait SlugExtractor: Send + Sync {
    fn slug(&self) -> &'static str;
    async fn extract_json(&self, wallet: &WalletAddress) -> serde_json::Value;
    fn cache(&self) -> Arc<dyn Sweep>;
}

#[async_trait]
impl<E> SlugExtractor for Cached<E>
where
    E: ProtocolExtractor + 'static,
{
    fn slug(&self) -> &'static str {
        self.inner.slug()
    }

    async fn extract_json(&self, wallet: &WalletAddress) -> serde_json::Value {
        let output = self.extract(wallet).await;
        serde_json::to_value(output).unwrap_or_else(|e| {
            warn!("⚠️ {} output did not serialize: {}", self.inner.slug(), e);
            serde_json::Value::Null
        })
    }

    fn cache(&self) -> Arc<dyn Sweep> {
        self.cache.clone()
    }
}

/// Every built-in extractor, typed for the scoring engine
pub struct Extractors {
    pub bridge: Cached<BridgeExtractor>,
    pub swap: Cached<SwapExtractor>,
    pub tydro: Cached<LendingExtractor>,
    pub gm: Cached<ActivityExtractor>,
    pub inkypump: Cached<TokenLaunchExtractor>,
    pub shellies: Cached<ActivityExtractor>,
    pub zns: Cached<ActivityExtractor>,
    pub nft2me: Cached<ActivityExtractor>,
    pub nft_trading: Cached<NftTradingExtractor>,
    pub marvk: Cached<VestingExtractor>,
    pub perp_deposits: Cached<DepositExtractor>,
    pub nado: Cached<DepositExtractor>,
}

impl Extractors {
    pub fn new(ctx: ExtractorContext, config: &Config) -> Self {
        let ttl = Duration::from_secs(config.cache.analytics_ttl_secs);
        let protocols = &config.protocols;

        Self {
            bridge: Cached::new(BridgeExtractor::new(ctx.clone(), protocols.bridge.clone()), ttl),
            swap: Cached::new(SwapExtractor::new(ctx.clone(), protocols.swap.clone()), ttl),
            tydro: Cached::new(LendingExtractor::new(ctx.clone(), protocols.tydro.clone()), ttl),
            gm: Cached::new(ActivityExtractor::new("gm", ctx.clone(), protocols.gm.clone()), ttl),
            inkypump: Cached::new(
                TokenLaunchExtractor::new(ctx.clone(), protocols.inkypump.clone()),
                ttl,
            ),
            shellies: Cached::new(
                ActivityExtractor::new("shellies", ctx.clone(), protocols.shellies.clone()),
                ttl,
            ),
            zns: Cached::new(ActivityExtractor::new("zns", ctx.clone(), protocols.zns.clone()), ttl),
            nft2me: Cached::new(
                ActivityExtractor::new("nft2me", ctx.clone(), protocols.nft2me.clone()),
                ttl,
            ),
            nft_trading: Cached::new(
                NftTradingExtractor::new(ctx.clone(), protocols.nft_trading.clone()),
                ttl,
            ),
            marvk: Cached::new(VestingExtractor::new(ctx.clone(), protocols.marvk.clone()), ttl),
            perp_deposits: Cached::new(
                DepositExtractor::new("perp_deposits", ctx.clone(), protocols.perp_deposits.clone()),
                ttl,
            ),
            nado: Cached::new(DepositExtractor::new("nado", ctx, protocols.nado.clone()), ttl),
        }
    }

    fn all(&self) -> [&dyn SlugExtractor; 12] {
        [
            &self.bridge,
            &self.swap,
            &self.tydro,
            &self.gm,
            &self.inkypump,
            &self.shellies,
            &self.zns,
            &self.nft2me,
            &self.nft_trading,
            &self.marvk,
            &self.perp_deposits,
            &self.nado,
        ]
    }

    pub fn by_slug(&self, slug: &str) -> Option<&dyn SlugExtractor> {
        let found = self.all().into_iter().find(|e| e.slug() == slug);
        if found.is_none() {
            debug!("No built-in extractor for slug {}", slug);
        }
        found
    }

    pub fn slugs(&self) -> Vec<&'static str> {
        self.all().iter().map(|e| e.slug()).collect()
    }

    pub fn caches(&self) -> Vec<Arc<dyn Sweep>> {
        self.all().iter().map(|e| e.cache()).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::config::ActivityConfig;
    use crate::database::memory::fixtures::{tx, wallet};
    use crate::database::InMemoryStore;

    const GM: &str = "0x0000000000000000000000000000000000000099";

    fn gm_config() -> ActivityConfig {
        let mut config = ActivityConfig {
            contracts: vec![GM.to_string()],
            ..ActivityConfig::default()
        };
        config.categories.insert("gm".into(), vec!["gm".into()]);
        config
    }

    #[tokio::test]
    async fn test_failure_becomes_zero_and_is_not_cached() {
        let store = Arc::new(InMemoryStore::new());
        store.add_transactions(vec![tx(GM, "gm", "0")]).await;
        store.set_failing(true);

        let gm = Cached::new(
            ActivityExtractor::new("gm", context(store.clone()), gm_config()),
            Duration::from_secs(30),
        );
        let failed = gm.extract(&wallet()).await;
        assert_eq!(failed.total, 0);

        store.set_failing(false);
        let recovered = gm.extract(&wallet()).await;
        assert_eq!(recovered.total, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = Arc::new(InMemoryStore::new());
        store.add_transactions(vec![tx(GM, "gm", "0")]).await;
        let gm = Cached::new(
            ActivityExtractor::new("gm", context(store.clone()), gm_config()),
            Duration::from_secs(30),
        );

        gm.extract(&wallet()).await;
        let reads = store.query_count();
        gm.extract(&wallet()).await;
        assert_eq!(store.query_count(), reads);
    }

    #[tokio::test]
    async fn test_slug_dispatch_covers_builtins() {
        let store = Arc::new(InMemoryStore::new());
        let config = Config::default();
        let extractors = Extractors::new(context(store), &config);

        assert_eq!(extractors.slugs().len(), 12);
        assert!(extractors.by_slug("nft_trading").is_some());
        assert!(extractors.by_slug("velodrome").is_none());

        let json = extractors.by_slug("tydro").unwrap().extract_json(&wallet()).await;
        assert_eq!(json["current_supply_usd"], 0.0);
    }
}
