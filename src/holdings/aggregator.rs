/// Wallet holdings aggregation over the block explorer
///
/// Balance, transaction stats and both holdings lists are fetched
/// concurrently. Token rows are merged per address with `U256` sums before
/// any decimal conversion, then valued: explorer-reported USD first, pegged
/// assets through the oracle, everything else in one DexScreener batch.
///
/// Results are reused for `ttl * stale_factor`. When the explorer is down
/// for both the balance and the transaction stats, a zero-valued fallback
/// is returned and cached for one TTL.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{ApiConfig, CacheConfig};
use crate::core::units::{parse_amount, round2, sanitize, to_decimal, wei_to_eth};
use crate::core::{AssetType, Sweep, TrackedAsset, TtlCache, WalletAddress, EXPLORER_MAX_PAGES, MS_PER_DAY};
use crate::database::ReferenceData;
use crate::util::token_pricing::PegKind;
use crate::util::{ExplorerClient, ExplorerError, TokenPricer};
use crate::util::explorer::{NftHolding, TokenHolding, TxStats};

#[derive(thiserror::Error, Debug)]
pub enum HoldingsError {
    #[error("Explorer unavailable: {0}")]
    Unavailable(#[from] ExplorerError),

    #[error("Holdings for {0} are a fallback result")]
    Fallback(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationSource {
    Explorer,
    Peg,
    Dex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenValuation {
    pub address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub asset_type: AssetType,
    /// Exact merged raw balance
    pub raw_balance: String,
    pub balance: f64,
    pub usd_value: f64,
    pub source: ValuationSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftCollectionCount {
    pub address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletStats {
    pub wallet_address: String,
    pub balance_eth: f64,
    pub balance_usd: f64,
    pub total_txns: u64,
    pub nft_count: u64,
    pub age_days: u64,
    pub first_tx_date: Option<DateTime<Utc>>,
    pub last_tx_date: Option<DateTime<Utc>>,
    /// Tracked collections the wallet holds at least one item of
    pub nft_collections: Vec<NftCollectionCount>,
    pub token_holdings: Vec<TokenValuation>,
    /// Tracked non-meme tokens
    pub token_holdings_usd: f64,
    pub meme_holdings_usd: f64,
    #[serde(default)]
    pub is_fallback: bool,
}

impl WalletStats {
    pub fn fallback(wallet: &WalletAddress) -> Self {
        Self {
            wallet_address: wallet.to_string(),
            is_fallback: true,
            ..Self::default()
        }
    }

    pub fn collections_held(&self) -> u64 {
        self.nft_collections.iter().filter(|c| c.count > 0).count() as u64
    }
}

/// `ceil((now - first) / 1 day)`, 0 without a first transaction
pub fn age_days(first_tx: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    let Some(first) = first_tx else {
        return 0;
    };
    let elapsed_ms = (now - first).num_milliseconds();
    if elapsed_ms <= 0 {
        return 0;
    }
    ((elapsed_ms + MS_PER_DAY - 1) / MS_PER_DAY) as u64
}

struct MergedToken {
    raw: U256,
    api_usd: f64,
}

pub struct HoldingsAggregator {
    explorer: Arc<dyn ExplorerClient>,
    pricer: Arc<TokenPricer>,
    reference: Arc<ReferenceData>,
    page_size: u32,
    cache: Arc<TtlCache<WalletAddress, WalletStats>>,
}

impl HoldingsAggregator {
    pub fn new(
        explorer: Arc<dyn ExplorerClient>,
        pricer: Arc<TokenPricer>,
        reference: Arc<ReferenceData>,
        apis: &ApiConfig,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            explorer,
            pricer,
            reference,
            page_size: apis.explorer_page_size.max(1),
            cache: Arc::new(TtlCache::with_stale_window(
                "wallet_stats",
                Duration::from_secs(cache.stats_ttl_secs),
                cache.stats_stale_factor,
            )),
        }
    }

    pub fn cache(&self) -> Arc<dyn Sweep> {
        self.cache.clone()
    }

    /// Holdings for the wallet; never fails, see `WalletStats::is_fallback`
    #[instrument(skip_all, fields(wallet = %wallet))]
    pub async fn get_all_stats(&self, wallet: &WalletAddress) -> WalletStats {
        if let Some(hit) = self.cache.get_stale(wallet) {
            // Fallbacks only live for one TTL
            if !hit.is_fallback || self.cache.get(wallet).is_some() {
                debug!("📦 Stats cache hit for {}", wallet);
                return hit;
            }
        }

        let stats = match self.collect(wallet).await {
            Ok(stats) => {
                info!(
                    "📊 Stats for {}: {} txns, {} NFTs, {} tokens",
                    wallet,
                    stats.total_txns,
                    stats.nft_count,
                    stats.token_holdings.len()
                );
                stats
            }
            Err(e) => {
                warn!("⚠️ Holdings unavailable for {}, serving fallback: {}", wallet, e);
                WalletStats::fallback(wallet)
            }
        };

        self.cache.set(wallet.clone(), stats.clone());
        stats
    }

    /// Like `get_all_stats`, but a fallback result is an error
    pub async fn try_stats(&self, wallet: &WalletAddress) -> Result<WalletStats, HoldingsError> {
        let stats = self.get_all_stats(wallet).await;
        if stats.is_fallback {
            return Err(HoldingsError::Fallback(wallet.to_string()));
        }
        Ok(stats)
    }

    async fn collect(&self, wallet: &WalletAddress) -> Result<WalletStats, HoldingsError> {
        let (balance, tx_stats, nfts, tokens, assets) = tokio::join!(
            self.explorer.native_balance(wallet),
            self.explorer.tx_stats(wallet),
            self.nft_holdings(wallet),
            self.erc20_holdings(wallet),
            self.reference.tracked_assets(),
        );

        let (balance, tx_stats) = match (balance, tx_stats) {
            (Err(e), Err(_)) => return Err(HoldingsError::Unavailable(e)),
            (balance, tx_stats) => (
                balance.unwrap_or_else(|e| {
                    warn!("⚠️ Native balance unavailable for {}: {}", wallet, e);
                    U256::ZERO
                }),
                tx_stats.unwrap_or_else(|e| {
                    warn!("⚠️ Transaction stats unavailable for {}: {}", wallet, e);
                    TxStats::default()
                }),
            ),
        };

        let assets = match assets {
            Ok(assets) => assets,
            Err(e) => {
                warn!("⚠️ Tracked assets unavailable: {}", e);
                Arc::new(Vec::new())
            }
        };

        let eth_usd = self.pricer.eth_usd().await;
        let balance_eth = wei_to_eth(balance);

        let token_holdings = self.value_tokens(&tokens, &assets).await;
        let token_holdings_usd = round2(
            token_holdings
                .iter()
                .filter(|t| t.asset_type != AssetType::MemeCoin)
                .map(|t| t.usd_value)
                .sum(),
        );
        let meme_holdings_usd = round2(
            token_holdings
                .iter()
                .filter(|t| t.asset_type == AssetType::MemeCoin)
                .map(|t| t.usd_value)
                .sum(),
        );

        Ok(WalletStats {
            wallet_address: wallet.to_string(),
            balance_eth,
            balance_usd: round2(sanitize(balance_eth * eth_usd)),
            total_txns: tx_stats.total_txns,
            nft_count: nfts.iter().map(|n| n.balance.unwrap_or(1)).sum(),
            age_days: age_days(tx_stats.first_tx_at, Utc::now()),
            first_tx_date: tx_stats.first_tx_at,
            last_tx_date: tx_stats.last_tx_at,
            nft_collections: count_collections(&nfts, &assets),
            token_holdings,
            token_holdings_usd,
            meme_holdings_usd,
            is_fallback: false,
        })
    }

    async fn nft_holdings(&self, wallet: &WalletAddress) -> Vec<NftHolding> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..EXPLORER_MAX_PAGES {
            match self
                .explorer
                .nft_holdings_page(wallet, cursor.as_deref(), self.page_size)
                .await
            {
                Ok(page) => {
                    items.extend(page.items);
                    match next_cursor(page.next_token, cursor.as_deref()) {
                        Some(next) => cursor = Some(next),
                        None => return items,
                    }
                }
                Err(e) => {
                    warn!("⚠️ NFT holdings page failed for {}: {}", wallet, e);
                    return items;
                }
            }
        }

        warn!("⚠️ NFT holdings for {} stopped at {} pages", wallet, EXPLORER_MAX_PAGES);
        items
    }

    async fn erc20_holdings(&self, wallet: &WalletAddress) -> Vec<TokenHolding> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..EXPLORER_MAX_PAGES {
            match self
                .explorer
                .erc20_holdings_page(wallet, cursor.as_deref(), self.page_size)
                .await
            {
                Ok(page) => {
                    items.extend(page.items);
                    match next_cursor(page.next_token, cursor.as_deref()) {
                        Some(next) => cursor = Some(next),
                        None => return items,
                    }
                }
                Err(e) => {
                    warn!("⚠️ Token holdings page failed for {}: {}", wallet, e);
                    return items;
                }
            }
        }

        warn!("⚠️ Token holdings for {} stopped at {} pages", wallet, EXPLORER_MAX_PAGES);
        items
    }

    async fn value_tokens(&self, holdings: &[TokenHolding], assets: &[TrackedAsset]) -> Vec<TokenValuation> {
        let tracked: HashMap<String, &TrackedAsset> = assets
            .iter()
            .filter(|a| matches!(a.asset_type, AssetType::Erc20Token | AssetType::MemeCoin))
            .map(|a| (a.address.to_ascii_lowercase(), a))
            .collect();

        let mut merged: BTreeMap<String, MergedToken> = BTreeMap::new();
        for holding in holdings {
            let key = holding.token_address.to_ascii_lowercase();
            if !tracked.contains_key(&key) {
                continue;
            }
            let Some(raw) = parse_amount(&holding.balance) else {
                debug!("Unparseable balance {} for {}", holding.balance, key);
                continue;
            };
            let entry = merged.entry(key).or_insert(MergedToken {
                raw: U256::ZERO,
                api_usd: 0.0,
            });
            entry.raw = entry.raw.saturating_add(raw);
            entry.api_usd += sanitize(holding.value_usd.unwrap_or(0.0));
        }

        let mut valued: Vec<(String, f64, Option<(f64, ValuationSource)>)> = Vec::new();
        let mut needs_dex = Vec::new();

        for (address, held) in &merged {
            let asset = tracked[address];
            let amount = to_decimal(held.raw, asset.decimals);

            let priced = if held.api_usd > 0.0 {
                Some((held.api_usd, ValuationSource::Explorer))
            } else if self.pricer.peg_of(address) != PegKind::Market {
                let price = self.pricer.usd_price(address).await;
                Some((amount * price, ValuationSource::Peg))
            } else {
                needs_dex.push(address.clone());
                None
            };
            valued.push((address.clone(), amount, priced));
        }

        let dex_prices = if needs_dex.is_empty() {
            HashMap::new()
        } else {
            self.pricer.dex().token_prices(&needs_dex).await
        };

        valued
            .into_iter()
            .map(|(address, amount, priced)| {
                let asset = tracked[&address];
                let (usd, source) = priced.unwrap_or_else(|| {
                    let price = dex_prices.get(&address).copied().unwrap_or(0.0);
                    (amount * price, ValuationSource::Dex)
                });
                let raw_balance = merged
                    .get(&address)
                    .map(|m| m.raw.to_string())
                    .unwrap_or_default();

                TokenValuation {
                    symbol: asset.symbol.clone(),
                    name: asset.name.clone(),
                    asset_type: asset.asset_type,
                    raw_balance,
                    balance: amount,
                    usd_value: round2(sanitize(usd)),
                    source,
                    address,
                }
            })
            .collect()
    }
}

/// Continue only on a fresh, non-empty cursor
fn next_cursor(next: Option<String>, current: Option<&str>) -> Option<String> {
    next.filter(|n| !n.is_empty() && Some(n.as_str()) != current)
}

fn count_collections(nfts: &[NftHolding], assets: &[TrackedAsset]) -> Vec<NftCollectionCount> {
    assets
        .iter()
        .filter(|a| a.asset_type == AssetType::NftCollection)
        .filter_map(|collection| {
            let count: u64 = nfts
                .iter()
                .filter(|n| n.contract_address.eq_ignore_ascii_case(&collection.address))
                .map(|n| n.balance.unwrap_or(1))
                .sum();
            (count > 0).then(|| NftCollectionCount {
                address: collection.address.to_ascii_lowercase(),
                symbol: collection.symbol.clone(),
                name: collection.name.clone(),
                count,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::util::explorer::Page;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Explorer double serving fixed pages; cursors are `p1`, `p2`, ...
    #[derive(Default)]
    pub struct FakeExplorer {
        pub balance_wei: U256,
        pub stats: TxStats,
        pub nft_pages: Vec<Vec<NftHolding>>,
        pub token_pages: Vec<Vec<TokenHolding>>,
        pub failing: AtomicBool,
        pub calls: AtomicUsize,
        pub nft_page_calls: AtomicUsize,
    }

    impl FakeExplorer {
        fn begin(&self) -> Result<(), ExplorerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ExplorerError::Status(503));
            }
            Ok(())
        }

        fn page<T: Clone>(pages: &[Vec<T>], cursor: Option<&str>) -> Page<T> {
            let index = cursor
                .and_then(|c| c.strip_prefix('p'))
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            Page {
                items: pages.get(index).cloned().unwrap_or_default(),
                next_token: (index + 1 < pages.len()).then(|| format!("p{}", index + 1)),
            }
        }
    }

    #[async_trait]
    impl ExplorerClient for FakeExplorer {
        async fn native_balance(&self, _wallet: &WalletAddress) -> Result<U256, ExplorerError> {
            self.begin()?;
            Ok(self.balance_wei)
        }

        async fn tx_stats(&self, _wallet: &WalletAddress) -> Result<TxStats, ExplorerError> {
            self.begin()?;
            Ok(self.stats.clone())
        }

        async fn nft_holdings_page(
            &self,
            _wallet: &WalletAddress,
            cursor: Option<&str>,
            _limit: u32,
        ) -> Result<Page<NftHolding>, ExplorerError> {
            self.begin()?;
            self.nft_page_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::page(&self.nft_pages, cursor))
        }

        async fn erc20_holdings_page(
            &self,
            _wallet: &WalletAddress,
            cursor: Option<&str>,
            _limit: u32,
        ) -> Result<Page<TokenHolding>, ExplorerError> {
            self.begin()?;
            Ok(Self::page(&self.token_pages, cursor))
        }
    }

    pub fn token(address: &str, balance: &str, value_usd: Option<f64>) -> TokenHolding {
        TokenHolding {
            token_address: address.to_string(),
            symbol: None,
            name: None,
            decimals: None,
            balance: balance.to_string(),
            value_usd,
        }
    }

    pub fn nft(contract: &str, balance: Option<u64>) -> NftHolding {
        NftHolding {
            contract_address: contract.to_string(),
            token_id: None,
            balance,
        }
    }

    pub fn asset(asset_type: AssetType, address: &str, decimals: u8) -> TrackedAsset {
        TrackedAsset {
            asset_type,
            address: address.to_string(),
            symbol: "TKN".to_string(),
            name: None,
            decimals,
            token_type: None,
        }
    }

    pub fn aggregator_with(explorer: Arc<FakeExplorer>, store: Arc<InMemoryStore>, pricer: TokenPricer) -> HoldingsAggregator {
        HoldingsAggregator::new(
            explorer,
            Arc::new(pricer),
            Arc::new(ReferenceData::new(store, Duration::from_secs(300))),
            &ApiConfig::default(),
            &CacheConfig::default(),
        )
    }

    pub fn aggregator(explorer: Arc<FakeExplorer>, store: Arc<InMemoryStore>) -> HoldingsAggregator {
        aggregator_with(explorer, store, crate::util::token_pricing::fixtures::pricer())
    }
}
