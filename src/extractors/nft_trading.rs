/// NFT marketplace trades, weighted per venue
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use crate::config::NftTradingConfig;
use crate::core::{TxQuery, WalletAddress};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueTrades {
    pub trades: u64,
    /// Points per trade on this venue
    pub weight: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NftTradingStats {
    pub venues: BTreeMap<String, VenueTrades>,
    pub total_trades: u64,
}

impl NftTradingStats {
    /// Σ trades × weight
    pub fn weighted_sum(&self) -> u64 {
        self.venues
            .values()
            .map(|v| v.trades.saturating_mul(v.weight))
            .fold(0u64, u64::saturating_add)
    }
}

pub struct NftTradingExtractor {
    ctx: ExtractorContext,
    config: NftTradingConfig,
}

impl NftTradingExtractor {
    pub fn new(ctx: ExtractorContext, config: NftTradingConfig) -> Self {
        Self { ctx, config }
    }
}

#[async_trait]
impl ProtocolExtractor for NftTradingExtractor {
    type Output = NftTradingStats;

    fn slug(&self) -> &'static str {
        "nft_trading"
    }

    #[instrument(skip_all, fields(wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<NftTradingStats, ExtractError> {
        let mut stats = NftTradingStats::default();

        for venue in &self.config.venues {
            let trades = if venue.contracts.is_empty() {
                0
            } else {
                let query = TxQuery::new(wallet, &venue.contracts).with_functions(&self.config.functions);
                self.ctx.store.fetch_transactions(&query).await?.len() as u64
            };

            stats.total_trades += trades;
            stats.venues.insert(
                venue.name.clone(),
                VenueTrades {
                    trades,
                    weight: venue.weight,
                },
            );
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VenueConfig;
    use crate::database::memory::fixtures::{tx, wallet};
    use crate::database::InMemoryStore;
    use crate::extractors::fixtures::context;
    use std::sync::Arc;

    const PRIMARY: &str = "0x00000000000000000000000000000000000000a1";
    const SECONDARY: &str = "0x00000000000000000000000000000000000000a2";

    #[tokio::test]
    async fn test_weighted_trades_per_venue() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_transactions(vec![
                tx(PRIMARY, "fulfillBasicOrder", "0"),
                tx(PRIMARY, "fulfillBasicOrder", "0"),
                tx(SECONDARY, "buy", "0"),
            ])
            .await;

        let config = NftTradingConfig {
            venues: vec![
                VenueConfig { name: "primary".into(), contracts: vec![PRIMARY.into()], weight: 50 },
                VenueConfig { name: "secondary".into(), contracts: vec![SECONDARY.into()], weight: 25 },
                VenueConfig { name: "tertiary".into(), contracts: Vec::new(), weight: 10 },
            ],
            functions: Vec::new(),
        };

        let stats = NftTradingExtractor::new(context(store), config)
            .try_extract(&wallet())
            .await
            .unwrap();
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.venues["tertiary"].trades, 0);
        assert_eq!(stats.weighted_sum(), 125);
    }
}
