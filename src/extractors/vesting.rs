/// Card minting plus token locks and vesting (Marvk)
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::amounts::{self, direct_value_usd, within_ceiling};
use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use crate::config::VestingConfig;
use crate::core::units::round2;
use crate::core::{EnrichedTransaction, TxQuery, WalletAddress};
use crate::util::TokenPricer;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VestingStats {
    pub cards_minted: u64,
    pub lock_usd: f64,
    pub vest_usd: f64,
    pub lock_count: u64,
    pub vest_count: u64,
    pub tx_count: u64,
}

pub struct VestingExtractor {
    ctx: ExtractorContext,
    config: VestingConfig,
}

impl VestingExtractor {
    pub fn new(ctx: ExtractorContext, config: VestingConfig) -> Self {
        Self { ctx, config }
    }
}

/// ETH sent with the call when the wallet sent it, else tokens the wallet sent
pub(super) async fn outgoing_usd(row: &EnrichedTransaction, wallet: &WalletAddress, pricer: &TokenPricer) -> Option<f64> {
    if wallet.matches(&row.wallet_address) {
        if let Some(usd) = direct_value_usd(row, pricer).await {
            return Some(usd);
        }
    }
    amounts::transfer_from_usd(&amounts::events(row), wallet, pricer).await
}

#[async_trait]
impl ProtocolExtractor for VestingExtractor {
    type Output = VestingStats;

    fn slug(&self) -> &'static str {
        "marvk"
    }

    #[instrument(skip_all, fields(wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<VestingStats, ExtractError> {
        if self.config.contracts.is_empty() {
            return Ok(VestingStats::default());
        }

        let rows = self
            .ctx
            .store
            .fetch_enriched(&TxQuery::new(wallet, &self.config.contracts))
            .await?;

        let pricer = &self.ctx.pricer;
        let ceiling = self.ctx.sanity.max_single_tx_usd;
        let mut stats = VestingStats::default();

        for row in &rows {
            let Some(function) = row.function_name.as_ref() else {
                continue;
            };

            let sender = wallet.matches(&row.wallet_address);

            if self.config.card_functions.contains(function) {
                if sender {
                    stats.cards_minted += 1;
                    stats.tx_count += 1;
                }
                continue;
            }

            let is_lock = self.config.lock_functions.contains(function);
            if !is_lock && !self.config.vest_functions.contains(function) {
                continue;
            }

            // Related rows count only through tokens the wallet itself sent
            let usd = match outgoing_usd(row, wallet, pricer).await {
                Some(usd) => usd,
                None if sender => 0.0,
                None => continue,
            };
            if usd > 0.0 && !within_ceiling(usd, ceiling) {
                debug!("Skipping vesting tx {} outside ceiling", row.tx_hash);
                continue;
            }

            if is_lock {
                stats.lock_usd = round2(stats.lock_usd + usd);
                stats.lock_count += 1;
            } else {
                stats.vest_usd = round2(stats.vest_usd + usd);
                stats.vest_count += 1;
            }
            stats.tx_count += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::fixtures::{enriched, sent_by_other, wallet, WALLET};
    use crate::database::InMemoryStore;
    use crate::enrichment::events::fixtures::transfer_log;
    use crate::extractors::fixtures::context;
    use crate::util::token_pricing::fixtures::USDC;
    use serde_json::json;
    use std::sync::Arc;

    const MARVK: &str = "0x00000000000000000000000000000000000000b1";

    #[tokio::test]
    async fn test_cards_locks_and_vests() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                enriched(MARVK, "mintCard", "0", json!([]), json!([])),
                enriched(MARVK, "mintCard", "0", json!([]), json!([])),
                enriched(MARVK, "lock", "0", json!([transfer_log(USDC, WALLET, MARVK, 40_000_000)]), json!([])),
                // 0.01 ETH vested: $20
                enriched(MARVK, "vest", "10000000000000000", json!([]), json!([])),
                enriched(MARVK, "claim", "0", json!([]), json!([])),
            ])
            .await;

        let extractor = VestingExtractor::new(
            context(store),
            VestingConfig {
                contracts: vec![MARVK.to_string()],
                ..VestingConfig::default()
            },
        );
        let stats = extractor.try_extract(&wallet()).await.unwrap();
        assert_eq!(stats.cards_minted, 2);
        assert_eq!(stats.lock_usd, 40.0);
        assert_eq!(stats.vest_usd, 20.0);
        assert_eq!(stats.tx_count, 4);
    }

    #[tokio::test]
    async fn test_rows_sent_by_another_wallet_earn_no_credit() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                sent_by_other(enriched(MARVK, "mintCard", "0", json!([]), json!([]))),
                sent_by_other(enriched(MARVK, "vest", "10000000000000000", json!([]), json!([]))),
                sent_by_other(enriched(MARVK, "lock", "0", json!([]), json!([]))),
                // Tokens this wallet sent still count on a related row
                sent_by_other(enriched(MARVK, "lock", "0", json!([transfer_log(USDC, WALLET, MARVK, 5_000_000)]), json!([]))),
            ])
            .await;

        let extractor = VestingExtractor::new(
            context(store),
            VestingConfig {
                contracts: vec![MARVK.to_string()],
                ..VestingConfig::default()
            },
        );
        let stats = extractor.try_extract(&wallet()).await.unwrap();
        assert_eq!(stats.cards_minted, 0);
        assert_eq!(stats.vest_usd, 0.0);
        assert_eq!(stats.vest_count, 0);
        assert_eq!(stats.lock_usd, 5.0);
        assert_eq!(stats.lock_count, 1);
        assert_eq!(stats.tx_count, 1);
    }
}
