/// Perp / collateral-deposit platforms
///
/// Account-creation calls are counted, deposit calls are counted and valued.
/// Rows another wallet sent count only through tokens this wallet sent.
/// Two platforms share this extractor under different slugs.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::vesting::outgoing_usd;
use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use super::amounts::within_ceiling;
use crate::config::DepositPlatformConfig;
use crate::core::units::round2;
use crate::core::{TxQuery, WalletAddress};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepositStats {
    /// Subaccounts or linked signers created
    pub accounts: u64,
    /// Number of deposit calls
    pub deposits: u64,
    pub volume_usd: f64,
    pub tx_count: u64,
}

pub struct DepositExtractor {
    slug: &'static str,
    ctx: ExtractorContext,
    config: DepositPlatformConfig,
}

impl DepositExtractor {
    pub fn new(slug: &'static str, ctx: ExtractorContext, config: DepositPlatformConfig) -> Self {
        Self { slug, ctx, config }
    }
}

#[async_trait]
impl ProtocolExtractor for DepositExtractor {
    type Output = DepositStats;

    fn slug(&self) -> &'static str {
        self.slug
    }

    #[instrument(skip_all, fields(slug = self.slug, wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<DepositStats, ExtractError> {
        if self.config.contracts.is_empty() {
            return Ok(DepositStats::default());
        }

        let rows = self
            .ctx
            .store
            .fetch_enriched(&TxQuery::new(wallet, &self.config.contracts))
            .await?;

        let pricer = &self.ctx.pricer;
        let ceiling = self.ctx.sanity.max_single_tx_usd;
        let mut stats = DepositStats::default();

        for row in &rows {
            let Some(function) = row.function_name.as_ref() else {
                continue;
            };

            let sender = wallet.matches(&row.wallet_address);

            if self.config.account_functions.contains(function) {
                if sender {
                    stats.accounts += 1;
                    stats.tx_count += 1;
                }
            } else if self.config.deposit_functions.contains(function) {
                let usd = outgoing_usd(row, wallet, pricer).await;
                if usd.is_none() && !sender {
                    continue;
                }
                stats.deposits += 1;
                stats.tx_count += 1;
                match usd {
                    Some(usd) if within_ceiling(usd, ceiling) => {
                        stats.volume_usd = round2(stats.volume_usd + usd);
                    }
                    Some(_) => debug!("Deposit {} outside ceiling, counted without volume", row.tx_hash),
                    None => {}
                }
            }
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

    const ENDPOINT: &str = "0x00000000000000000000000000000000000000c1";

    #[tokio::test]
    async fn test_accounts_deposits_volume() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                enriched(ENDPOINT, "createSubaccount", "0", json!([]), json!([])),
                enriched(ENDPOINT, "depositCollateral", "0", json!([transfer_log(USDC, WALLET, ENDPOINT, 250_000_000)]), json!([])),
                enriched(ENDPOINT, "deposit", "0", json!([transfer_log(USDC, WALLET, ENDPOINT, 50_000_000)]), json!([])),
                // Oversized deposits still count, without volume
                enriched(ENDPOINT, "deposit", "0", json!([transfer_log(USDC, WALLET, ENDPOINT, 5_000_000_000_000)]), json!([])),
                enriched(ENDPOINT, "withdraw", "0", json!([]), json!([])),
            ])
            .await;

        let extractor = DepositExtractor::new(
            "nado",
            context(store),
            DepositPlatformConfig {
                contracts: vec![ENDPOINT.to_string()],
                ..DepositPlatformConfig::default()
            },
        );
        let stats = extractor.try_extract(&wallet()).await.unwrap();
        assert_eq!(extractor.slug(), "nado");
        assert_eq!(stats.accounts, 1);
        assert_eq!(stats.deposits, 3);
        assert_eq!(stats.volume_usd, 300.0);
        assert_eq!(stats.tx_count, 4);
    }

    #[tokio::test]
    async fn test_rows_sent_by_another_wallet_earn_no_credit() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                sent_by_other(enriched(ENDPOINT, "createSubaccount", "0", json!([]), json!([]))),
                sent_by_other(enriched(ENDPOINT, "deposit", "1000000000000000000", json!([]), json!([]))),
                sent_by_other(enriched(ENDPOINT, "depositCollateral", "0", json!([]), json!([]))),
            ])
            .await;

        let extractor = DepositExtractor::new(
            "perp_deposits",
            context(store),
            DepositPlatformConfig {
                contracts: vec![ENDPOINT.to_string()],
                ..DepositPlatformConfig::default()
            },
        );
        let stats = extractor.try_extract(&wallet()).await.unwrap();
        assert_eq!(stats, DepositStats::default());
    }
}
