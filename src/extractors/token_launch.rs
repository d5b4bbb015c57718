/// Token-launch platform activity (InkyPump)
///
/// Creations are counted. Buys are valued from the ETH sent with the call,
/// sells from the ETH the call trace paid back to the wallet. Creations and
/// buys only count on rows the wallet sent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::amounts::{direct_value_usd, operations_to_usd, within_ceiling};
use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use crate::config::TokenLaunchConfig;
use crate::core::units::round2;
use crate::core::{TxQuery, WalletAddress};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenLaunchStats {
    pub tokens_created: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub buy_usd: f64,
    pub sell_usd: f64,
    pub total_usd: f64,
    pub tx_count: u64,
}

pub struct TokenLaunchExtractor {
    ctx: ExtractorContext,
    config: TokenLaunchConfig,
}

impl TokenLaunchExtractor {
    pub fn new(ctx: ExtractorContext, config: TokenLaunchConfig) -> Self {
        Self { ctx, config }
    }
}

#[async_trait]
impl ProtocolExtractor for TokenLaunchExtractor {
    type Output = TokenLaunchStats;

    fn slug(&self) -> &'static str {
        "inkypump"
    }

    #[instrument(skip_all, fields(wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<TokenLaunchStats, ExtractError> {
        if self.config.contracts.is_empty() {
            return Ok(TokenLaunchStats::default());
        }

        let rows = self
            .ctx
            .store
            .fetch_enriched(&TxQuery::new(wallet, &self.config.contracts))
            .await?;

        let pricer = &self.ctx.pricer;
        let ceiling = self.ctx.sanity.max_single_tx_usd;
        let mut stats = TokenLaunchStats::default();

        for row in &rows {
            let Some(function) = row.function_name.as_ref() else {
                continue;
            };
            let sender = wallet.matches(&row.wallet_address);

            if sender && self.config.create_functions.contains(function) {
                stats.tokens_created += 1;
                stats.tx_count += 1;
                // createTokenAndBuy carries an initial buy
                if let Some(usd) = direct_value_usd(row, pricer).await.filter(|u| within_ceiling(*u, ceiling)) {
                    stats.buy_usd = round2(stats.buy_usd + usd);
                }
            } else if sender && self.config.buy_functions.contains(function) {
                if let Some(usd) = direct_value_usd(row, pricer).await.filter(|u| within_ceiling(*u, ceiling)) {
                    stats.buy_usd = round2(stats.buy_usd + usd);
                    stats.buy_count += 1;
                    stats.tx_count += 1;
                }
            } else if self.config.sell_functions.contains(function) {
                if let Some(usd) = operations_to_usd(row, wallet, pricer)
                    .await
                    .filter(|u| within_ceiling(*u, ceiling))
                {
                    stats.sell_usd = round2(stats.sell_usd + usd);
                    stats.sell_count += 1;
                    stats.tx_count += 1;
                }
            }
        }

        stats.total_usd = round2(stats.buy_usd + stats.sell_usd);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::fixtures::{enriched, sent_by_other, wallet, WALLET};
    use crate::database::InMemoryStore;
    use crate::extractors::fixtures::context;
    use serde_json::json;
    use std::sync::Arc;

    const PUMP: &str = "0x00000000000000000000000000000000000000f1";

    fn extractor(store: Arc<InMemoryStore>) -> TokenLaunchExtractor {
        TokenLaunchExtractor::new(
            context(store),
            TokenLaunchConfig {
                contracts: vec![PUMP.to_string()],
                ..TokenLaunchConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_buy_sell() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                enriched(PUMP, "createToken", "0", json!([]), json!([])),
                enriched(PUMP, "buy", "10000000000000000", json!([]), json!([])),
                enriched(
                    PUMP,
                    "sell",
                    "0",
                    json!([]),
                    json!([{ "from": PUMP, "to": WALLET, "value": "5000000000000000" }]),
                ),
                // A sell that paid nothing does not count
                enriched(PUMP, "sell", "0", json!([]), json!([])),
            ])
            .await;

        let stats = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(stats.tokens_created, 1);
        assert_eq!(stats.buy_usd, 20.0);
        assert_eq!(stats.sell_usd, 10.0);
        assert_eq!(stats.sell_count, 1);
        assert_eq!(stats.total_usd, 30.0);
        assert_eq!(stats.tx_count, 3);
    }

    #[tokio::test]
    async fn test_rows_sent_by_another_wallet_earn_no_credit() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                sent_by_other(enriched(PUMP, "createTokenAndBuy", "10000000000000000", json!([]), json!([]))),
                sent_by_other(enriched(PUMP, "buy", "1000000000000000000", json!([]), json!([]))),
            ])
            .await;

        let stats = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(stats.tokens_created, 0);
        assert_eq!(stats.buy_usd, 0.0);
        assert_eq!(stats.buy_count, 0);
        assert_eq!(stats.tx_count, 0);
    }
}
