/// Lending market positions (Tydro, an Aave-style pool plus ETH gateway)
///
/// Two directional balances: supplied vs withdrawn, borrowed vs repaid.
/// Amounts come from the call value (`depositETH`, `repayETH`) of calls the
/// wallet sent, then the
/// pool event for the action, then native value the call trace returned to
/// the wallet (`withdrawETH`, `borrowETH`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::amounts::{self, direct_value_usd, operations_to_usd, usd_to_eth, within_ceiling, DirectionalBalance};
use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use crate::config::LendingConfig;
use crate::core::{EnrichedTransaction, TxQuery, WalletAddress};
use crate::enrichment::ParsedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LendingAction {
    Supply,
    Withdraw,
    Borrow,
    Repay,
}

impl LendingAction {
    pub fn from_function(name: &str) -> Option<Self> {
        match name {
            "supply" | "deposit" | "depositETH" | "supplyWithPermit" => Some(Self::Supply),
            "withdraw" | "withdrawETH" => Some(Self::Withdraw),
            "borrow" | "borrowETH" => Some(Self::Borrow),
            "repay" | "repayETH" | "repayWithATokens" | "repayWithPermit" => Some(Self::Repay),
            _ => None,
        }
    }

    fn of_event(event: &ParsedEvent, wallet: &WalletAddress) -> Option<(Self, String, alloy_primitives::U256)> {
        match event {
            ParsedEvent::Supply { reserve, user, on_behalf_of, amount }
                if wallet.matches(on_behalf_of) || wallet.matches(user) =>
            {
                Some((Self::Supply, reserve.clone(), *amount))
            }
            ParsedEvent::Withdraw { reserve, user, amount } if wallet.matches(user) => {
                Some((Self::Withdraw, reserve.clone(), *amount))
            }
            ParsedEvent::Borrow { reserve, user, on_behalf_of, amount }
                if wallet.matches(on_behalf_of) || wallet.matches(user) =>
            {
                Some((Self::Borrow, reserve.clone(), *amount))
            }
            ParsedEvent::Repay { reserve, user, amount } if wallet.matches(user) => {
                Some((Self::Repay, reserve.clone(), *amount))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LendingPosition {
    pub total_supplied_usd: f64,
    pub total_withdrawn_usd: f64,
    pub current_supply_usd: f64,
    pub current_supply_eth: f64,
    pub total_borrowed_usd: f64,
    pub total_repaid_usd: f64,
    pub current_borrow_usd: f64,
    pub current_borrow_eth: f64,
    pub supply_count: u64,
    pub withdraw_count: u64,
    pub borrow_count: u64,
    pub repay_count: u64,
    pub tx_count: u64,
}

pub struct LendingExtractor {
    ctx: ExtractorContext,
    config: LendingConfig,
}

impl LendingExtractor {
    pub fn new(ctx: ExtractorContext, config: LendingConfig) -> Self {
        Self { ctx, config }
    }

    async fn resolve(&self, row: &EnrichedTransaction, wallet: &WalletAddress) -> Option<(LendingAction, f64)> {
        let pricer = &self.ctx.pricer;
        let named = row.function_name.as_deref().and_then(LendingAction::from_function);

        if let Some(action) = named.filter(|_| wallet.matches(&row.wallet_address)) {
            if matches!(action, LendingAction::Supply | LendingAction::Repay) {
                if let Some(usd) = direct_value_usd(row, pricer).await {
                    return Some((action, usd));
                }
            }
        }

        for event in amounts::events(row) {
            let Some((action, reserve, amount)) = LendingAction::of_event(&event, wallet) else {
                continue;
            };
            if named.map_or(false, |n| n != action) {
                continue;
            }
            let usd = pricer.usd_value(&reserve, amount).await;
            if usd > 0.0 {
                return Some((action, usd));
            }
        }

        match named {
            Some(action @ (LendingAction::Withdraw | LendingAction::Borrow)) => {
                operations_to_usd(row, wallet, pricer).await.map(|usd| (action, usd))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ProtocolExtractor for LendingExtractor {
    type Output = LendingPosition;

    fn slug(&self) -> &'static str {
        "tydro"
    }

    #[instrument(skip_all, fields(wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<LendingPosition, ExtractError> {
        let contracts = self.config.contracts();
        if contracts.is_empty() {
            return Ok(LendingPosition::default());
        }

        let rows = self.ctx.store.fetch_enriched(&TxQuery::new(wallet, &contracts)).await?;
        let eth_usd = self.ctx.pricer.eth_usd().await;
        let ceiling = self.ctx.sanity.max_single_lending_tx_usd;

        let mut supply = DirectionalBalance::default();
        let mut borrow = DirectionalBalance::default();
        let mut position = LendingPosition::default();

        for row in &rows {
            let Some((action, usd)) = self.resolve(row, wallet).await else {
                continue;
            };
            if !within_ceiling(usd, ceiling) {
                debug!("Skipping lending tx {} outside ceiling", row.tx_hash);
                continue;
            }

            let eth = usd_to_eth(usd, eth_usd);
            match action {
                LendingAction::Supply => {
                    supply.add_in(usd, eth);
                    position.supply_count += 1;
                }
                LendingAction::Withdraw => {
                    supply.add_out(usd, eth);
                    position.withdraw_count += 1;
                }
                LendingAction::Borrow => {
                    borrow.add_in(usd, eth);
                    position.borrow_count += 1;
                }
                LendingAction::Repay => {
                    borrow.add_out(usd, eth);
                    position.repay_count += 1;
                }
            }
            position.tx_count += 1;
        }

        position.total_supplied_usd = supply.total_in_usd;
        position.total_withdrawn_usd = supply.total_out_usd;
        position.current_supply_usd = supply.current_usd();
        position.current_supply_eth = supply.current_eth();
        position.total_borrowed_usd = borrow.total_in_usd;
        position.total_repaid_usd = borrow.total_out_usd;
        position.current_borrow_usd = borrow.current_usd();
        position.current_borrow_eth = borrow.current_eth();
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::fixtures::{enriched, sent_by_other, wallet, OTHER, WALLET};
    use crate::database::InMemoryStore;
    use crate::enrichment::events::fixtures::{supply_log, withdraw_log};
    use crate::extractors::fixtures::context;
    use crate::util::token_pricing::fixtures::USDC;
    use serde_json::json;
    use std::sync::Arc;

    const POOL: &str = "0x00000000000000000000000000000000000000aa";
    const GATEWAY: &str = "0x00000000000000000000000000000000000000ab";

    fn extractor(store: Arc<InMemoryStore>) -> LendingExtractor {
        LendingExtractor::new(
            context(store),
            LendingConfig {
                pools: vec![POOL.to_string()],
                gateways: vec![GATEWAY.to_string()],
            },
        )
    }

    #[tokio::test]
    async fn test_supply_withdraw_borrow_repay() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                // 1 ETH through the gateway: $2000
                enriched(GATEWAY, "depositETH", "1000000000000000000", json!([]), json!([])),
                // 500 USDC supplied through the pool event
                enriched(POOL, "supply", "0", json!([supply_log(USDC, WALLET, 500_000_000)]), json!([])),
                // 300 USDC withdrawn
                enriched(POOL, "withdraw", "0", json!([withdraw_log(USDC, WALLET, 300_000_000)]), json!([])),
                // 0.25 ETH borrowed, paid out through the call trace
                enriched(
                    GATEWAY,
                    "borrowETH",
                    "0",
                    json!([]),
                    json!([{ "from": GATEWAY, "to": WALLET, "value": "250000000000000000" }]),
                ),
                // 0.05 ETH repaid with the call value
                enriched(GATEWAY, "repayETH", "50000000000000000", json!([]), json!([])),
            ])
            .await;

        let position = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(position.total_supplied_usd, 2500.0);
        assert_eq!(position.total_withdrawn_usd, 300.0);
        assert_eq!(position.current_supply_usd, 2200.0);
        assert_eq!(position.current_supply_eth, 1.1);
        assert_eq!(position.total_borrowed_usd, 500.0);
        assert_eq!(position.total_repaid_usd, 100.0);
        assert_eq!(position.current_borrow_usd, 400.0);
        assert_eq!(position.tx_count, 5);
    }

    #[tokio::test]
    async fn test_withdraw_only_clamps_to_zero() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![enriched(
                POOL,
                "withdraw",
                "0",
                json!([withdraw_log(USDC, WALLET, 300_000_000)]),
                json!([]),
            )])
            .await;

        let position = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(position.total_withdrawn_usd, 300.0);
        assert_eq!(position.current_supply_usd, 0.0);
    }

    #[tokio::test]
    async fn test_mismatched_event_is_ignored() {
        let store = Arc::new(InMemoryStore::new());
        // A borrow call whose only log is a Supply event does not resolve
        store
            .add_enriched(vec![enriched(POOL, "borrow", "0", json!([supply_log(USDC, WALLET, 1_000_000)]), json!([]))])
            .await;

        let position = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(position.tx_count, 0);
    }

    #[tokio::test]
    async fn test_rows_sent_by_another_wallet_use_only_wallet_events() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_enriched(vec![
                // Another wallet's gateway deposit and repay
                sent_by_other(enriched(GATEWAY, "depositETH", "1000000000000000000", json!([]), json!([]))),
                sent_by_other(enriched(GATEWAY, "repayETH", "50000000000000000", json!([]), json!([]))),
                // Supply event for someone else
                sent_by_other(enriched(POOL, "supply", "0", json!([supply_log(USDC, OTHER, 9_000_000)]), json!([]))),
                // Supply made on behalf of this wallet: $40
                sent_by_other(enriched(POOL, "supply", "0", json!([supply_log(USDC, WALLET, 40_000_000)]), json!([]))),
            ])
            .await;

        let position = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(position.total_supplied_usd, 40.0);
        assert_eq!(position.total_repaid_usd, 0.0);
        assert_eq!(position.repay_count, 0);
        assert_eq!(position.tx_count, 1);
    }
}
