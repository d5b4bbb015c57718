/// Bridge volume in both directions
///
/// Per row, first match wins: ETH sent with the call (OUT), a bridge or OFT
/// event naming the wallet, an ERC-20 `Transfer` naming the wallet, native
/// value the call trace delivered to the wallet (IN).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::amounts::{self, direct_value_usd, operations_to_usd, within_ceiling, DirectionalBalance};
use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use crate::config::BridgeConfig;
use crate::core::constants::WETH_ADDRESS;
use crate::core::units::round2;
use crate::core::{EnrichedTransaction, TxQuery, WalletAddress};
use crate::enrichment::{BridgeDirection, ParsedEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeVolume {
    pub bridged_in_usd: f64,
    pub bridged_out_usd: f64,
    pub total_usd: f64,
    pub in_count: u64,
    pub out_count: u64,
    pub tx_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Leg {
    In(f64),
    Out(f64),
}

pub struct BridgeExtractor {
    ctx: ExtractorContext,
    config: BridgeConfig,
}

impl BridgeExtractor {
    pub fn new(ctx: ExtractorContext, config: BridgeConfig) -> Self {
        Self { ctx, config }
    }

    async fn resolve(&self, row: &EnrichedTransaction, wallet: &WalletAddress) -> Option<Leg> {
        let pricer = &self.ctx.pricer;

        if wallet.matches(&row.wallet_address) {
            if let Some(usd) = direct_value_usd(row, pricer).await {
                return Some(Leg::Out(usd));
            }
        }

        let events = amounts::events(row);
        for event in &events {
            let leg = match event {
                ParsedEvent::OftSent { token, from, amount } if wallet.matches(from) => {
                    Leg::Out(pricer.usd_value(token, *amount).await)
                }
                ParsedEvent::OftReceived { token, to, amount } if wallet.matches(to) => {
                    Leg::In(pricer.usd_value(token, *amount).await)
                }
                ParsedEvent::EthBridge { direction, from, to, amount } => {
                    match direction {
                        BridgeDirection::Initiated if wallet.matches(from) => {
                            Leg::Out(pricer.usd_value(WETH_ADDRESS, *amount).await)
                        }
                        BridgeDirection::Finalized if wallet.matches(to) => {
                            Leg::In(pricer.usd_value(WETH_ADDRESS, *amount).await)
                        }
                        _ => continue,
                    }
                }
                ParsedEvent::Erc20Bridge { direction, local_token, from, to, amount } => {
                    match direction {
                        BridgeDirection::Initiated if wallet.matches(from) => {
                            Leg::Out(pricer.usd_value(local_token, *amount).await)
                        }
                        BridgeDirection::Finalized if wallet.matches(to) => {
                            Leg::In(pricer.usd_value(local_token, *amount).await)
                        }
                        _ => continue,
                    }
                }
                _ => continue,
            };
            if leg_usd(leg) > 0.0 {
                return Some(leg);
            }
        }

        if let Some(usd) = amounts::transfer_from_usd(&events, wallet, pricer).await {
            return Some(Leg::Out(usd));
        }
        if let Some(usd) = amounts::transfer_to_usd(&events, wallet, pricer).await {
            return Some(Leg::In(usd));
        }

        operations_to_usd(row, wallet, pricer).await.map(Leg::In)
    }
}

fn leg_usd(leg: Leg) -> f64 {
    match leg {
        Leg::In(usd) | Leg::Out(usd) => usd,
    }
}

#[async_trait]
impl ProtocolExtractor for BridgeExtractor {
    type Output = BridgeVolume;

    fn slug(&self) -> &'static str {
        "bridge"
    }

    #[instrument(skip_all, fields(wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<BridgeVolume, ExtractError> {
        if self.config.contracts.is_empty() {
            return Ok(BridgeVolume::default());
        }

        let query = TxQuery::new(wallet, &self.config.contracts).with_method_ids(&self.config.method_ids);
        let rows = self.ctx.store.fetch_enriched(&query).await?;

        let ceiling = self.ctx.sanity.max_single_tx_usd;
        let mut balance = DirectionalBalance::default();
        let mut volume = BridgeVolume::default();

        for row in &rows {
            let Some(leg) = self.resolve(row, wallet).await else {
                continue;
            };
            if !within_ceiling(leg_usd(leg), ceiling) {
                debug!("Skipping bridge tx {} outside ceiling", row.tx_hash);
                continue;
            }

            match leg {
                Leg::In(usd) => {
                    balance.add_in(usd, 0.0);
                    volume.in_count += 1;
                }
                Leg::Out(usd) => {
                    balance.add_out(usd, 0.0);
                    volume.out_count += 1;
                }
            }
        }

        volume.bridged_in_usd = balance.total_in_usd;
        volume.bridged_out_usd = balance.total_out_usd;
        volume.total_usd = round2(balance.total_in_usd + balance.total_out_usd);
        volume.tx_count = volume.in_count + volume.out_count;
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::fixtures::{enriched, wallet, WALLET};
    use crate::database::InMemoryStore;
    use crate::enrichment::events::fixtures::{oft_received_log, oft_sent_log, transfer_log};
    use crate::extractors::fixtures::context;
    use crate::util::token_pricing::fixtures::USDC;
    use serde_json::json;
    use std::sync::Arc;

    const BRIDGE: &str = "0x00000000000000000000000000000000000000b1";
    const RELAYER: &str = "0x3333333333333333333333333333333333333333";

    fn extractor(store: Arc<InMemoryStore>) -> BridgeExtractor {
        BridgeExtractor::new(
            context(store),
            BridgeConfig {
                contracts: vec![BRIDGE.to_string()],
                method_ids: Vec::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_no_rows_is_zero() {
        let store = Arc::new(InMemoryStore::new());
        let volume = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(volume, BridgeVolume::default());
    }

    #[tokio::test]
    async fn test_directions_and_priorities() {
        let store = Arc::new(InMemoryStore::new());

        // 0.1 ETH sent with the call: OUT $200
        let direct = enriched(BRIDGE, "bridgeETHTo", "100000000000000000", json!([]), json!([]));
        // OFT out and in, USDC with 6 decimals
        let sent = enriched(BRIDGE, "send", "0", json!([oft_sent_log(USDC, WALLET, 50_000_000)]), json!([]));
        let received = enriched(BRIDGE, "lzReceive", "0", json!([oft_received_log(USDC, WALLET, 25_000_000)]), json!([]));
        // Relayed finalization credited through the call trace: IN $100
        let mut relayed = enriched(
            BRIDGE,
            "finalizeBridgeETH",
            "0",
            json!([]),
            json!([{ "from": BRIDGE, "to": WALLET, "value": "50000000000000000" }]),
        );
        relayed.wallet_address = RELAYER.to_string();
        relayed.related_wallets = vec![WALLET.to_string()];
        // Nothing resolvable: skipped
        let empty = enriched(BRIDGE, "claim", "0", json!([]), json!([]));

        store.add_enriched(vec![direct, sent, received, relayed, empty]).await;

        let volume = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(volume.bridged_out_usd, 250.0);
        assert_eq!(volume.bridged_in_usd, 125.0);
        assert_eq!(volume.out_count, 2);
        assert_eq!(volume.in_count, 2);
        assert_eq!(volume.tx_count, 4);
        assert_eq!(volume.total_usd, 375.0);
    }

    #[tokio::test]
    async fn test_transfer_fallback_and_ceiling() {
        let store = Arc::new(InMemoryStore::new());
        let inbound = enriched(BRIDGE, "relay", "0", json!([transfer_log(USDC, RELAYER, WALLET, 10_000_000)]), json!([]));
        // 2,000,000 USDC exceeds the per-transaction ceiling
        let huge = enriched(
            BRIDGE,
            "relay",
            "0",
            json!([transfer_log(USDC, RELAYER, WALLET, 2_000_000_000_000)]),
            json!([]),
        );
        store.add_enriched(vec![inbound, huge]).await;

        let volume = extractor(store).try_extract(&wallet()).await.unwrap();
        assert_eq!(volume.bridged_in_usd, 10.0);
        assert_eq!(volume.in_count, 1);
    }
}
