/// DEX swap volume
///
/// A router row qualifies when its function is a known swap entry point or
/// its logs carry a pool `Swap` event. Its USD amount is the first of: ETH
/// the wallet sent with the call, tokens the wallet sent, tokens the wallet received,
/// native value the call trace paid the wallet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::amounts::{self, direct_value_usd, operations_to_usd, within_ceiling};
use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use crate::config::SwapConfig;
use crate::core::units::round2;
use crate::core::{EnrichedTransaction, TxQuery, WalletAddress};
use crate::enrichment::ParsedEvent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwapVolume {
    pub total_usd: f64,
    pub swap_count: u64,
}

pub struct SwapExtractor {
    ctx: ExtractorContext,
    config: SwapConfig,
}

impl SwapExtractor {
    pub fn new(ctx: ExtractorContext, config: SwapConfig) -> Self {
        Self { ctx, config }
    }

    fn is_swap_call(&self, row: &EnrichedTransaction, events: &[ParsedEvent]) -> bool {
        let named = row
            .function_name
            .as_ref()
            .map_or(false, |f| self.config.functions.contains(f));
        named || events.iter().any(|e| matches!(e, ParsedEvent::Swap { .. }))
    }

    async fn resolve(&self, row: &EnrichedTransaction, wallet: &WalletAddress) -> Option<f64> {
        let pricer = &self.ctx.pricer;
        let events = amounts::events(row);
        if !self.is_swap_call(row, &events) {
            return None;
        }

        if wallet.matches(&row.wallet_address) {
            if let Some(usd) = direct_value_usd(row, pricer).await {
                return Some(usd);
            }
        }
        if let Some(usd) = amounts::transfer_from_usd(&events, wallet, pricer).await {
            return Some(usd);
        }
        if let Some(usd) = amounts::transfer_to_usd(&events, wallet, pricer).await {
            return Some(usd);
        }
        operations_to_usd(row, wallet, pricer).await
    }
}

#[async_trait]
impl ProtocolExtractor for SwapExtractor {
    type Output = SwapVolume;

    fn slug(&self) -> &'static str {
        "swap"
    }

    #[instrument(skip_all, fields(wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<SwapVolume, ExtractError> {
        if self.config.routers.is_empty() {
            return Ok(SwapVolume::default());
        }

        let rows = self
            .ctx
            .store
            .fetch_enriched(&TxQuery::new(wallet, &self.config.routers))
            .await?;

        let ceiling = self.ctx.sanity.max_single_tx_usd;
        let mut volume = SwapVolume::default();

        for row in &rows {
            let Some(usd) = self.resolve(row, wallet).await else {
                continue;
            };
            if !within_ceiling(usd, ceiling) {
                debug!("Skipping swap tx {} outside ceiling", row.tx_hash);
                continue;
            }
            volume.total_usd = round2(volume.total_usd + usd);
            volume.swap_count += 1;
        }

        Ok(volume)
    }
}
