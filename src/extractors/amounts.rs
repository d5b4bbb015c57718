/// Amount resolution helpers shared by the extractors
///
/// Rows resolve their amount through a fixed priority: the call's own ETH
/// value, then a decoded event log, then the internal call trace. A row
/// with no positive amount from any source is skipped.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::core::units::{parse_amount, round2, round4, sanitize};
use crate::core::{EnrichedTransaction, WalletAddress};
use crate::enrichment::{parse_logs, parse_operations, ParsedEvent};
use crate::util::TokenPricer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSource {
    DirectValue,
    EventLog,
    Operations,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAmount {
    pub usd: f64,
    pub source: AmountSource,
}

/// Two running totals and the clamped position between them.
/// Rounding is applied at every step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionalBalance {
    pub total_in_usd: f64,
    pub total_out_usd: f64,
    pub total_in_eth: f64,
    pub total_out_eth: f64,
}

impl DirectionalBalance {
    pub fn add_in(&mut self, usd: f64, eth: f64) {
        self.total_in_usd = round2(self.total_in_usd + sanitize(usd));
        self.total_in_eth = round4(self.total_in_eth + sanitize(eth));
    }

    pub fn add_out(&mut self, usd: f64, eth: f64) {
        self.total_out_usd = round2(self.total_out_usd + sanitize(usd));
        self.total_out_eth = round4(self.total_out_eth + sanitize(eth));
    }

    /// `max(0, in - out)`
    pub fn current_usd(&self) -> f64 {
        round2((self.total_in_usd - self.total_out_usd).max(0.0))
    }

    pub fn current_eth(&self) -> f64 {
        round4((self.total_in_eth - self.total_out_eth).max(0.0))
    }
}

/// Reject single-transaction values above the ceiling
pub fn within_ceiling(usd: f64, ceiling: f64) -> bool {
    usd.is_finite() && usd > 0.0 && usd <= ceiling
}

pub fn direct_value(row: &EnrichedTransaction) -> U256 {
    parse_amount(&row.value).unwrap_or(U256::ZERO)
}

/// The call's own ETH value in USD, when it carries any
pub async fn direct_value_usd(row: &EnrichedTransaction, pricer: &TokenPricer) -> Option<f64> {
    let wei = direct_value(row);
    if wei.is_zero() {
        return None;
    }
    let usd = pricer.wei_to_usd(wei).await;
    (usd > 0.0).then_some(usd)
}

/// Sum of native value the call trace sent to the wallet
pub fn operations_to(row: &EnrichedTransaction, wallet: &WalletAddress) -> U256 {
    parse_operations(&row.operations)
        .iter()
        .filter(|op| wallet.matches(&op.to) && !op.value.is_zero())
        .fold(U256::ZERO, |acc, op| acc.saturating_add(op.value))
}

pub async fn operations_to_usd(row: &EnrichedTransaction, wallet: &WalletAddress, pricer: &TokenPricer) -> Option<f64> {
    let wei = operations_to(row, wallet);
    if wei.is_zero() {
        return None;
    }
    let usd = pricer.wei_to_usd(wei).await;
    (usd > 0.0).then_some(usd)
}

pub fn events(row: &EnrichedTransaction) -> Vec<ParsedEvent> {
    parse_logs(&row.logs)
}

/// First ERC-20 `Transfer` moving tokens out of the wallet, priced
pub async fn transfer_from_usd(events: &[ParsedEvent], wallet: &WalletAddress, pricer: &TokenPricer) -> Option<f64> {
    for event in events {
        if let ParsedEvent::Transfer { token, from, amount, .. } = event {
            if wallet.matches(from) && !amount.is_zero() {
                let usd = pricer.usd_value(token, *amount).await;
                if usd > 0.0 {
                    return Some(usd);
                }
            }
        }
    }
    None
}

/// First ERC-20 `Transfer` moving tokens into the wallet, priced
pub async fn transfer_to_usd(events: &[ParsedEvent], wallet: &WalletAddress, pricer: &TokenPricer) -> Option<f64> {
    for event in events {
        if let ParsedEvent::Transfer { token, to, amount, .. } = event {
            if wallet.matches(to) && !amount.is_zero() {
                let usd = pricer.usd_value(token, *amount).await;
                if usd > 0.0 {
                    return Some(usd);
                }
            }
        }
    }
    None
}

/// Convert a USD amount into ETH at the given price, 0 when unpriced
pub fn usd_to_eth(usd: f64, eth_usd: f64) -> f64 {
    if eth_usd > 0.0 {
        usd / eth_usd
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::fixtures::{enriched, wallet, WALLET};
    use crate::enrichment::events::fixtures::transfer_log;
    use crate::util::token_pricing::fixtures::{pricer, USDC};
    use serde_json::json;

    #[test]
    fn test_withdraw_before_supply_clamps() {
        let mut balance = DirectionalBalance::default();
        balance.add_out(50.0, 0.025);
        assert_eq!(balance.current_usd(), 0.0);
        assert_eq!(balance.current_eth(), 0.0);

        balance.add_in(30.0, 0.015);
        assert_eq!(balance.current_usd(), 0.0);

        balance.add_in(100.0, 0.05);
        assert_eq!(balance.current_usd(), 80.0);
        assert_eq!(balance.current_eth(), 0.04);
    }

    #[test]
    fn test_balance_never_negative_over_sequences() {
        let steps: [(bool, f64); 8] = [
            (false, 10.0),
            (true, 3.333),
            (false, 1.0),
            (true, 7.777),
            (true, 0.004),
            (false, 100.0),
            (true, 99.999),
            (false, 0.5),
        ];
        let mut balance = DirectionalBalance::default();
        for (is_in, usd) in steps {
            if is_in {
                balance.add_in(usd, usd / 2000.0);
            } else {
                balance.add_out(usd, usd / 2000.0);
            }
            assert!(balance.current_usd() >= 0.0);
            assert!(balance.current_eth() >= 0.0);
        }
    }

    #[test]
    fn test_rounding_happens_per_step() {
        let mut balance = DirectionalBalance::default();
        balance.add_in(0.004, 0.0);
        balance.add_in(0.004, 0.0);
        // Rounded per step: 0.00 + 0.00; a single final rounding would give 0.01
        assert_eq!(balance.total_in_usd, 0.0);
    }

    #[test]
    fn test_ceiling() {
        assert!(within_ceiling(1_000_000.0, 1_000_000.0));
        assert!(!within_ceiling(1_000_000.01, 1_000_000.0));
        assert!(!within_ceiling(0.0, 1_000_000.0));
        assert!(!within_ceiling(f64::NAN, 1_000_000.0));
    }

    #[tokio::test]
    async fn test_priority_sources() {
        let pricer = pricer();
        let other = "0x2222222222222222222222222222222222222222";

        let valued = enriched(other, "bridgeETH", "500000000000000000", json!([]), json!([]));
        assert_eq!(direct_value_usd(&valued, &pricer).await, Some(1000.0));

        let logged = enriched(other, "swap", "0", json!([transfer_log(USDC, WALLET, other, 3_000_000)]), json!([]));
        assert_eq!(direct_value_usd(&logged, &pricer).await, None);
        let parsed = events(&logged);
        assert_eq!(transfer_from_usd(&parsed, &wallet(), &pricer).await, Some(3.0));
        assert_eq!(transfer_to_usd(&parsed, &wallet(), &pricer).await, None);

        let traced = enriched(
            other,
            "finalize",
            "0",
            json!([]),
            json!([
                { "from": other, "to": WALLET, "value": "250000000000000000" },
                { "from": other, "to": other, "value": "1" }
            ]),
        );
        assert_eq!(operations_to_usd(&traced, &wallet(), &pricer).await, Some(500.0));
    }
}
