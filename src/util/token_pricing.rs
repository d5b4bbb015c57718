/// Token amount to USD resolution shared by extractors and holdings
///
/// Stablecoins price at 1, ETH-pegged tokens at the ETH price, BTC-pegged
/// tokens at the BTC price, and everything else through DexScreener.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::U256;

use super::dexscreener::DexScreenerClient;
use super::price_feed::PriceOracle;
use crate::config::TokenConfig;
use crate::core::units::{to_decimal, ETH_DECIMALS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PegKind {
    Stable,
    Eth,
    Btc,
    Market,
}

fn lowercase_set(list: &[String]) -> HashSet<String> {
    list.iter().map(|a| a.to_ascii_lowercase()).collect()
}

pub struct TokenPricer {
    oracle: Arc<PriceOracle>,
    dex: Arc<DexScreenerClient>,
    stablecoins: HashSet<String>,
    eth_pegged: HashSet<String>,
    btc_pegged: HashSet<String>,
    decimals: HashMap<String, u8>,
}

impl TokenPricer {
    pub fn new(oracle: Arc<PriceOracle>, dex: Arc<DexScreenerClient>, tokens: &TokenConfig) -> Self {
        Self {
            oracle,
            dex,
            stablecoins: lowercase_set(&tokens.stablecoins),
            eth_pegged: lowercase_set(&tokens.eth_pegged),
            btc_pegged: lowercase_set(&tokens.btc_pegged),
            decimals: tokens
                .decimals
                .iter()
                .map(|(a, d)| (a.to_ascii_lowercase(), *d))
                .collect(),
        }
    }

    pub fn oracle(&self) -> &PriceOracle {
        &self.oracle
    }

    pub fn dex(&self) -> &DexScreenerClient {
        &self.dex
    }

    pub fn peg_of(&self, address: &str) -> PegKind {
        let key = address.to_ascii_lowercase();
        if self.stablecoins.contains(&key) {
            PegKind::Stable
        } else if self.eth_pegged.contains(&key) {
            PegKind::Eth
        } else if self.btc_pegged.contains(&key) {
            PegKind::Btc
        } else {
            PegKind::Market
        }
    }

    /// Known decimals for the address, 18 otherwise
    pub fn decimals_of(&self, address: &str) -> u8 {
        self.decimals
            .get(&address.to_ascii_lowercase())
            .copied()
            .unwrap_or(ETH_DECIMALS)
    }

    pub async fn eth_usd(&self) -> f64 {
        self.oracle.eth_usd().await
    }

    pub async fn usd_price(&self, address: &str) -> f64 {
        match self.peg_of(address) {
            PegKind::Stable => 1.0,
            PegKind::Eth => self.oracle.eth_usd().await,
            PegKind::Btc => self.oracle.btc_usd().await,
            PegKind::Market => self.dex.token_price(address).await,
        }
    }

    /// Raw token amount to USD using the token's decimals
    pub async fn usd_value(&self, address: &str, raw: U256) -> f64 {
        if raw.is_zero() {
            return 0.0;
        }
        let amount = to_decimal(raw, self.decimals_of(address));
        amount * self.usd_price(address).await
    }

    pub async fn wei_to_usd(&self, wei: U256) -> f64 {
        if wei.is_zero() {
            return 0.0;
        }
        to_decimal(wei, ETH_DECIMALS) * self.oracle.eth_usd().await
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::core::constants::WETH_ADDRESS;

    #[tokio::test]
    async fn test_pegged_tokens() {
        let pricer = pricer();
        assert_eq!(pricer.usd_value(USDC, U256::from(2_500_000u64)).await, 2.5);
        assert_eq!(pricer.usd_value(WETH_ADDRESS, U256::from(500_000_000_000_000_000u128)).await, 1000.0);
        assert_eq!(pricer.usd_value(KBTC, U256::from(10_000_000u64)).await, 5000.0);
    }

    #[tokio::test]
    async fn test_unknown_token_defaults() {
        let pricer = pricer();
        assert_eq!(pricer.decimals_of("0xfeed"), 18);
        assert_eq!(pricer.peg_of("0xFEED"), PegKind::Market);
        assert_eq!(pricer.usd_value("0xfeed", U256::ZERO).await, 0.0);
    }
}
