/// DexScreener API client for on-chain token prices
///
/// Prices are the maximum `priceUsd` across every pair whose base token is
/// the requested address on the configured chain. Tokens with no pair price
/// at 0. Both outcomes are cached per address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::price_feed::PriceError;
use crate::config::{ApiConfig, CacheConfig};
use crate::core::{Sweep, TtlCache};

/// DexScreener accepts at most this many comma-separated addresses per call
const MAX_TOKENS_PER_REQUEST: usize = 30;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DexScreenerResponse {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: Option<String>,
    pub pairs: Option<Vec<TokenPair>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId", default)]
    pub dex_id: Option<String>,
    #[serde(rename = "pairAddress", default)]
    pub pair_address: Option<String>,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    pub liquidity: Option<Liquidity>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BaseToken {
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

pub struct DexScreenerClient {
    client: Client,
    base_url: String,
    chain_slug: String,
    cache: Arc<TtlCache<String, f64>>,
}

impl DexScreenerClient {
    pub fn new(base_url: &str, chain_slug: &str, timeout: Duration, cache_ttl: Duration) -> Result<Self, PriceError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_slug: chain_slug.to_string(),
            cache: Arc::new(TtlCache::new("dex_prices", cache_ttl)),
        })
    }

    pub fn from_config(apis: &ApiConfig, cache: &CacheConfig) -> Result<Self, PriceError> {
        Self::new(
            &apis.dex_api_base,
            &apis.dex_chain_slug,
            Duration::from_secs(apis.request_timeout_secs),
            Duration::from_secs(cache.dex_ttl_secs),
        )
    }

    /// Price one token, 0 when unknown or on failure
    pub async fn token_price(&self, address: &str) -> f64 {
        let prices = self.token_prices(&[address.to_string()]).await;
        prices.get(&address.to_ascii_lowercase()).copied().unwrap_or(0.0)
    }

    /// Batch-price tokens; every requested address is present in the result.
    /// A failed batch prices its tokens at 0 without caching them.
    pub async fn token_prices(&self, addresses: &[String]) -> HashMap<String, f64> {
        let mut prices = HashMap::new();
        let mut missing = Vec::new();

        for address in addresses {
            let key = address.to_ascii_lowercase();
            match self.cache.get(&key) {
                Some(price) => {
                    prices.insert(key, price);
                }
                None if !missing.contains(&key) => missing.push(key),
                None => {}
            }
        }

        for chunk in missing.chunks(MAX_TOKENS_PER_REQUEST) {
            match self.fetch_pairs(chunk).await {
                Ok(pairs) => {
                    for address in chunk {
                        let price = max_price_for(&pairs, address, &self.chain_slug);
                        self.cache.set(address.clone(), price);
                        prices.insert(address.clone(), price);
                    }
                }
                Err(e) => {
                    warn!("⚠️ DexScreener lookup failed for {} tokens: {}", chunk.len(), e);
                    for address in chunk {
                        prices.insert(address.clone(), 0.0);
                    }
                }
            }
        }

        prices
    }

    pub fn cache(&self) -> Arc<dyn Sweep> {
        self.cache.clone()
    }

    async fn fetch_pairs(&self, addresses: &[String]) -> Result<Vec<TokenPair>, PriceError> {
        let url = format!("{}/tokens/{}", self.base_url, addresses.join(","));
        debug!("🌐 Fetching DexScreener pairs: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::Status(response.status().as_u16()));
        }

        let text = response.text().await?;
        let data: DexScreenerResponse = serde_json::from_str(&text)
            .map_err(|e| PriceError::Malformed(format!("DexScreener response: {}", e)))?;

        Ok(data.pairs.unwrap_or_default())
    }
}

/// Highest `priceUsd` among pairs on `chain` whose base token is `address`
pub fn max_price_for(pairs: &[TokenPair], address: &str, chain: &str) -> f64 {
    pairs
        .iter()
        .filter(|p| p.chain_id == chain && p.base_token.address.eq_ignore_ascii_case(address))
        .filter_map(|p| p.price_usd.as_deref()?.parse::<f64>().ok())
        .filter(|price| price.is_finite() && *price > 0.0)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "0xaaaa000000000000000000000000000000000001";
    const OTHER: &str = "0xbbbb000000000000000000000000000000000002";

    fn pair(chain: &str, base: &str, price: &str) -> serde_json::Value {
        json!({
            "chainId": chain,
            "dexId": "velodrome",
            "pairAddress": "0xpair",
            "baseToken": { "address": base, "symbol": "TKN" },
            "priceUsd": price
        })
    }

    fn client_for(server: &MockServer) -> DexScreenerClient {
        DexScreenerClient::new(&server.uri(), "ink", Duration::from_secs(5), Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn test_max_price_filters_chain_and_base_token() {
        let pairs: Vec<TokenPair> = serde_json::from_value(json!([
            pair("ink", TOKEN, "1.25"),
            pair("ink", "0xAAAA000000000000000000000000000000000001", "1.40"),
            pair("base", TOKEN, "9.99"),
            pair("ink", OTHER, "7.00"),
        ]))
        .unwrap();

        assert_eq!(max_price_for(&pairs, TOKEN, "ink"), 1.40);
        assert_eq!(max_price_for(&pairs, "0xdead", "ink"), 0.0);
    }

    #[tokio::test]
    async fn test_batch_request_and_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/tokens/{},{}", TOKEN, OTHER)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schemaVersion": "1.0.0",
                "pairs": [pair("ink", TOKEN, "2.5")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let prices = client.token_prices(&[TOKEN.to_string(), OTHER.to_string()]).await;
        assert_eq!(prices[TOKEN], 2.5);
        assert_eq!(prices[OTHER], 0.0);

        // Second call is served from cache, including the unpriced token
        assert_eq!(client.token_price(OTHER).await, 0.0);
        assert_eq!(client.token_price(TOKEN).await, 2.5);
    }

    #[tokio::test]
    async fn test_null_pairs_and_errors_price_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/tokens/{}", TOKEN)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "schemaVersion": "1.0.0", "pairs": null })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/tokens/{}", OTHER)))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.token_price(TOKEN).await, 0.0);
        assert_eq!(client.token_price(OTHER).await, 0.0);
    }
}
