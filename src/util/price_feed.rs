/// USD price oracle for ETH, BTC and CoinGecko-listed assets
///
/// Lookup order on every call: in-process cache (5 min), persisted hourly
/// price row (1 h, when a history store is attached), the price API, the
/// last price ever seen for the asset, and finally the configured fallback.
/// `get_price` never fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, PriceConfig};
use crate::core::constants::{COINGECKO_BTC_ID, COINGECKO_ETH_ID};
use crate::core::{Sweep, TtlCache};
use crate::database::PriceHistoryStore;

#[derive(thiserror::Error, Debug)]
pub enum PriceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Price API returned status {0}")]
    Status(u16),

    #[error("Malformed price response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PriceAsset {
    Eth,
    Btc,
    Coingecko(String),
}

impl PriceAsset {
    pub fn coingecko_id(&self) -> &str {
        match self {
            PriceAsset::Eth => COINGECKO_ETH_ID,
            PriceAsset::Btc => COINGECKO_BTC_ID,
            PriceAsset::Coingecko(id) => id,
        }
    }
}

/// Upstream quote source; one HTTP call per lookup
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_usd(&self, coingecko_id: &str) -> Result<f64, PriceError>;
}

pub struct CoingeckoSource {
    client: Client,
    base_url: String,
}

impl CoingeckoSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PriceError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(apis: &ApiConfig) -> Result<Self, PriceError> {
        Self::new(&apis.price_api_base, Duration::from_secs(apis.request_timeout_secs))
    }
}

#[async_trait]
impl PriceSource for CoingeckoSource {
    async fn fetch_usd(&self, coingecko_id: &str) -> Result<f64, PriceError> {
        let url = format!("{}/simple/price", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("ids", coingecko_id), ("vs_currencies", "usd")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PriceError::Status(response.status().as_u16()));
        }

        // { "ethereum": { "usd": 3521.4 } }
        let data: Value = response.json().await?;
        match data[coingecko_id]["usd"].as_f64() {
            Some(price) if price.is_finite() && price > 0.0 => Ok(price),
            _ => Err(PriceError::Malformed(format!("no usd price for {}", coingecko_id))),
        }
    }
}

pub struct PriceOracle {
    source: Arc<dyn PriceSource>,
    cache: Arc<TtlCache<String, f64>>,
    last_known: DashMap<String, f64>,
    history: Option<Arc<dyn PriceHistoryStore>>,
    history_ttl: Duration,
    eth_fallback: f64,
    btc_fallback: f64,
}

impl PriceOracle {
    pub fn new(source: Arc<dyn PriceSource>, config: &PriceConfig) -> Self {
        Self {
            source,
            cache: Arc::new(TtlCache::new(
                "prices",
                Duration::from_secs(config.cache_ttl_secs),
            )),
            last_known: DashMap::new(),
            history: None,
            history_ttl: Duration::from_secs(config.history_ttl_secs),
            eth_fallback: config.eth_fallback_usd,
            btc_fallback: config.btc_fallback_usd,
        }
    }

    /// Back cache misses with the hourly price table
    pub fn with_history(mut self, history: Arc<dyn PriceHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub async fn get_price(&self, asset: &PriceAsset) -> f64 {
        let id = asset.coingecko_id().to_string();

        if let Some(price) = self.cache.get(&id) {
            return price;
        }

        if let Some(price) = self.stored_price(&id).await {
            self.remember(&id, price);
            return price;
        }

        match self.source.fetch_usd(&id).await {
            Ok(price) => {
                debug!("💲 {} = ${:.2}", id, price);
                self.remember(&id, price);
                self.persist(&id, price).await;
                price
            }
            Err(e) => {
                let fallback = self
                    .last_known
                    .get(&id)
                    .map(|p| *p)
                    .unwrap_or_else(|| self.fallback_for(asset));
                warn!("⚠️ Price lookup for {} failed ({}), using ${:.2}", id, e, fallback);
                fallback
            }
        }
    }

    pub async fn eth_usd(&self) -> f64 {
        self.get_price(&PriceAsset::Eth).await
    }

    pub async fn btc_usd(&self) -> f64 {
        self.get_price(&PriceAsset::Btc).await
    }

    pub fn cache(&self) -> Arc<dyn Sweep> {
        self.cache.clone()
    }

    fn fallback_for(&self, asset: &PriceAsset) -> f64 {
        match asset {
            PriceAsset::Eth => self.eth_fallback,
            PriceAsset::Btc => self.btc_fallback,
            PriceAsset::Coingecko(_) => 0.0,
        }
    }

    fn remember(&self, id: &str, price: f64) {
        self.cache.set(id.to_string(), price);
        self.last_known.insert(id.to_string(), price);
    }

    async fn stored_price(&self, id: &str) -> Option<f64> {
        let history = self.history.as_ref()?;
        let window = chrono::Duration::from_std(self.history_ttl).ok()?;

        match history.latest_price(id, Utc::now() - window).await {
            Ok(price) => price,
            Err(e) => {
                warn!("⚠️ Price history read failed for {}: {}", id, e);
                None
            }
        }
    }

    async fn persist(&self, id: &str, price: f64) {
        let Some(history) = self.history.as_ref() else {
            return;
        };
        let Some(hour) = hour_bucket(Utc::now()) else {
            return;
        };

        if let Err(e) = history.upsert_price(id, hour, price).await {
            warn!("⚠️ Price history write failed for {}: {}", id, e);
        } else {
            info!("📈 Stored {} price for {}", id, hour);
        }
    }
}

/// Truncate to the top of the hour
pub fn hour_bucket(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.with_minute(0)?.with_second(0)?.with_nanosecond(0)
}
