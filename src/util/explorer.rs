/// Block explorer client (Routescan v2 with its Etherscan-compatible module)
///
/// Holdings endpoints are cursor-paginated: each page carries
/// `link.nextToken` until the last page.

use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::core::units::parse_amount;
use crate::core::WalletAddress;

#[derive(thiserror::Error, Debug)]
pub enum ExplorerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explorer returned status {0}")]
    Status(u16),

    #[error("Malformed explorer response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxStats {
    pub total_txns: u64,
    pub first_tx_at: Option<DateTime<Utc>>,
    pub last_tx_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftHolding {
    pub contract_address: String,
    pub token_id: Option<String>,
    /// ERC-1155 quantity; ERC-721 rows omit it
    pub balance: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub token_address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    /// Raw integer balance as a decimal string
    pub balance: String,
    pub value_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ExplorerClient: Send + Sync {
    async fn native_balance(&self, wallet: &WalletAddress) -> Result<U256, ExplorerError>;

    async fn tx_stats(&self, wallet: &WalletAddress) -> Result<TxStats, ExplorerError>;

    async fn nft_holdings_page(
        &self,
        wallet: &WalletAddress,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<NftHolding>, ExplorerError>;

    async fn erc20_holdings_page(
        &self,
        wallet: &WalletAddress,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<TokenHolding>, ExplorerError>;
}

#[derive(Debug, Deserialize)]
struct EtherscanReply {
    status: String,
    result: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct PageLink {
    #[serde(rename = "nextToken")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListReply<T> {
    items: Vec<T>,
    #[serde(default)]
    link: Option<PageLink>,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawNft {
    #[serde(rename = "tokenAddress")]
    token_address: String,
    #[serde(rename = "tokenId", default)]
    token_id: Option<String>,
    #[serde(rename = "tokenQuantity", default)]
    token_quantity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    #[serde(rename = "tokenAddress")]
    token_address: String,
    #[serde(rename = "tokenQuantity")]
    token_quantity: String,
    #[serde(rename = "tokenValueInUsd", default)]
    token_value_in_usd: Option<serde_json::Value>,
    #[serde(default)]
    token: Option<RawTokenMeta>,
}

#[derive(Debug, Deserialize)]
struct RawTokenMeta {
    symbol: Option<String>,
    name: Option<String>,
    decimals: Option<u8>,
}

pub struct RoutescanClient {
    client: Client,
    base_url: String,
    chain_id: u64,
    api_key: Option<String>,
}

impl RoutescanClient {
    pub fn new(base_url: &str, chain_id: u64, api_key: Option<String>, timeout: Duration) -> Result<Self, ExplorerError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
            api_key,
        })
    }

    pub fn from_config(apis: &ApiConfig) -> Result<Self, ExplorerError> {
        Self::new(
            &apis.explorer_api_base,
            apis.chain_id,
            apis.explorer_api_key.clone(),
            Duration::from_secs(apis.request_timeout_secs),
        )
    }

    fn address_url(&self, wallet: &WalletAddress, resource: &str) -> String {
        format!("{}/{}/address/{}/{}", self.base_url, self.chain_id, wallet, resource)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExplorerError> {
        let mut request = self.client.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ExplorerError::Status(response.status().as_u16()));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ExplorerError::Malformed(e.to_string()))
    }

    async fn edge_transaction(&self, wallet: &WalletAddress, sort: &str) -> Result<ListReply<RawTx>, ExplorerError> {
        let url = self.address_url(wallet, "transactions");
        self.get_json(
            &url,
            &[
                ("sort", sort.to_string()),
                ("limit", "1".to_string()),
                ("count", "true".to_string()),
            ],
        )
        .await
    }
}

fn cursor_query(cursor: Option<&str>, limit: u32) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", limit.to_string())];
    if let Some(next) = cursor {
        query.push(("next", next.to_string()));
    }
    query
}

fn usd_of(value: Option<serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl ExplorerClient for RoutescanClient {
    async fn native_balance(&self, wallet: &WalletAddress) -> Result<U256, ExplorerError> {
        let url = format!("{}/{}/etherscan/api", self.base_url, self.chain_id);
        let reply: EtherscanReply = self
            .get_json(
                &url,
                &[
                    ("module", "account".to_string()),
                    ("action", "balance".to_string()),
                    ("address", wallet.to_string()),
                    ("tag", "latest".to_string()),
                ],
            )
            .await?;

        if reply.status != "1" {
            return Err(ExplorerError::Malformed(format!("balance status {}", reply.status)));
        }

        reply
            .result
            .as_str()
            .and_then(parse_amount)
            .ok_or_else(|| ExplorerError::Malformed(format!("balance result {}", reply.result)))
    }

    async fn tx_stats(&self, wallet: &WalletAddress) -> Result<TxStats, ExplorerError> {
        let (first, last) = tokio::join!(
            self.edge_transaction(wallet, "asc"),
            self.edge_transaction(wallet, "desc"),
        );
        let first = first?;
        let last = last?;

        let total_txns = match first.count.or(last.count) {
            Some(count) => count,
            None => {
                warn!("⚠️ Explorer sent no transaction count for {}, using page length", wallet);
                first.items.len() as u64
            }
        };

        Ok(TxStats {
            total_txns,
            first_tx_at: first.items.first().map(|t| t.timestamp),
            last_tx_at: last.items.first().map(|t| t.timestamp),
        })
    }

    async fn nft_holdings_page(
        &self,
        wallet: &WalletAddress,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<NftHolding>, ExplorerError> {
        let url = self.address_url(wallet, "erc721-holdings");
        let reply: ListReply<RawNft> = self.get_json(&url, &cursor_query(cursor, limit)).await?;
        debug!("🖼️ NFT page with {} items", reply.items.len());

        Ok(Page {
            items: reply
                .items
                .into_iter()
                .map(|raw| NftHolding {
                    contract_address: raw.token_address.to_ascii_lowercase(),
                    token_id: raw.token_id,
                    balance: raw.token_quantity.and_then(|q| q.parse().ok()),
                })
                .collect(),
            next_token: reply.link.and_then(|l| l.next_token).filter(|t| !t.is_empty()),
        })
    }

    async fn erc20_holdings_page(
        &self,
        wallet: &WalletAddress,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<TokenHolding>, ExplorerError> {
        let url = self.address_url(wallet, "erc20-holdings");
        let reply: ListReply<RawToken> = self.get_json(&url, &cursor_query(cursor, limit)).await?;
        debug!("🪙 Token page with {} items", reply.items.len());

        Ok(Page {
            items: reply
                .items
                .into_iter()
                .map(|raw| {
                    let meta = raw.token.unwrap_or(RawTokenMeta {
                        symbol: None,
                        name: None,
                        decimals: None,
                    });
                    TokenHolding {
                        token_address: raw.token_address.to_ascii_lowercase(),
                        symbol: meta.symbol,
                        name: meta.name,
                        decimals: meta.decimals,
                        balance: raw.token_quantity,
                        value_usd: usd_of(raw.token_value_in_usd),
                    }
                })
                .collect(),
            next_token: reply.link.and_then(|l| l.next_token).filter(|t| !t.is_empty()),
        })
    }
}
