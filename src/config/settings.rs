/// Service configuration structures
///
/// Every section carries defaults so an empty TOML file is a valid config.
/// Contract addresses for each integration come from the file; an
/// integration with no configured contracts scores zero without querying.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub apis: ApiConfig,
    pub prices: PriceConfig,
    pub cache: CacheConfig,
    pub sanity: SanityConfig,
    pub tokens: TokenConfig,
    pub protocols: ProtocolConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub log_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL; the in-memory store is used when absent
    pub url: Option<String>,
    pub max_connections: u32,
    /// Persist computed scores and prices alongside the in-memory caches
    pub persist_scores: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 8,
            persist_scores: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub price_api_base: String,
    pub dex_api_base: String,
    pub explorer_api_base: String,
    pub explorer_api_key: Option<String>,
    pub chain_id: u64,
    pub dex_chain_slug: String,
    pub request_timeout_secs: u64,
    pub explorer_page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            price_api_base: PRICE_API_BASE.to_string(),
            dex_api_base: DEX_API_BASE.to_string(),
            explorer_api_base: EXPLORER_API_BASE.to_string(),
            explorer_api_key: None,
            chain_id: CHAIN_ID,
            dex_chain_slug: DEX_CHAIN_SLUG.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            explorer_page_size: EXPLORER_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Canonical fallback used by every call site
    pub eth_fallback_usd: f64,
    pub btc_fallback_usd: f64,
    pub cache_ttl_secs: u64,
    pub history_ttl_secs: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            eth_fallback_usd: DEFAULT_ETH_FALLBACK_USD,
            btc_fallback_usd: DEFAULT_BTC_FALLBACK_USD,
            cache_ttl_secs: PRICE_CACHE_TTL_SECS,
            history_ttl_secs: PRICE_HISTORY_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub score_ttl_secs: u64,
    pub stats_ttl_secs: u64,
    pub stats_stale_factor: u32,
    pub analytics_ttl_secs: u64,
    pub ranks_ttl_secs: u64,
    pub reference_ttl_secs: u64,
    pub dex_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            score_ttl_secs: SCORE_CACHE_TTL_SECS,
            stats_ttl_secs: STATS_CACHE_TTL_SECS,
            stats_stale_factor: STATS_STALE_FACTOR,
            analytics_ttl_secs: ANALYTICS_CACHE_TTL_SECS,
            ranks_ttl_secs: RANKS_CACHE_TTL_SECS,
            reference_ttl_secs: REFERENCE_CACHE_TTL_SECS,
            dex_ttl_secs: DEX_CACHE_TTL_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanityConfig {
    pub max_single_tx_usd: f64,
    pub max_single_lending_tx_usd: f64,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            max_single_tx_usd: MAX_SINGLE_TX_USD,
            max_single_lending_tx_usd: MAX_SINGLE_LENDING_TX_USD,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    pub stablecoins: Vec<String>,
    pub eth_pegged: Vec<String>,
    pub btc_pegged: Vec<String>,
    /// Known decimals by address; unknown tokens default to 18
    pub decimals: HashMap<String, u8>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            stablecoins: Vec::new(),
            eth_pegged: vec![WETH_ADDRESS.to_string()],
            btc_pegged: Vec::new(),
            decimals: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub bridge: BridgeConfig,
    pub swap: SwapConfig,
    pub tydro: LendingConfig,
    pub gm: ActivityConfig,
    pub inkypump: TokenLaunchConfig,
    pub shellies: ActivityConfig,
    pub zns: ActivityConfig,
    pub nft2me: ActivityConfig,
    pub nft_trading: NftTradingConfig,
    pub marvk: VestingConfig,
    pub perp_deposits: DepositPlatformConfig,
    pub nado: DepositPlatformConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            swap: SwapConfig::default(),
            tydro: LendingConfig::default(),
            gm: ActivityConfig::default(),
            inkypump: TokenLaunchConfig::default(),
            shellies: ActivityConfig::default(),
            zns: ActivityConfig::default(),
            nft2me: ActivityConfig::default(),
            nft_trading: NftTradingConfig::default(),
            marvk: VestingConfig::default(),
            perp_deposits: DepositPlatformConfig::default(),
            nado: DepositPlatformConfig::default(),
        }
        .with_default_categories()
    }
}

impl ProtocolConfig {
    /// Fill built-in category names wherever a counting integration has none
    pub fn with_default_categories(mut self) -> Self {
        fill_categories(&mut self.gm, &[("gm", &["gm", "gmTo"])]);
        fill_categories(
            &mut self.shellies,
            &[
                ("played", &["play", "playGame", "joinGame"]),
                ("staked", &["stake", "stakeNFT", "stakeMany"]),
                ("raffles", &["enterRaffle", "buyTickets"]),
            ],
        );
        fill_categories(
            &mut self.zns,
            &[
                ("deploy", &["deploy", "deployContract"]),
                ("gm", &["gm"]),
                ("register", &["registerDomains", "register"]),
            ],
        );
        fill_categories(
            &mut self.nft2me,
            &[
                ("collections", &["createCollection", "createCollectionN2M"]),
                ("minted", &["mint", "mintTo", "mintPublic"]),
            ],
        );
        self
    }
}

fn fill_categories(activity: &mut ActivityConfig, defaults: &[(&str, &[&str])]) {
    if !activity.categories.is_empty() {
        return;
    }
    for (category, functions) in defaults {
        activity.categories.insert(
            category.to_string(),
            functions.iter().map(|f| f.to_string()).collect(),
        );
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge contracts and OFT token contracts
    pub contracts: Vec<String>,
    pub method_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SwapConfig {
    pub routers: Vec<String>,
    pub functions: Vec<String>,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            routers: Vec::new(),
            functions: [
                "swapExactETHForTokens",
                "swapExactTokensForETH",
                "swapExactTokensForTokens",
                "swapETHForExactTokens",
                "swapTokensForExactETH",
                "swapTokensForExactTokens",
                "exactInputSingle",
                "exactInput",
                "multicall",
                "execute",
            ]
            .iter()
            .map(|f| f.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LendingConfig {
    /// Pool contracts (ERC-20 entry points)
    pub pools: Vec<String>,
    /// Wrapped-token gateways (ETH entry points)
    pub gateways: Vec<String>,
}

impl LendingConfig {
    pub fn contracts(&self) -> Vec<String> {
        self.pools.iter().chain(self.gateways.iter()).cloned().collect()
    }
}

/// Counting integration: category name -> function names
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub contracts: Vec<String>,
    pub categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenLaunchConfig {
    pub contracts: Vec<String>,
    pub create_functions: Vec<String>,
    pub buy_functions: Vec<String>,
    pub sell_functions: Vec<String>,
}

impl Default for TokenLaunchConfig {
    fn default() -> Self {
        Self {
            contracts: Vec::new(),
            create_functions: vec!["createToken".to_string(), "createTokenAndBuy".to_string()],
            buy_functions: vec!["buy".to_string(), "buyTokens".to_string()],
            sell_functions: vec!["sell".to_string(), "sellTokens".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NftTradingConfig {
    /// Configuring any venue replaces the built-in list
    pub venues: Vec<VenueConfig>,
    /// Empty means every successful call to a venue counts as a trade
    pub functions: Vec<String>,
}

impl Default for NftTradingConfig {
    fn default() -> Self {
        let venue = |name: &str, weight| VenueConfig {
            name: name.to_string(),
            contracts: Vec::new(),
            weight,
        };
        Self {
            venues: vec![venue("primary", 50), venue("secondary", 25), venue("tertiary", 10)],
            functions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    pub name: String,
    pub contracts: Vec<String>,
    /// Points per trade on this venue
    pub weight: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VestingConfig {
    pub contracts: Vec<String>,
    pub card_functions: Vec<String>,
    pub lock_functions: Vec<String>,
    pub vest_functions: Vec<String>,
}

impl Default for VestingConfig {
    fn default() -> Self {
        Self {
            contracts: Vec::new(),
            card_functions: vec!["mintCard".to_string(), "mint".to_string()],
            lock_functions: vec!["lock".to_string(), "createLock".to_string()],
            vest_functions: vec!["vest".to_string(), "createVesting".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DepositPlatformConfig {
    pub contracts: Vec<String>,
    pub deposit_functions: Vec<String>,
    pub account_functions: Vec<String>,
}

impl Default for DepositPlatformConfig {
    fn default() -> Self {
        Self {
            contracts: Vec::new(),
            deposit_functions: vec!["deposit".to_string(), "depositCollateral".to_string()],
            account_functions: vec!["createSubaccount".to_string(), "linkSigner".to_string()],
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        // A section like `[protocols.gm]` with only contracts starts with no categories
        config.protocols = config.protocols.with_default_categories();
        config.normalize_addresses();
        Ok(config)
    }

    /// Environment variables win over file values for endpoints and secrets
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(bind) = std::env::var("INKSCORE_BIND") {
            self.server.bind = bind;
        }
        if let Ok(base) = std::env::var("PRICE_API_BASE") {
            self.apis.price_api_base = base;
        }
        if let Ok(base) = std::env::var("DEX_API_BASE") {
            self.apis.dex_api_base = base;
        }
        if let Ok(base) = std::env::var("EXPLORER_API_BASE") {
            self.apis.explorer_api_base = base;
        }
        if let Ok(key) = std::env::var("EXPLORER_API_KEY") {
            self.apis.explorer_api_key = Some(key);
        }
    }

    fn normalize_addresses(&mut self) {
        let lower = |list: &mut Vec<String>| {
            for address in list.iter_mut() {
                *address = address.to_ascii_lowercase();
            }
        };

        lower(&mut self.tokens.stablecoins);
        lower(&mut self.tokens.eth_pegged);
        lower(&mut self.tokens.btc_pegged);
        self.tokens.decimals = self
            .tokens
            .decimals
            .drain()
            .map(|(address, decimals)| (address.to_ascii_lowercase(), decimals))
            .collect();

        let protocols = &mut self.protocols;
        lower(&mut protocols.bridge.contracts);
        lower(&mut protocols.swap.routers);
        lower(&mut protocols.tydro.pools);
        lower(&mut protocols.tydro.gateways);
        lower(&mut protocols.gm.contracts);
        lower(&mut protocols.inkypump.contracts);
        lower(&mut protocols.shellies.contracts);
        lower(&mut protocols.zns.contracts);
        lower(&mut protocols.nft2me.contracts);
        lower(&mut protocols.marvk.contracts);
        lower(&mut protocols.perp_deposits.contracts);
        lower(&mut protocols.nado.contracts);
        for venue in protocols.nft_trading.venues.iter_mut() {
            lower(&mut venue.contracts);
        }
    }
}
