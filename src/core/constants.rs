/// Chain, API and function-name constants

/// Ink mainnet
pub const CHAIN_ID: u64 = 57073;
pub const DEX_CHAIN_SLUG: &str = "ink";

pub const PRICE_API_BASE: &str = "https://api.coingecko.com/api/v3";
pub const DEX_API_BASE: &str = "https://api.dexscreener.com/latest/dex";
pub const EXPLORER_API_BASE: &str = "https://api.routescan.io/v2/network/mainnet/evm";

pub const COINGECKO_ETH_ID: &str = "ethereum";
pub const COINGECKO_BTC_ID: &str = "bitcoin";

/// OP-stack predeploy, priced as ETH
pub const WETH_ADDRESS: &str = "0x4200000000000000000000000000000000000006";

pub const DEFAULT_ETH_FALLBACK_USD: f64 = 3500.0;
pub const DEFAULT_BTC_FALLBACK_USD: f64 = 100_000.0;

pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const PRICE_CACHE_TTL_SECS: u64 = 300;
pub const PRICE_HISTORY_TTL_SECS: u64 = 3600;
pub const DEX_CACHE_TTL_SECS: u64 = 30;
pub const SCORE_CACHE_TTL_SECS: u64 = 30;
pub const STATS_CACHE_TTL_SECS: u64 = 30;
pub const STATS_STALE_FACTOR: u32 = 10;
pub const ANALYTICS_CACHE_TTL_SECS: u64 = 30;
pub const RANKS_CACHE_TTL_SECS: u64 = 60;
pub const REFERENCE_CACHE_TTL_SECS: u64 = 300;
pub const SWEEP_INTERVAL_SECS: u64 = 60;
pub const EXPLORER_PAGE_SIZE: u32 = 100;
/// Guard against a cursor that never terminates
pub const EXPLORER_MAX_PAGES: usize = 200;

pub const MAX_SINGLE_TX_USD: f64 = 1_000_000.0;
pub const MAX_SINGLE_LENDING_TX_USD: f64 = 1_000_000_000.0;

pub const MS_PER_DAY: i64 = 86_400_000;

/// DeFi entry points whose USD amount lives in calldata rather than `value`
pub const DECODABLE_DEFI_FUNCTIONS: &[&str] = &[
    "borrow",
    "supply",
    "deposit",
    "repay",
    "withdraw",
    "borrowETH",
    "depositETH",
    "repayETH",
    "withdrawETH",
    "swapExactTokensForTokens",
    "swapExactTokensForETH",
    "swapTokensForExactTokens",
    "swapTokensForExactETH",
];
