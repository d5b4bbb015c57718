pub mod price_feed;
pub mod dexscreener;
pub mod explorer;
pub mod token_pricing;

pub use dexscreener::DexScreenerClient;
pub use explorer::{ExplorerClient, ExplorerError, RoutescanClient};
pub use price_feed::{CoingeckoSource, PriceAsset, PriceError, PriceOracle, PriceSource};
pub use token_pricing::TokenPricer;
