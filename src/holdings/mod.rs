/// Wallet holdings: native balance, token and NFT holdings, age and activity
pub mod aggregator;

pub use aggregator::{
    age_days, HoldingsAggregator, HoldingsError, NftCollectionCount, TokenValuation, WalletStats,
};
