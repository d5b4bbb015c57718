/// Storage seams for the scoring pipeline
///
/// The transaction tables and admin reference tables are owned by external
/// systems; this service only reads them. The price history and persisted
/// score tables are the only rows written here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{
    EnrichedTransaction, FunctionAggregate, MetricDefinition, PointsRule, Rank, TrackedAsset,
    TransactionRecord, TxQuery, WalletAddress,
};
use crate::scoring::WalletScore;

pub mod models;
pub mod postgres;
pub mod memory;
pub mod reference;

pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use reference::ReferenceData;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    #[error("Query execution failed: {0}")]
    QueryError(String),

    #[error("Unexpected column value: {field} = {value}")]
    DecodeError { field: String, value: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Postgres error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

/// Read access to the indexed transaction tables
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// `transaction_details` rows with `status = 1` matching the query
    async fn fetch_transactions(&self, query: &TxQuery) -> Result<Vec<TransactionRecord>, StoreError>;

    /// `transaction_enrichment` rows (with logs and call traces) matching the query
    async fn fetch_enriched(&self, query: &TxQuery) -> Result<Vec<EnrichedTransaction>, StoreError>;

    /// `COUNT(*)` and optionally `SUM(value / 1e18)` grouped by (contract, function)
    async fn aggregate_by_function(
        &self,
        wallet: &WalletAddress,
        contracts: &[String],
        include_functions: &[String],
        exclude_functions: &[String],
        sum_value: bool,
    ) -> Result<Vec<FunctionAggregate>, StoreError>;
}

/// Admin-maintained reference tables
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn tracked_assets(&self) -> Result<Vec<TrackedAsset>, StoreError>;
    async fn metric_definitions(&self) -> Result<Vec<MetricDefinition>, StoreError>;
    async fn points_rules(&self) -> Result<Vec<PointsRule>, StoreError>;
    /// Ordered ascending by `min_points`
    async fn ranks(&self) -> Result<Vec<Rank>, StoreError>;
}

/// Hourly price rows backing the persisted price variant
#[async_trait]
pub trait PriceHistoryStore: Send + Sync {
    async fn latest_price(&self, asset: &str, not_before: DateTime<Utc>) -> Result<Option<f64>, StoreError>;
    async fn upsert_price(&self, asset: &str, hour: DateTime<Utc>, price_usd: f64) -> Result<(), StoreError>;
}

/// Persisted final scores keyed by wallet
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn load_score(&self, wallet: &WalletAddress) -> Result<Option<WalletScore>, StoreError>;
    async fn save_score(&self, score: &WalletScore) -> Result<(), StoreError>;
}
