/// Postgres-backed store over the indexer and admin tables

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::models::{
    assemble_metrics, AggregateRow, EnrichedRow, MetricContractRow, MetricFunctionRow, MetricRow,
    PointsRuleRow, RankRow, ScoreRow, TrackedAssetRow, TransactionRow,
};
use super::{PriceHistoryStore, ReferenceStore, ScoreStore, StoreError, TransactionStore};
use crate::core::{
    EnrichedTransaction, FunctionAggregate, MetricDefinition, PointsRule, Rank, TrackedAsset,
    TransactionRecord, TxQuery, WalletAddress,
};
use crate::scoring::WalletScore;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionError(format!("Failed to connect to database: {}", e)))?;

        info!("✅ PgStore connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the two tables this service writes to
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                asset TEXT NOT NULL,
                hour_bucket TIMESTAMPTZ NOT NULL,
                price_usd DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (asset, hour_bucket)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryError(format!("Failed to create price_history: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_scores (
                wallet_address TEXT PRIMARY KEY,
                score JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryError(format!("Failed to create wallet_scores: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn fetch_transactions(&self, query: &TxQuery) -> Result<Vec<TransactionRecord>, StoreError> {
        if query.contracts.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT tx_hash, wallet_address, contract_address, function_name, function_selector,
                   value::text AS value, status, input, created_at
            FROM transaction_details
            WHERE LOWER(wallet_address) = $1
              AND LOWER(contract_address) = ANY($2)
              AND status = 1
              AND (cardinality($3::text[]) = 0 OR function_name = ANY($3))
            ORDER BY created_at ASC
            "#,
        )
        .bind(&query.wallet)
        .bind(&query.contracts)
        .bind(&query.functions)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TransactionRecord::from).collect())
    }

    async fn fetch_enriched(&self, query: &TxQuery) -> Result<Vec<EnrichedTransaction>, StoreError> {
        if query.contracts.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<EnrichedRow> = sqlx::query_as(
            r#"
            SELECT e.tx_hash, e.wallet_address, e.contract_address, e.method_id,
                   d.function_name, e.value::text AS value, COALESCE(d.status, 1) AS status,
                   e.logs, e.operations, e.related_wallets,
                   e.eth_value_decimal::float8 AS eth_value_decimal,
                   e.eth_price_usd::float8 AS eth_price_usd,
                   e.total_usd_volume::float8 AS total_usd_volume,
                   e.created_at
            FROM transaction_enrichment e
            LEFT JOIN transaction_details d ON d.tx_hash = e.tx_hash
            WHERE (LOWER(e.wallet_address) = $1 OR $1 = ANY(e.related_wallets))
              AND LOWER(e.contract_address) = ANY($2)
              AND COALESCE(d.status, 1) = 1
              AND (cardinality($3::text[]) = 0 OR d.function_name = ANY($3))
              AND (cardinality($4::text[]) = 0 OR LOWER(e.method_id) = ANY($4))
            ORDER BY e.created_at ASC
            "#,
        )
        .bind(&query.wallet)
        .bind(&query.contracts)
        .bind(&query.functions)
        .bind(&query.method_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EnrichedTransaction::from).collect())
    }

    async fn aggregate_by_function(
        &self,
        wallet: &WalletAddress,
        contracts: &[String],
        include_functions: &[String],
        exclude_functions: &[String],
        sum_value: bool,
    ) -> Result<Vec<FunctionAggregate>, StoreError> {
        if contracts.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<AggregateRow> = sqlx::query_as(
            r#"
            SELECT LOWER(contract_address) AS contract_address,
                   COALESCE(function_name, 'unknown') AS function_name,
                   COUNT(*) AS tx_count,
                   CASE WHEN $5 THEN COALESCE(SUM(value::numeric / 1e18), 0)::float8
                        ELSE 0::float8 END AS eth_value
            FROM transaction_details
            WHERE LOWER(wallet_address) = $1
              AND LOWER(contract_address) = ANY($2)
              AND status = 1
              AND (cardinality($3::text[]) = 0 OR function_name = ANY($3))
              AND NOT (COALESCE(function_name, '') = ANY($4))
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .bind(wallet.as_str())
        .bind(contracts)
        .bind(include_functions)
        .bind(exclude_functions)
        .bind(sum_value)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FunctionAggregate::from).collect())
    }
}

#[async_trait]
impl ReferenceStore for PgStore {
    async fn tracked_assets(&self) -> Result<Vec<TrackedAsset>, StoreError> {
        let rows: Vec<TrackedAssetRow> = sqlx::query_as(
            r#"
            SELECT asset_type, address, symbol, name, decimals, token_type
            FROM tracked_assets
            WHERE is_active = TRUE
            ORDER BY asset_type, symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrackedAsset::try_from).collect()
    }

    async fn metric_definitions(&self) -> Result<Vec<MetricDefinition>, StoreError> {
        let metrics: Vec<MetricRow> = sqlx::query_as(
            "SELECT id, slug, name, aggregation_type, currency FROM metric_definitions WHERE is_active = TRUE ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let contracts: Vec<MetricContractRow> =
            sqlx::query_as("SELECT metric_id, address, include_mode FROM metric_contracts")
                .fetch_all(&self.pool)
                .await?;

        let functions: Vec<MetricFunctionRow> =
            sqlx::query_as("SELECT metric_id, function_name, include_mode FROM metric_functions")
                .fetch_all(&self.pool)
                .await?;

        assemble_metrics(metrics, contracts, functions)
    }

    async fn points_rules(&self) -> Result<Vec<PointsRule>, StoreError> {
        let rows: Vec<PointsRuleRow> = sqlx::query_as(
            "SELECT metric_key, metric_type, calculation_mode, ranges FROM points_rules WHERE is_active = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PointsRule::try_from).collect()
    }

    async fn ranks(&self) -> Result<Vec<Rank>, StoreError> {
        let rows: Vec<RankRow> = sqlx::query_as(
            r#"
            SELECT name, min_points, max_points, color, logo_url, display_order
            FROM ranks
            ORDER BY min_points ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Rank::from).collect())
    }
}

#[async_trait]
impl PriceHistoryStore for PgStore {
    async fn latest_price(&self, asset: &str, not_before: DateTime<Utc>) -> Result<Option<f64>, StoreError> {
        let price: Option<(f64,)> = sqlx::query_as(
            r#"
            SELECT price_usd FROM price_history
            WHERE asset = $1 AND hour_bucket >= $2
            ORDER BY hour_bucket DESC
            LIMIT 1
            "#,
        )
        .bind(asset)
        .bind(not_before)
        .fetch_optional(&self.pool)
        .await?;

        Ok(price.map(|(p,)| p))
    }

    async fn upsert_price(&self, asset: &str, hour: DateTime<Utc>, price_usd: f64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO price_history (asset, hour_bucket, price_usd)
            VALUES ($1, $2, $3)
            ON CONFLICT (asset, hour_bucket) DO UPDATE SET price_usd = EXCLUDED.price_usd
            "#,
        )
        .bind(asset)
        .bind(hour)
        .bind(price_usd)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ScoreStore for PgStore {
    async fn load_score(&self, wallet: &WalletAddress) -> Result<Option<WalletScore>, StoreError> {
        let row: Option<ScoreRow> = sqlx::query_as(
            "SELECT score, updated_at FROM wallet_scores WHERE wallet_address = $1",
        )
        .bind(wallet.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut score: WalletScore = serde_json::from_value(row.score)
                    .map_err(|e| StoreError::SerializationError(e.to_string()))?;
                score.last_updated = row.updated_at;
                Ok(Some(score))
            }
            None => Ok(None),
        }
    }

    async fn save_score(&self, score: &WalletScore) -> Result<(), StoreError> {
        let payload = serde_json::to_value(score)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO wallet_scores (wallet_address, score, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (wallet_address) DO UPDATE SET score = EXCLUDED.score, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(score.wallet_address.as_str())
        .bind(payload)
        .bind(score.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
