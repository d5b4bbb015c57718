/// Row types for the Postgres store and their conversion into domain types

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::FromRow;

use super::StoreError;
use crate::core::{
    EnrichedTransaction, FunctionAggregate, MetricContract, MetricDefinition, MetricFunction,
    PointsRange, PointsRule, Rank, TrackedAsset, TransactionRecord,
};

/// Decode a text column into a serde enum using its `rename_all` spelling
fn decode_enum<T: DeserializeOwned>(field: &str, value: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        StoreError::DecodeError {
            field: field.to_string(),
            value: value.to_string(),
        }
    })
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub tx_hash: String,
    pub wallet_address: String,
    pub contract_address: String,
    pub function_name: Option<String>,
    pub function_selector: Option<String>,
    pub value: Option<String>,
    pub status: i32,
    pub input: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRow> for TransactionRecord {
    fn from(row: TransactionRow) -> Self {
        Self {
            tx_hash: row.tx_hash,
            wallet_address: row.wallet_address.to_ascii_lowercase(),
            contract_address: row.contract_address.to_ascii_lowercase(),
            function_name: row.function_name,
            function_selector: row.function_selector,
            value: row.value.unwrap_or_else(|| "0".to_string()),
            status: row.status,
            input: row.input,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct EnrichedRow {
    pub tx_hash: String,
    pub wallet_address: String,
    pub contract_address: String,
    pub method_id: Option<String>,
    pub function_name: Option<String>,
    pub value: Option<String>,
    pub status: i32,
    pub logs: Option<serde_json::Value>,
    pub operations: Option<serde_json::Value>,
    pub related_wallets: Option<Vec<String>>,
    pub eth_value_decimal: Option<f64>,
    pub eth_price_usd: Option<f64>,
    pub total_usd_volume: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<EnrichedRow> for EnrichedTransaction {
    fn from(row: EnrichedRow) -> Self {
        Self {
            tx_hash: row.tx_hash,
            wallet_address: row.wallet_address.to_ascii_lowercase(),
            contract_address: row.contract_address.to_ascii_lowercase(),
            method_id: row.method_id,
            function_name: row.function_name,
            value: row.value.unwrap_or_else(|| "0".to_string()),
            status: row.status,
            logs: row.logs.unwrap_or(serde_json::Value::Null),
            operations: row.operations.unwrap_or(serde_json::Value::Null),
            related_wallets: row
                .related_wallets
                .unwrap_or_default()
                .into_iter()
                .map(|w| w.to_ascii_lowercase())
                .collect(),
            eth_value_decimal: row.eth_value_decimal,
            eth_price_usd: row.eth_price_usd,
            total_usd_volume: row.total_usd_volume,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AggregateRow {
    pub contract_address: String,
    pub function_name: String,
    pub tx_count: i64,
    pub eth_value: f64,
}

impl From<AggregateRow> for FunctionAggregate {
    fn from(row: AggregateRow) -> Self {
        Self {
            contract_address: row.contract_address,
            function_name: row.function_name,
            tx_count: row.tx_count.max(0) as u64,
            eth_value: row.eth_value,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TrackedAssetRow {
    pub asset_type: String,
    pub address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: i32,
    pub token_type: Option<String>,
}

impl TryFrom<TrackedAssetRow> for TrackedAsset {
    type Error = StoreError;

    fn try_from(row: TrackedAssetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            asset_type: decode_enum("asset_type", &row.asset_type)?,
            address: row.address.to_ascii_lowercase(),
            symbol: row.symbol,
            name: row.name,
            decimals: row.decimals.clamp(0, u8::MAX as i32) as u8,
            token_type: row.token_type,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct MetricRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub aggregation_type: String,
    pub currency: String,
}

#[derive(Debug, FromRow)]
pub struct MetricContractRow {
    pub metric_id: i64,
    pub address: String,
    pub include_mode: String,
}

#[derive(Debug, FromRow)]
pub struct MetricFunctionRow {
    pub metric_id: i64,
    pub function_name: String,
    pub include_mode: String,
}

/// Join metric rows with their contract and function rows
pub fn assemble_metrics(
    metrics: Vec<MetricRow>,
    contracts: Vec<MetricContractRow>,
    functions: Vec<MetricFunctionRow>,
) -> Result<Vec<MetricDefinition>, StoreError> {
    let mut definitions = Vec::with_capacity(metrics.len());

    for metric in metrics {
        let mut metric_contracts = Vec::new();
        for row in contracts.iter().filter(|c| c.metric_id == metric.id) {
            metric_contracts.push(MetricContract {
                address: row.address.to_ascii_lowercase(),
                include_mode: decode_enum("include_mode", &row.include_mode)?,
            });
        }

        let mut metric_functions = Vec::new();
        for row in functions.iter().filter(|f| f.metric_id == metric.id) {
            metric_functions.push(MetricFunction {
                name: row.function_name.clone(),
                include_mode: decode_enum("include_mode", &row.include_mode)?,
            });
        }

        definitions.push(MetricDefinition {
            slug: metric.slug,
            name: metric.name,
            aggregation_type: decode_enum("aggregation_type", &metric.aggregation_type)?,
            currency: decode_enum("currency", &metric.currency)?,
            contracts: metric_contracts,
            functions: metric_functions,
        });
    }

    Ok(definitions)
}

#[derive(Debug, FromRow)]
pub struct PointsRuleRow {
    pub metric_key: String,
    pub metric_type: String,
    pub calculation_mode: String,
    pub ranges: serde_json::Value,
}

impl TryFrom<PointsRuleRow> for PointsRule {
    type Error = StoreError;

    fn try_from(row: PointsRuleRow) -> Result<Self, Self::Error> {
        let ranges: Vec<PointsRange> = serde_json::from_value(row.ranges)
            .map_err(|e| StoreError::SerializationError(format!("points ranges: {}", e)))?;

        Ok(Self {
            metric_key: row.metric_key,
            metric_type: decode_enum("metric_type", &row.metric_type)?,
            calculation_mode: decode_enum("calculation_mode", &row.calculation_mode)?,
            ranges,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct RankRow {
    pub name: String,
    pub min_points: i64,
    pub max_points: Option<i64>,
    pub color: String,
    pub logo_url: Option<String>,
    pub display_order: i32,
}

impl From<RankRow> for Rank {
    fn from(row: RankRow) -> Self {
        Self {
            name: row.name,
            min_points: row.min_points.max(0) as u64,
            max_points: row.max_points.map(|m| m.max(0) as u64),
            color: row.color,
            logo_url: row.logo_url,
            display_order: row.display_order,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ScoreRow {
    pub score: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
