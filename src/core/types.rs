/// Core data types shared by the scoring pipeline
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressError {
    #[error("Invalid wallet address format: {0}")]
    InvalidFormat(String),
}

/// Canonical wallet key: `0x` + 40 hex chars, always lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Validate against `^0x[a-fA-F0-9]{40}$` and normalize to lowercase
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let valid = raw.len() == 42
            && raw.starts_with("0x")
            && raw[2..].chars().all(|c| c.is_ascii_hexdigit());

        if !valid {
            return Err(AddressError::InvalidFormat(raw.to_string()));
        }

        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an address string from external data
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = AddressError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One row of `transaction_details`, read-only to this service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub wallet_address: String,
    pub contract_address: String,
    pub function_name: Option<String>,
    pub function_selector: Option<String>,
    /// Wei as a decimal string
    pub value: String,
    /// 1 = success
    pub status: i32,
    /// ABI-encoded calldata (hex)
    pub input: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of `transaction_enrichment` joined with its function name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    pub tx_hash: String,
    pub wallet_address: String,
    pub contract_address: String,
    pub method_id: Option<String>,
    pub function_name: Option<String>,
    /// Wei as a decimal string
    pub value: String,
    pub status: i32,
    /// Raw event logs produced by the enrichment job
    pub logs: serde_json::Value,
    /// Raw internal call trace produced by the enrichment job
    pub operations: serde_json::Value,
    pub related_wallets: Vec<String>,
    pub eth_value_decimal: Option<f64>,
    pub eth_price_usd: Option<f64>,
    pub total_usd_volume: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Filter for transaction store reads. Only `status = 1` rows are ever returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxQuery {
    pub wallet: String,
    pub contracts: Vec<String>,
    /// Empty means any function
    pub functions: Vec<String>,
    /// Empty means any method id
    pub method_ids: Vec<String>,
}

impl TxQuery {
    pub fn new(wallet: &WalletAddress, contracts: &[String]) -> Self {
        Self {
            wallet: wallet.as_str().to_string(),
            contracts: contracts.iter().map(|c| c.to_ascii_lowercase()).collect(),
            functions: Vec::new(),
            method_ids: Vec::new(),
        }
    }

    pub fn with_functions(mut self, functions: &[String]) -> Self {
        self.functions = functions.to_vec();
        self
    }

    pub fn with_method_ids(mut self, method_ids: &[String]) -> Self {
        self.method_ids = method_ids.iter().map(|m| m.to_ascii_lowercase()).collect();
        self
    }

    pub fn matches_record(&self, record: &TransactionRecord) -> bool {
        record.status == 1
            && record.wallet_address.eq_ignore_ascii_case(&self.wallet)
            && self.contracts.iter().any(|c| c.eq_ignore_ascii_case(&record.contract_address))
            && (self.functions.is_empty()
                || record.function_name.as_ref().map_or(false, |f| self.functions.contains(f)))
    }

    pub fn matches_enriched(&self, row: &EnrichedTransaction) -> bool {
        let touches_wallet = row.wallet_address.eq_ignore_ascii_case(&self.wallet)
            || row.related_wallets.iter().any(|w| w.eq_ignore_ascii_case(&self.wallet));

        row.status == 1
            && touches_wallet
            && self.contracts.iter().any(|c| c.eq_ignore_ascii_case(&row.contract_address))
            && (self.functions.is_empty()
                || row.function_name.as_ref().map_or(false, |f| self.functions.contains(f)))
            && (self.method_ids.is_empty()
                || row.method_id.as_ref().map_or(false, |m| {
                    self.method_ids.iter().any(|id| id.eq_ignore_ascii_case(m))
                }))
    }
}

/// Aggregate row for the generic metric engine: one per (contract, function)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAggregate {
    pub contract_address: String,
    pub function_name: String,
    pub tx_count: u64,
    /// `SUM(value / 1e18)`, zero for count metrics
    pub eth_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Erc20Token,
    MemeCoin,
    NftCollection,
}

/// Admin-curated catalog entry driving holdings evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedAsset {
    pub asset_type: AssetType,
    pub address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u8,
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Count,
    SumEthValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricCurrency {
    Count,
    Eth,
    Usd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeMode {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricContract {
    pub address: String,
    pub include_mode: IncludeMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFunction {
    pub name: String,
    pub include_mode: IncludeMode,
}

/// Admin-configured rule for the generic metric engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub slug: String,
    pub name: String,
    pub aggregation_type: AggregationType,
    pub currency: MetricCurrency,
    pub contracts: Vec<MetricContract>,
    pub functions: Vec<MetricFunction>,
}

impl MetricDefinition {
    pub fn included_contracts(&self) -> Vec<String> {
        self.contracts
            .iter()
            .filter(|c| c.include_mode == IncludeMode::Include)
            .map(|c| c.address.to_ascii_lowercase())
            .collect()
    }

    pub fn included_functions(&self) -> Vec<String> {
        self.functions_with(IncludeMode::Include)
    }

    pub fn excluded_functions(&self) -> Vec<String> {
        self.functions_with(IncludeMode::Exclude)
    }

    fn functions_with(&self, mode: IncludeMode) -> Vec<String> {
        self.functions
            .iter()
            .filter(|f| f.include_mode == mode)
            .map(|f| f.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Native,
    Platform,
    Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMode {
    Range,
    Multiplier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsRange {
    pub min: f64,
    pub max: Option<f64>,
    /// Points for `range` mode, the rate for `multiplier` mode
    pub points: f64,
}

/// Admin-configured points rule for one breakdown key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsRule {
    pub metric_key: String,
    pub metric_type: MetricType,
    pub calculation_mode: CalculationMode,
    pub ranges: Vec<PointsRange>,
}

/// User-facing reputation tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rank {
    pub name: String,
    pub min_points: u64,
    pub max_points: Option<u64>,
    pub color: String,
    pub logo_url: Option<String>,
    pub display_order: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_normalizes_case() {
        let wallet = WalletAddress::parse("0xAbCdEf0123456789aBcDeF0123456789ABCDEF01").unwrap();
        assert_eq!(wallet.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert!(wallet.matches("0xABCDEF0123456789ABCDEF0123456789ABCDEF01"));
    }

    #[test]
    fn test_wallet_address_rejects_bad_input() {
        for raw in [
            "",
            "0x123",
            "abcdef0123456789abcdef0123456789abcdef0123",
            "0xZZcdef0123456789abcdef0123456789abcdef01",
            "0xabcdef0123456789abcdef0123456789abcdef011",
            "0Xabcdef0123456789abcdef0123456789abcdef01",
        ] {
            assert!(WalletAddress::parse(raw).is_err(), "accepted {raw}");
        }
    }

    #[test]
    fn test_wallet_address_deserializes_through_parse() {
        let wallet: WalletAddress =
            serde_json::from_str("\"0xAbCdEf0123456789aBcDeF0123456789ABCDEF01\"").unwrap();
        assert_eq!(wallet.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(
            serde_json::to_string(&wallet).unwrap(),
            "\"0xabcdef0123456789abcdef0123456789abcdef01\""
        );

        assert!(serde_json::from_str::<WalletAddress>("\"0x123\"").is_err());
        assert!(serde_json::from_str::<WalletAddress>("\"not-an-address\"").is_err());
    }

    #[test]
    fn test_metric_definition_partitions_modes() {
        let metric = MetricDefinition {
            slug: "lending".into(),
            name: "Lending".into(),
            aggregation_type: AggregationType::SumEthValue,
            currency: MetricCurrency::Usd,
            contracts: vec![
                MetricContract { address: "0xAA".into(), include_mode: IncludeMode::Include },
                MetricContract { address: "0xbb".into(), include_mode: IncludeMode::Exclude },
            ],
            functions: vec![
                MetricFunction { name: "supply".into(), include_mode: IncludeMode::Include },
                MetricFunction { name: "approve".into(), include_mode: IncludeMode::Exclude },
            ],
        };

        assert_eq!(metric.included_contracts(), vec!["0xaa".to_string()]);
        assert_eq!(metric.included_functions(), vec!["supply".to_string()]);
        assert_eq!(metric.excluded_functions(), vec!["approve".to_string()]);
    }
}
