/// In-memory store implementing every storage trait
///
/// Used by tests and for running the service without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PriceHistoryStore, ReferenceStore, ScoreStore, StoreError, TransactionStore};
use crate::core::units::{parse_amount, wei_to_eth};
use crate::core::{
    EnrichedTransaction, FunctionAggregate, MetricDefinition, PointsRule, Rank, TrackedAsset,
    TransactionRecord, TxQuery, WalletAddress,
};
use crate::scoring::WalletScore;

#[derive(Default)]
pub struct InMemoryStore {
    transactions: RwLock<Vec<TransactionRecord>>,
    enriched: RwLock<Vec<EnrichedTransaction>>,
    assets: RwLock<Vec<TrackedAsset>>,
    metrics: RwLock<Vec<MetricDefinition>>,
    rules: RwLock<Vec<PointsRule>>,
    ranks: RwLock<Vec<Rank>>,
    prices: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, f64>>>,
    scores: RwLock<HashMap<String, WalletScore>>,
    /// Number of transaction-store reads served
    query_count: AtomicU64,
    fail_queries: std::sync::atomic::AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_transactions(&self, rows: impl IntoIterator<Item = TransactionRecord>) {
        self.transactions.write().await.extend(rows);
    }

    pub async fn add_enriched(&self, rows: impl IntoIterator<Item = EnrichedTransaction>) {
        self.enriched.write().await.extend(rows);
    }

    pub async fn set_tracked_assets(&self, assets: Vec<TrackedAsset>) {
        *self.assets.write().await = assets;
    }

    pub async fn set_metric_definitions(&self, metrics: Vec<MetricDefinition>) {
        *self.metrics.write().await = metrics;
    }

    pub async fn set_points_rules(&self, rules: Vec<PointsRule>) {
        *self.rules.write().await = rules;
    }

    pub async fn set_ranks(&self, mut ranks: Vec<Rank>) {
        ranks.sort_by_key(|r| r.min_points);
        *self.ranks.write().await = ranks;
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Make every transaction-store read fail, simulating a store outage
    pub fn set_failing(&self, failing: bool) {
        self.fail_queries.store(failing, Ordering::SeqCst);
    }

    fn begin_query(&self) -> Result<(), StoreError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::QueryError("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn fetch_transactions(&self, query: &TxQuery) -> Result<Vec<TransactionRecord>, StoreError> {
        self.begin_query()?;
        let rows = self.transactions.read().await;
        let mut matched: Vec<TransactionRecord> =
            rows.iter().filter(|r| query.matches_record(r)).cloned().collect();
        matched.sort_by_key(|r| r.created_at);
        Ok(matched)
    }

    async fn fetch_enriched(&self, query: &TxQuery) -> Result<Vec<EnrichedTransaction>, StoreError> {
        self.begin_query()?;
        let rows = self.enriched.read().await;
        let mut matched: Vec<EnrichedTransaction> =
            rows.iter().filter(|r| query.matches_enriched(r)).cloned().collect();
        matched.sort_by_key(|r| r.created_at);
        Ok(matched)
    }

    async fn aggregate_by_function(
        &self,
        wallet: &WalletAddress,
        contracts: &[String],
        include_functions: &[String],
        exclude_functions: &[String],
        sum_value: bool,
    ) -> Result<Vec<FunctionAggregate>, StoreError> {
        self.begin_query()?;
        let query = TxQuery::new(wallet, contracts).with_functions(include_functions);
        let rows = self.transactions.read().await;

        let mut groups: BTreeMap<(String, String), FunctionAggregate> = BTreeMap::new();
        for row in rows.iter().filter(|r| query.matches_record(r)) {
            let function = row.function_name.clone().unwrap_or_else(|| "unknown".to_string());
            if exclude_functions.contains(&function) {
                continue;
            }

            let contract = row.contract_address.to_ascii_lowercase();
            let entry = groups
                .entry((contract.clone(), function.clone()))
                .or_insert_with(|| FunctionAggregate {
                    contract_address: contract,
                    function_name: function,
                    tx_count: 0,
                    eth_value: 0.0,
                });
            entry.tx_count += 1;
            if sum_value {
                entry.eth_value += parse_amount(&row.value).map(wei_to_eth).unwrap_or(0.0);
            }
        }

        Ok(groups.into_values().collect())
    }
}

#[async_trait]
impl ReferenceStore for InMemoryStore {
    async fn tracked_assets(&self) -> Result<Vec<TrackedAsset>, StoreError> {
        Ok(self.assets.read().await.clone())
    }

    async fn metric_definitions(&self) -> Result<Vec<MetricDefinition>, StoreError> {
        Ok(self.metrics.read().await.clone())
    }

    async fn points_rules(&self) -> Result<Vec<PointsRule>, StoreError> {
        Ok(self.rules.read().await.clone())
    }

    async fn ranks(&self) -> Result<Vec<Rank>, StoreError> {
        Ok(self.ranks.read().await.clone())
    }
}

#[async_trait]
impl PriceHistoryStore for InMemoryStore {
    async fn latest_price(&self, asset: &str, not_before: DateTime<Utc>) -> Result<Option<f64>, StoreError> {
        let prices = self.prices.read().await;
        Ok(prices
            .get(asset)
            .and_then(|series| series.range(not_before..).next_back().map(|(_, p)| *p)))
    }

    async fn upsert_price(&self, asset: &str, hour: DateTime<Utc>, price_usd: f64) -> Result<(), StoreError> {
        self.prices
            .write()
            .await
            .entry(asset.to_string())
            .or_default()
            .insert(hour, price_usd);
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for InMemoryStore {
    async fn load_score(&self, wallet: &WalletAddress) -> Result<Option<WalletScore>, StoreError> {
        Ok(self.scores.read().await.get(wallet.as_str()).cloned())
    }

    async fn save_score(&self, score: &WalletScore) -> Result<(), StoreError> {
        self.scores
            .write()
            .await
            .insert(score.wallet_address.as_str().to_string(), score.clone());
        Ok(())
    }
}
