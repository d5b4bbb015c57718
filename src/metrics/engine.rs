/// Configuration-driven metric engine
///
/// A metric definition names contracts and function filters; the engine
/// counts (and for `sum_eth_value`, sums) the wallet's matching
/// transactions grouped by contract and function. Lending entry points,
/// wrap/unwrap and token-in router swaps carry their amount in calldata, so
/// those groups get a second pass that decodes `(asset, amount)` per row and
/// prices it.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::constants::WETH_ADDRESS;
use crate::core::units::{parse_amount, round2, sanitize, wei_to_eth};
use crate::core::{
    AggregationType, FunctionAggregate, MetricCurrency, MetricDefinition, TxQuery, WalletAddress,
};
use crate::database::{StoreError, TransactionStore};
use crate::enrichment::{decode_defi_call, is_decodable};
use crate::util::TokenPricer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBreakdown {
    pub function_name: String,
    pub tx_count: u64,
    pub eth_value: f64,
    /// `eth_value * eth_usd` with two decimals
    pub usd_value: String,
    /// Amount recovered from calldata rather than the call value
    pub decoded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractAggregate {
    pub contract_address: String,
    pub tx_count: u64,
    pub eth_value: f64,
    pub usd_value: String,
    pub by_function: Vec<FunctionBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub slug: String,
    pub name: String,
    pub currency: MetricCurrency,
    pub total_count: u64,
    /// Count, ETH or USD according to `currency`
    pub total_value: f64,
    pub total_eth: f64,
    pub total_usd: f64,
    pub sub_aggregates: Vec<ContractAggregate>,
}

impl MetricResult {
    pub fn empty(metric: &MetricDefinition) -> Self {
        Self {
            slug: metric.slug.clone(),
            name: metric.name.clone(),
            currency: metric.currency,
            total_count: 0,
            total_value: 0.0,
            total_eth: 0.0,
            total_usd: 0.0,
            sub_aggregates: Vec::new(),
        }
    }
}

fn usd_string(eth: f64, eth_usd: f64) -> String {
    format!("{:.2}", sanitize(eth * eth_usd))
}

pub struct MetricEngine {
    store: Arc<dyn TransactionStore>,
    pricer: Arc<TokenPricer>,
}

impl MetricEngine {
    pub fn new(store: Arc<dyn TransactionStore>, pricer: Arc<TokenPricer>) -> Self {
        Self { store, pricer }
    }

    /// Never fails: a store error yields the empty result
    pub async fn query(&self, wallet: &WalletAddress, metric: &MetricDefinition) -> MetricResult {
        match self.query_metric_for_wallet(wallet, metric).await {
            Ok(result) => result,
            Err(e) => {
                warn!("⚠️ Metric {} failed for {}: {}", metric.slug, wallet, e);
                MetricResult::empty(metric)
            }
        }
    }

    #[instrument(skip_all, fields(wallet = %wallet, metric = %metric.slug))]
    pub async fn query_metric_for_wallet(
        &self,
        wallet: &WalletAddress,
        metric: &MetricDefinition,
    ) -> Result<MetricResult, StoreError> {
        let contracts = metric.included_contracts();
        if contracts.is_empty() {
            debug!("Metric {} has no included contracts", metric.slug);
            return Ok(MetricResult::empty(metric));
        }

        let sum_value = metric.aggregation_type == AggregationType::SumEthValue;
        let mut groups = self
            .store
            .aggregate_by_function(
                wallet,
                &contracts,
                &metric.included_functions(),
                &metric.excluded_functions(),
                sum_value,
            )
            .await?;

        let eth_usd = self.pricer.eth_usd().await;
        let mut decoded_groups = Vec::new();
        if sum_value {
            for group in groups.iter_mut() {
                if is_decodable(&group.function_name) {
                    group.eth_value = self.decoded_eth_value(wallet, group, eth_usd).await?;
                    decoded_groups.push((group.contract_address.clone(), group.function_name.clone()));
                }
            }
        }

        let mut by_contract: BTreeMap<String, Vec<FunctionAggregate>> = BTreeMap::new();
        for group in groups {
            by_contract
                .entry(group.contract_address.clone())
                .or_default()
                .push(group);
        }

        let mut result = MetricResult::empty(metric);
        for (contract_address, functions) in by_contract {
            let tx_count: u64 = functions.iter().map(|f| f.tx_count).sum();
            let eth_value: f64 = functions.iter().map(|f| sanitize(f.eth_value)).sum();

            let by_function = functions
                .into_iter()
                .map(|f| FunctionBreakdown {
                    decoded: decoded_groups
                        .iter()
                        .any(|(c, n)| *c == f.contract_address && *n == f.function_name),
                    usd_value: usd_string(f.eth_value, eth_usd),
                    function_name: f.function_name,
                    tx_count: f.tx_count,
                    eth_value: f.eth_value,
                })
                .collect();

            result.total_count += tx_count;
            result.total_eth += eth_value;
            result.sub_aggregates.push(ContractAggregate {
                usd_value: usd_string(eth_value, eth_usd),
                contract_address,
                tx_count,
                eth_value,
                by_function,
            });
        }

        result.total_usd = round2(sanitize(result.total_eth * eth_usd));
        result.total_value = match (metric.aggregation_type, metric.currency) {
            (AggregationType::Count, _) | (_, MetricCurrency::Count) => result.total_count as f64,
            (AggregationType::SumEthValue, MetricCurrency::Eth) => result.total_eth,
            (AggregationType::SumEthValue, MetricCurrency::Usd) => result.total_usd,
        };

        Ok(result)
    }

    /// Re-sum one decodable group from calldata, in ETH at the current price.
    /// Rows that do not decode keep their raw call value.
    async fn decoded_eth_value(
        &self,
        wallet: &WalletAddress,
        group: &FunctionAggregate,
        eth_usd: f64,
    ) -> Result<f64, StoreError> {
        let contracts = [group.contract_address.clone()];
        let functions = [group.function_name.clone()];
        let rows = self
            .store
            .fetch_transactions(&TxQuery::new(wallet, &contracts).with_functions(&functions))
            .await?;

        let mut usd_total = 0.0;
        for row in &rows {
            let value = parse_amount(&row.value).unwrap_or(U256::ZERO);
            let decoded = row
                .input
                .as_deref()
                .map(|input| decode_defi_call(&group.function_name, input, value, WETH_ADDRESS));

            let usd = match decoded {
                Some(Ok(call)) => self.pricer.usd_value(&call.asset, call.amount).await,
                Some(Err(e)) => {
                    debug!("Calldata for {} did not decode: {}", row.tx_hash, e);
                    wei_to_eth(value) * eth_usd
                }
                None => wei_to_eth(value) * eth_usd,
            };
            usd_total += sanitize(usd);
        }

        if eth_usd > 0.0 {
            Ok(usd_total / eth_usd)
        } else {
            Ok(0.0)
        }
    }
}
