/// Score result types
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Rank, WalletAddress};

/// Holdings-derived signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeEntry {
    pub value: f64,
    pub points: u64,
}

/// Protocol-derived signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformEntry {
    pub tx_count: u64,
    pub usd_volume: f64,
    pub points: u64,
}

/// Admin metric scored through a points rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub value: f64,
    pub points: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub native: BTreeMap<String, NativeEntry>,
    pub platforms: BTreeMap<String, PlatformEntry>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricEntry>,
}

impl ScoreBreakdown {
    /// Sum of every leaf `points`
    pub fn total_points(&self) -> u64 {
        let native = self.native.values().map(|e| e.points);
        let platforms = self.platforms.values().map(|e| e.points);
        let metrics = self.metrics.values().map(|e| e.points);
        native
            .chain(platforms)
            .chain(metrics)
            .fold(0u64, u64::saturating_add)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletScore {
    pub wallet_address: WalletAddress,
    pub total_points: u64,
    pub rank: Option<Rank>,
    pub breakdown: ScoreBreakdown,
    pub last_updated: DateTime<Utc>,
    /// Set on the zero-valued score served when holdings are unavailable
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_fallback: bool,
}

impl WalletScore {
    pub fn empty(wallet: &WalletAddress) -> Self {
        Self {
            wallet_address: wallet.clone(),
            total_points: 0,
            rank: None,
            breakdown: ScoreBreakdown::default(),
            last_updated: Utc::now(),
            is_fallback: true,
        }
    }
}
