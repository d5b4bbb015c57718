/// Wallet routes: holdings stats, score and per-protocol results
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_address, ApiError, AppState};
use crate::holdings::WalletStats;
use crate::scoring::WalletScore;

/// Protocols exposed directly under `/api/wallet/{address}/`
pub const WALLET_PROTOCOL_SLUGS: [&str; 4] = ["bridge", "swap", "tydro", "nft2me"];

#[derive(Debug, Default, Deserialize)]
pub struct ScoreParams {
    pub refresh: Option<String>,
}

impl ScoreParams {
    fn refresh(&self) -> bool {
        self.refresh
            .as_deref()
            .map_or(false, |r| r.eq_ignore_ascii_case("true") || r == "1")
    }
}

pub async fn stats(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<WalletStats>, ApiError> {
    let wallet = parse_address(&address)?;
    Ok(Json(state.holdings.get_all_stats(&wallet).await))
}

/// Always 200 for a valid address; holdings outages yield the empty score
pub async fn score(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<ScoreParams>,
) -> Result<Json<WalletScore>, ApiError> {
    let wallet = parse_address(&address)?;
    Ok(Json(state.scores.score_or_fallback(&wallet, params.refresh()).await))
}

pub async fn protocol(
    State(state): State<AppState>,
    Path((address, slug)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let wallet = parse_address(&address)?;
    if !WALLET_PROTOCOL_SLUGS.contains(&slug.as_str()) {
        return Err(ApiError::NotFound(format!("unknown protocol '{}'", slug)));
    }

    let extractor = state
        .analytics
        .extractors()
        .by_slug(&slug)
        .ok_or_else(|| ApiError::NotFound(format!("unknown protocol '{}'", slug)))?;
    Ok(Json(extractor.extract_json(&wallet).await))
}
