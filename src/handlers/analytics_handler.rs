/// `/api/analytics/{address}/{slug}`
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use super::{parse_address, ApiError, AppState};

pub async fn metric(
    State(state): State<AppState>,
    Path((address, slug)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let wallet = parse_address(&address)?;
    Ok(Json(state.analytics.by_slug(&wallet, &slug).await?))
}
