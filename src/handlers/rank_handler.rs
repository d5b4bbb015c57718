/// `/api/ranks`
use axum::extract::State;
use axum::Json;

use super::{ApiError, AppState};
use crate::core::Rank;

pub async fn ranks(State(state): State<AppState>) -> Result<Json<Vec<Rank>>, ApiError> {
    let ranks = state
        .scores
        .ranks()
        .ranks()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ranks.as_ref().clone()))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{get, serve};
    use crate::config::Config;
    use crate::holdings::aggregator::fixtures::FakeExplorer;

    #[tokio::test]
    async fn test_full_table_in_order() {
        let server = serve(Config::default(), FakeExplorer::default()).await;
        let (status, body) = get(format!("{}/api/ranks", server.base)).await;
        assert_eq!(status, 200);

        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Bronze", "Silver", "Gold"]);
    }
}
