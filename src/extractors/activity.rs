/// Counting integrations: GM, Shellies, ZNS, NFT2Me
///
/// Each configured category maps to a list of function names; the output is
/// the number of successful calls per category.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ExtractError, ExtractorContext, ProtocolExtractor};
use crate::config::ActivityConfig;
use crate::core::{TxQuery, WalletAddress};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityCounts {
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
}

impl ActivityCounts {
    pub fn count(&self, category: &str) -> u64 {
        self.counts.get(category).copied().unwrap_or(0)
    }
}

pub struct ActivityExtractor {
    slug: &'static str,
    ctx: ExtractorContext,
    config: ActivityConfig,
}

impl ActivityExtractor {
    pub fn new(slug: &'static str, ctx: ExtractorContext, config: ActivityConfig) -> Self {
        Self { slug, ctx, config }
    }

    fn zeroed(&self) -> ActivityCounts {
        ActivityCounts {
            counts: self.config.categories.keys().map(|c| (c.clone(), 0)).collect(),
            total: 0,
        }
    }
}

#[async_trait]
impl ProtocolExtractor for ActivityExtractor {
    type Output = ActivityCounts;

    fn slug(&self) -> &'static str {
        self.slug
    }

    #[instrument(skip_all, fields(slug = self.slug, wallet = %wallet))]
    async fn try_extract(&self, wallet: &WalletAddress) -> Result<ActivityCounts, ExtractError> {
        let mut result = self.zeroed();
        if self.config.contracts.is_empty() {
            return Ok(result);
        }

        let functions: Vec<String> = self.config.categories.values().flatten().cloned().collect();
        let query = TxQuery::new(wallet, &self.config.contracts).with_functions(&functions);
        let rows = self.ctx.store.fetch_transactions(&query).await?;

        for row in &rows {
            let Some(function) = row.function_name.as_ref() else {
                continue;
            };
            for (category, names) in &self.config.categories {
                if names.contains(function) {
                    *result.counts.entry(category.clone()).or_insert(0) += 1;
                    result.total += 1;
                    break;
                }
            }
        }

        Ok(result)
    }
}
