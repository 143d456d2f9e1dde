use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::datasource::{AssetKind, DataSource};
use crate::error::AppResult;
use crate::params::LeaderboardParams;
use crate::services::aggregator::{Aggregator, LeaderboardEntry};
use crate::services::reputation::{KeyKind, ReputationResolver, ResolvedReputation};
use crate::services::transfers::{TransferFetcher, TransferQuery, TransferRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationSource {
    /// Owner record keyed by token id, with single-token fallback
    OwnerTokens,
    /// Global catalogue keyed by title; entries list their tokens
    TitleCatalogue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub pages_fetched: usize,
    pub transfers_fetched: usize,
    pub transfers_kept: usize,
    pub key_kind: KeyKind,
    pub observed_token_ids: Vec<String>,
    pub fallback_token_ids: Vec<String>,
    pub unmatched_keys: Vec<String>,
    pub reputation_payloads: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

pub struct LeaderboardService {
    fetcher: TransferFetcher,
    resolver: ReputationResolver,
    aggregator: Aggregator,
}

impl LeaderboardService {
    pub fn new(datasource: Arc<dyn DataSource>, config: &Config) -> Self {
        Self {
            fetcher: TransferFetcher::new(Arc::clone(&datasource), config.max_pages),
            resolver: ReputationResolver::new(
                datasource,
                config.reputation_required,
                config.fallback_lookup_limit,
            ),
            aggregator: Aggregator::new(),
        }
    }

    /// Fetch, resolve, aggregate for one wallet's incoming NFT transfers
    pub async fn build(
        &self,
        params: &LeaderboardParams,
        source: ReputationSource,
    ) -> AppResult<LeaderboardResponse> {
        tracing::info!(
            "Building {:?} leaderboard for wallet: {}",
            source,
            params.wallet_id
        );

        let fetched = self
            .fetcher
            .fetch_all(TransferQuery {
                kind: AssetKind::Nft,
                wallet_id: params.wallet_id.clone(),
                limit: params.limit,
                skip: params.skip,
                range: params.range,
            })
            .await;

        let observed = observed_token_ids(&fetched.records);

        let resolved = match source {
            ReputationSource::OwnerTokens => {
                self.resolver
                    .resolve_for_owner(&params.wallet_id, &observed)
                    .await?
            }
            ReputationSource::TitleCatalogue => self.resolver.resolve_catalogue().await?,
        };

        let leaderboard = self.aggregator.build(
            &fetched.records,
            &resolved.map,
            source == ReputationSource::TitleCatalogue,
        );

        tracing::info!("Leaderboard has {} wallets", leaderboard.len());

        let debug = if params.debug {
            Some(DebugInfo {
                pages_fetched: fetched.pages,
                transfers_fetched: fetched.raw_count,
                transfers_kept: fetched.records.len(),
                key_kind: resolved.map.kind(),
                unmatched_keys: unmatched_keys(&fetched.records, &resolved),
                observed_token_ids: observed,
                fallback_token_ids: resolved.fallback_token_ids,
                reputation_payloads: resolved.raw_payloads,
            })
        } else {
            None
        };

        Ok(LeaderboardResponse { leaderboard, debug })
    }
}

/// Distinct token ids in first-seen order
fn observed_token_ids(records: &[TransferRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record.token_id.as_ref())
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn unmatched_keys(records: &[TransferRecord], resolved: &ResolvedReputation) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| resolved.map.key_for(record))
        .filter(|key| !resolved.map.contains_key(key))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
