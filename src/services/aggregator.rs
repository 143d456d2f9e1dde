use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::services::reputation::ReputationMap;
use crate::services::transfers::TransferRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenContribution {
    pub title: String,
    pub rep: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub wallet: String,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<TokenContribution>>,
}

struct SenderTotals {
    entry: LeaderboardEntry,
    seen_keys: HashSet<String>,
}

pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Sums reputation per sender and sorts by total, highest first. Senders
    /// are kept in first-seen order before a stable sort, so ties keep it.
    pub fn build(
        &self,
        transfers: &[TransferRecord],
        reputation: &ReputationMap,
        with_tokens: bool,
    ) -> Vec<LeaderboardEntry> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut senders: Vec<SenderTotals> = Vec::new();

        for transfer in transfers {
            let slot = *index.entry(transfer.sender_id.as_str()).or_insert_with(|| {
                senders.push(SenderTotals {
                    entry: LeaderboardEntry {
                        wallet: transfer.sender_id.clone(),
                        total: 0.0,
                        tokens: with_tokens.then(Vec::new),
                    },
                    seen_keys: HashSet::new(),
                });
                senders.len() - 1
            });
            let sender = &mut senders[slot];

            let rep = reputation.reputation_of(transfer);
            sender.entry.total += rep;

            if rep > 0.0 {
                if let Some(tokens) = sender.entry.tokens.as_mut() {
                    let title = transfer
                        .title
                        .clone()
                        .or_else(|| transfer.token_id.clone())
                        .unwrap_or_default();
                    let key = reputation.key_for(transfer).unwrap_or_else(|| title.clone());
                    if sender.seen_keys.insert(key) {
                        tokens.push(TokenContribution { title, rep });
                    }
                }
            }
        }

        let mut leaderboard: Vec<LeaderboardEntry> =
            senders.into_iter().map(|sender| sender.entry).collect();

        // sort_by is stable
        leaderboard.sort_by(|a, b| b.total.total_cmp(&a.total));

        leaderboard
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
