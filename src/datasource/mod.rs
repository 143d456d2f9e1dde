pub mod tbot;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    Nft,
    Ft { symbol: String },
}

/// One page of incoming transfers for a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPageRequest {
    pub kind: AssetKind,
    pub wallet_id: String,
    pub limit: u32,
    pub skip: u64,
}

impl TransferPageRequest {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("wallet_id", self.wallet_id.clone()),
            ("direction", "in".to_string()),
            ("limit", self.limit.to_string()),
            ("skip", self.skip.to_string()),
        ];
        if let AssetKind::Ft { symbol } = &self.kind {
            params.push(("symbol", symbol.clone()));
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReputationRequest {
    /// Global catalogue of `{title, reputation}` records
    Catalogue,
    /// Every reputation record held by one owner
    Owner { owner: String },
    /// A single token of one owner
    Token { owner: String, token_id: String },
}

impl ReputationRequest {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            ReputationRequest::Catalogue => Vec::new(),
            ReputationRequest::Owner { owner } => vec![("owner", owner.clone())],
            ReputationRequest::Token { owner, token_id } => {
                vec![("owner", owner.clone()), ("token_id", token_id.clone())]
            }
        }
    }
}

/// Trait for the upstream transfer history and reputation endpoints
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Get one raw page of transfer history
    async fn get_transfers(&self, request: &TransferPageRequest) -> AppResult<Value>;

    /// Get a raw reputation payload
    async fn get_reputation(&self, request: &ReputationRequest) -> AppResult<Value>;
}
