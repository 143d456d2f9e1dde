use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::config::Config;
use crate::datasource::{AssetKind, DataSource, ReputationRequest, TransferPageRequest};
use crate::error::{AppError, AppResult};

/// HTTP client for the dialog-tbot history and reputation API
#[derive(Clone)]
pub struct TbotClient {
    client: Client,
    nft_transfers_url: String,
    ft_transfers_url: String,
    reputation_url: String,
}

impl TbotClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            nft_transfers_url: config.nft_transfers_url.clone(),
            ft_transfers_url: config.ft_transfers_url.clone(),
            reputation_url: config.reputation_url.clone(),
        }
    }

    async fn get(&self, base_url: &str, params: &[(&str, String)]) -> AppResult<Value> {
        let parsed = if params.is_empty() {
            Url::parse(base_url)
        } else {
            Url::parse_with_params(base_url, params)
        };
        let url = parsed.map_err(|e| {
            AppError::InternalError(format!("Invalid upstream URL {}: {}", base_url, e))
        })?;

        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response.json().await?;
        Ok(result)
    }
}

#[async_trait]
impl DataSource for TbotClient {
    async fn get_transfers(&self, request: &TransferPageRequest) -> AppResult<Value> {
        let base_url = match request.kind {
            AssetKind::Nft => &self.nft_transfers_url,
            AssetKind::Ft { .. } => &self.ft_transfers_url,
        };
        self.get(base_url, &request.query_params()).await
    }

    async fn get_reputation(&self, request: &ReputationRequest) -> AppResult<Value> {
        self.get(&self.reputation_url, &request.query_params()).await
    }
}
