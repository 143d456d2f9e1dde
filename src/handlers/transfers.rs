use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::datasource::{AssetKind, TransferPageRequest};
use crate::error::AppResult;
use crate::params::{parse_limit, parse_skip, require_wallet};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FtTransfersQuery {
    pub wallet_id: Option<String>,
    pub symbol: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

/// One page of fungible-token transfers, passed through as-is
pub async fn get_ft_transfers(
    State(state): State<AppState>,
    query: Result<Query<FtTransfersQuery>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let Query(query) = query?;
    let wallet_id = require_wallet(query.wallet_id)?;
    let symbol = query
        .symbol
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.config.ft_default_symbol.clone());

    let request = TransferPageRequest {
        kind: AssetKind::Ft { symbol },
        wallet_id,
        limit: parse_limit(query.limit.as_deref(), state.config.default_limit),
        skip: parse_skip(query.skip.as_deref(), state.config.default_skip),
    };

    let page = state.transfer_fetcher.fetch_page_raw(&request).await?;
    Ok(Json(page))
}

/// GRECHA transfers into the configured default wallet
pub async fn get_grecha(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let request = TransferPageRequest {
        kind: AssetKind::Ft {
            symbol: state.config.ft_default_symbol.clone(),
        },
        wallet_id: state.config.ft_default_wallet.clone(),
        limit: state.config.default_limit,
        skip: state.config.default_skip,
    };

    let page = state.transfer_fetcher.fetch_page_raw(&request).await?;
    Ok(Json(page))
}
