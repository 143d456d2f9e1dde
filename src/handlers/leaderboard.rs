use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use crate::error::AppResult;
use crate::params::{LeaderboardParams, LeaderboardQuery};
use crate::services::leaderboard::{LeaderboardResponse, ReputationSource};
use crate::AppState;

/// Senders ranked by the owner-side reputation of the NFTs they sent
pub async fn get_nft_reputation(
    State(state): State<AppState>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> AppResult<Json<LeaderboardResponse>> {
    let Query(query) = query?;
    let params = LeaderboardParams::resolve(query, &state.config)?;

    let response = state
        .leaderboard_service
        .build(&params, ReputationSource::OwnerTokens)
        .await?;

    Ok(Json(response))
}

/// Senders ranked by catalogue reputation matched on NFT title
pub async fn get_nft_title_reputation(
    State(state): State<AppState>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> AppResult<Json<LeaderboardResponse>> {
    let Query(query) = query?;
    let params = LeaderboardParams::resolve(query, &state.config)?;

    let response = state
        .leaderboard_service
        .build(&params, ReputationSource::TitleCatalogue)
        .await?;

    Ok(Json(response))
}
