use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod datasource;
pub mod error;
pub mod handlers;
pub mod params;
pub mod services;

use config::Config;
use datasource::DataSource;
use services::leaderboard::LeaderboardService;
use services::transfers::TransferFetcher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub leaderboard_service: Arc<LeaderboardService>,
    pub transfer_fetcher: Arc<TransferFetcher>,
}

impl AppState {
    pub fn new(datasource: Arc<dyn DataSource>, config: Config) -> Self {
        let leaderboard_service = Arc::new(LeaderboardService::new(Arc::clone(&datasource), &config));
        let transfer_fetcher = Arc::new(TransferFetcher::new(datasource, config.max_pages));

        Self {
            config: Arc::new(config),
            leaderboard_service,
            transfer_fetcher,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/nft-reputation", get(handlers::leaderboard::get_nft_reputation))
        .route(
            "/api/nft-title-reputation",
            get(handlers::leaderboard::get_nft_title_reputation),
        )
        .route("/api/ft-transfers", get(handlers::transfers::get_ft_transfers))
        .route("/api/grecha", get(handlers::transfers::get_grecha))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
