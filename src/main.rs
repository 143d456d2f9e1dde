use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tbot_leaderboard::config::Config;
use tbot_leaderboard::datasource::tbot::TbotClient;
use tbot_leaderboard::datasource::DataSource;
use tbot_leaderboard::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tbot_leaderboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let datasource: Arc<dyn DataSource> = Arc::new(TbotClient::new(&config));
    let addr = config.bind_addr();
    let app = router(AppState::new(datasource, config));

    tracing::info!("Starting leaderboard API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
