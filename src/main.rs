use std::sync::Arc;

use ipd_chat::{AppState, app, chat::registry::RoomRegistry, chat::store, config::Config};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    if config.chat_access_key.is_none() {
        tracing::warn!("CHAT_ACCESS_KEY is not set; protected routes will answer 500");
    }

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;
    store::init_schema(&db_pool).await?;

    let state = AppState {
        db_pool,
        registry: RoomRegistry::new(),
        config: config.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "ipd-chat listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
