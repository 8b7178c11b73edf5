pub mod chat;
pub mod config;
pub mod error;
pub mod gate;

use std::sync::Arc;

use axum::{Router, extract::FromRef, middleware, routing::get};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use chat::registry::RoomRegistry;
use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: RoomRegistry,
    pub config: Arc<Config>,
}

/// Assembles the full application router: REST surface, socket hub, and
/// the access gate in front of both.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/chat", chat::router())
        .nest("/hubs", chat::hub_router())
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            gate::gate,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
