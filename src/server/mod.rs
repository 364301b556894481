//! HTTP surface: router composition and application state.

pub mod handlers;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::chat::{StreamRegistry, TurnDeps};
use crate::provider::ModelRouter;
use crate::store::ConversationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: ConversationStore,
    /// Dedicated pool for the read-only query tool
    pub tool_db: Option<SqlitePool>,
    pub router: Arc<ModelRouter>,
    pub registry: Option<Arc<StreamRegistry>>,
}

impl AppState {
    pub fn turn_deps(&self) -> TurnDeps {
        TurnDeps {
            store: self.store.clone(),
            tool_db: self.tool_db.clone(),
            router: Arc::clone(&self.router),
            registry: self.registry.clone(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::submit_turn))
        .route("/api/chat", delete(handlers::delete_chat))
        .route("/api/chat/{id}/stream", get(handlers::resume_stream))
        .route("/api/chat/{id}/messages", get(handlers::get_messages))
        .route("/api/chat/{id}/visibility", patch(handlers::update_visibility))
        .route("/api/vote", get(handlers::get_votes))
        .route("/api/vote", patch(handlers::patch_vote))
        .route("/api/message", delete(handlers::delete_trailing))
        .route("/api/status", get(handlers::status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
