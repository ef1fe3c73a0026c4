//! HTTP router and handlers.

use crate::app::AppState;
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

pub mod address;
pub mod events;
pub mod inbox;
pub mod message;

/// Assemble the HTTP router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/address", get(address::new_address))
        .route("/api/inbox/:id", get(inbox::list_inbox))
        .route("/api/message/:id", get(message::get_message))
        .route("/api/events", get(events::subscribe))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
