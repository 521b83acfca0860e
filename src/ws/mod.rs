//! WebSocket layer: operator event feed.
//!
//! The endpoint at `/ws/operator` streams booking and payment domain
//! events, filtered per connection by provider.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;

/// Operator feed route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws/operator", get(handler::ws_handler))
}
