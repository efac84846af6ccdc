//! Route Definitions

use super::{handlers::*, websocket::websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Round state and results
        .route("/round", get(round_handler))
        .route("/history", get(history_handler))
        .route("/stats", get(stats_handler))
        // Betting and accounts
        .route("/bets", post(place_bet_handler))
        .route("/accounts/:user_id", get(account_handler))
        .route("/accounts/:user_id/deposit", post(deposit_handler))
        .route("/settlement/unsettled", get(unsettled_handler))
        // Live events
        .route("/ws", get(websocket_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
