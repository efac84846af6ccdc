//! Request Handlers

use super::{errors::ApiError, middleware::RequestId, models::*, websocket::WebSocketManager};
use crate::bets::{BetReceipt, BetRequest, BetService};
use crate::clock::Clock;
use crate::metrics::KenoMetrics;
use crate::stats::{StatsLedger, StatsSnapshot};
use crate::store::KenoStore;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn KenoStore>,
    pub bets: BetService,
    pub ledger: StatsLedger,
    pub clock: Arc<dyn Clock>,
    pub websocket: Arc<WebSocketManager>,
    pub metrics: Arc<KenoMetrics>,
    pub history_len: usize,
    pub version: String,
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        uptime_secs: state.metrics.uptime().as_secs(),
    })
}

/// GET /round
pub async fn round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RoundResponse>, ApiError> {
    let round = state
        .store
        .load_round()
        .await
        .map_err(|e| ApiError::from_keno(request_id.0.clone(), e))?
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), "No round has started yet".to_string()))?;
    Ok(Json(RoundResponse::from_round(&round, state.clock.now_ms())))
}

/// GET /history?limit={n}
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(state.history_len).min(state.history_len);
    let rounds = state
        .store
        .recent_history(limit)
        .await
        .map_err(|e| ApiError::from_keno(request_id.0, e))?
        .into_iter()
        .map(HistoryItem::from)
        .collect();
    Ok(Json(HistoryResponse { rounds }))
}

/// GET /stats
pub async fn stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsSnapshot>, ApiError> {
    state
        .ledger
        .snapshot()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_keno(request_id.0, e))
}

/// POST /bets
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<BetRequest>,
) -> Result<(StatusCode, Json<BetReceipt>), ApiError> {
    state
        .bets
        .place_bet(request)
        .await
        .map(|receipt| (StatusCode::CREATED, Json(receipt)))
        .map_err(|e| ApiError::from_keno(request_id.0, e))
}

/// GET /accounts/:user_id
pub async fn account_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let balance = state
        .bets
        .balance(&user_id)
        .await
        .map_err(|e| ApiError::from_keno(request_id.0, e))?;
    Ok(Json(AccountResponse { user_id, balance }))
}

/// POST /accounts/:user_id/deposit
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<DepositRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let balance = state
        .bets
        .deposit(&user_id, request.amount)
        .await
        .map_err(|e| ApiError::from_keno(request_id.0, e))?;
    Ok(Json(AccountResponse { user_id, balance }))
}

/// GET /settlement/unsettled
pub async fn unsettled_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UnsettledResponse>, ApiError> {
    let rounds = state
        .store
        .unsettled_rounds()
        .await
        .map_err(|e| ApiError::from_keno(request_id.0, e))?
        .into_iter()
        .map(UnsettledItem::from)
        .collect();
    Ok(Json(UnsettledResponse { rounds }))
}

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::internal_error(request_id.0, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}
