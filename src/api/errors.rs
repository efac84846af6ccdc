//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.

use crate::errors::{BetError, KenoError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (ROUND_CLOSED, INSUFFICIENT_FUNDS, NOT_FOUND, ...)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest { code: &'static str, message: String },
    Conflict { code: &'static str, message: String, details: Option<serde_json::Value> },
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest {
                code: "BAD_REQUEST",
                message,
            },
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Map an engine error to a response. Bet rejections keep their own code
    /// so clients can act on the reason.
    pub fn from_keno(request_id: String, err: KenoError) -> Self {
        let kind = match err {
            KenoError::Bet(reason) => bet_rejection(reason),
            e if e.is_transient() => ApiErrorKind::ServiceUnavailable(e.to_string()),
            e => ApiErrorKind::InternalError(e.to_string()),
        };
        Self { kind, request_id }
    }
}

fn bet_rejection(reason: BetError) -> ApiErrorKind {
    let code = reason.code();
    let message = reason.to_string();
    match reason {
        BetError::InsufficientFunds { balance, stake } => ApiErrorKind::Conflict {
            code,
            message,
            details: Some(serde_json::json!({ "balance": balance, "stake": stake })),
        },
        BetError::RoundClosed { round_id } => ApiErrorKind::Conflict {
            code,
            message,
            details: Some(serde_json::json!({ "round_id": round_id })),
        },
        BetError::NoActiveRound => ApiErrorKind::Conflict {
            code,
            message,
            details: None,
        },
        BetError::InvalidNumbers(_) | BetError::InvalidStake { .. } | BetError::InvalidUser => {
            ApiErrorKind::BadRequest { code, message }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest { message, .. } => write!(f, "[{}] Bad Request: {}", self.request_id, message),
            ApiErrorKind::Conflict { message, .. } => write!(f, "[{}] Conflict: {}", self.request_id, message),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::ServiceUnavailable(msg) => write!(f, "[{}] Service Unavailable: {}", self.request_id, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiErrorKind::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message, None),
            ApiErrorKind::Conflict { code, message, details } => (StatusCode::CONFLICT, code, message, details),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg, None)
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}
