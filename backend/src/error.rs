use axum::body::Body;
use axum::http::StatusCode;
use serde_json::json;
use time::OffsetDateTime;

use shared::constants::{COOLDOWN_ERROR, MISSING_USER_ID_ERROR, STORAGE_ERROR};

use crate::models::rfc3339;

#[derive(Debug)]
pub enum RouletteError {
    /// Invalid prize table. Fatal at startup; never produced at request
    /// time once the service is running.
    Configuration(String),
    MissingUserId,
    /// The daily window has not elapsed. Expected game flow, not a
    /// failure; carries everything the client needs for its countdown.
    CooldownActive {
        next_spin_time: OffsetDateTime,
        hours_remaining: i64,
    },
    /// Durable storage failed. The spin was not credited.
    StorageUnavailable,
}

impl std::fmt::Display for RouletteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(detail) => write!(f, "invalid prize table: {}", detail),
            Self::MissingUserId => write!(f, "{}", MISSING_USER_ID_ERROR),
            Self::CooldownActive { hours_remaining, .. } => {
                write!(f, "cooldown active, {}h remaining", hours_remaining)
            }
            Self::StorageUnavailable => write!(f, "storage unavailable"),
        }
    }
}

impl std::error::Error for RouletteError {}

impl axum::response::IntoResponse for RouletteError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            RouletteError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "configuration" }),
            ),
            RouletteError::MissingUserId => (
                StatusCode::BAD_REQUEST,
                json!({ "error": MISSING_USER_ID_ERROR }),
            ),
            RouletteError::CooldownActive { next_spin_time, hours_remaining } => (
                StatusCode::OK,
                json!({
                    "success": false,
                    "error": COOLDOWN_ERROR,
                    "next_spin_time": rfc3339(next_spin_time),
                    "hours_remaining": hours_remaining,
                }),
            ),
            RouletteError::StorageUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": STORAGE_ERROR }),
            ),
        };

        axum::response::Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}
