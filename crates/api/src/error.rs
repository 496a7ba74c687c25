//! API error responses
//!
//! Every engine failure maps to a specific HTTP status and a JSON body of the
//! form `{"error": <message>, "code": <machine code>, "details": {...}}` so
//! the frontend can render an actionable message ("need 140 more points")
//! instead of a generic failure string.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use portal_loyalty::LoyaltyError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),

    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            ApiError::Loyalty(err) => match err {
                LoyaltyError::InvalidAmount(amount) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "invalid_amount",
                    err.to_string(),
                    json!({ "amount": amount }),
                ),
                LoyaltyError::InsufficientPoints {
                    required,
                    balance,
                    shortfall,
                } => (
                    StatusCode::CONFLICT,
                    "insufficient_points",
                    format!("need {shortfall} more points"),
                    json!({
                        "required": required,
                        "balance": balance,
                        "shortfall": shortfall,
                    }),
                ),
                LoyaltyError::OverrideNotAcknowledged {
                    tier_name,
                    remaining,
                } => (
                    StatusCode::CONFLICT,
                    "override_not_acknowledged",
                    format!(
                        "your active plan '{tier_name}' still has time remaining; \
                         confirm to replace it and forfeit the remainder"
                    ),
                    json!({
                        "tier_name": tier_name,
                        "remaining_seconds": remaining.whole_seconds(),
                    }),
                ),
                LoyaltyError::TierNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "tier_not_found",
                    err.to_string(),
                    json!({ "tier_id": id }),
                ),
                LoyaltyError::TierInUse(id) => (
                    StatusCode::CONFLICT,
                    "tier_in_use",
                    err.to_string(),
                    json!({ "tier_id": id }),
                ),
                LoyaltyError::ConcurrentModification => (
                    StatusCode::CONFLICT,
                    "concurrent_modification",
                    err.to_string(),
                    json!({ "retryable": true }),
                ),
                LoyaltyError::Backend(e) => {
                    tracing::error!(error = %e, "Backend failure");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "backend_unavailable",
                        "backend unavailable, please try again".to_string(),
                        Value::Null,
                    )
                }
            },
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                message.clone(),
                Value::Null,
            ),
        };

        let body = json!({
            "error": message,
            "code": code,
            "details": details,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use time::Duration;

    #[test]
    fn test_insufficient_points_maps_to_conflict() {
        let err = ApiError::from(LoyaltyError::InsufficientPoints {
            required: 700,
            balance: 560,
            shortfall: 140,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_override_guard_maps_to_conflict() {
        let err = ApiError::from(LoyaltyError::OverrideNotAcknowledged {
            tier_name: "3 Hour Plan".to_string(),
            remaining: Duration::hours(2),
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_invalid_amount_maps_to_unprocessable() {
        let err = ApiError::from(LoyaltyError::InvalidAmount(0));
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_tier_not_found_maps_to_not_found() {
        let err = ApiError::from(LoyaltyError::TierNotFound(uuid::Uuid::new_v4()));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
