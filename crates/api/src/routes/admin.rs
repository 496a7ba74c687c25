//! Platform admin routes
//!
//! Tier catalog management and system health checks. Authentication and
//! admin-role enforcement live in the fronting gateway, outside this service.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use portal_loyalty::{
    InvariantCheckSummary, InvariantChecker, NewTier, SubscriptionTier, TierUpdate,
};

use crate::error::ApiResult;
use crate::state::AppState;

/// `POST /admin/tiers`
pub async fn create_tier(
    State(state): State<AppState>,
    Json(new_tier): Json<NewTier>,
) -> ApiResult<(StatusCode, Json<SubscriptionTier>)> {
    let tier = state.loyalty.tiers.create(new_tier).await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

/// `PUT /admin/tiers/{id}`
pub async fn update_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<Uuid>,
    Json(update): Json<TierUpdate>,
) -> ApiResult<Json<SubscriptionTier>> {
    let tier = state.loyalty.tiers.update(tier_id, update).await?;
    Ok(Json(tier))
}

/// `DELETE /admin/tiers/{id}`
pub async fn delete_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.loyalty.tiers.delete(tier_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /admin/invariants` - run the read-only consistency checks.
pub async fn run_invariants(
    State(state): State<AppState>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    let summary = InvariantChecker::new(state.pool.clone())
        .run_all_checks()
        .await?;
    Ok(Json(summary))
}
