//! Subscription routes

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use portal_loyalty::{PurchaseOutcome, Subscription};

use crate::error::ApiResult;
use crate::routes::loyalty::UserQuery;
use crate::state::AppState;

/// Body for `POST /subscriptions` (cash purchase of a tier).
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub user_id: Uuid,
    pub tier_id: Uuid,
    /// Must be true to replace an active plan with remaining time.
    #[serde(default)]
    pub acknowledge_override: bool,
}

/// `POST /subscriptions`
pub async fn purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> ApiResult<Json<PurchaseOutcome>> {
    let outcome = state
        .loyalty
        .subscriptions
        .purchase_tier(request.user_id, request.tier_id, request.acknowledge_override)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    /// The currently live subscription, if any.
    pub active: Option<Subscription>,
    /// Full history, newest first.
    pub history: Vec<Subscription>,
}

/// `GET /subscriptions?user_id=`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<SubscriptionListResponse>> {
    let active = state
        .loyalty
        .subscriptions
        .active_subscription(query.user_id)
        .await?;
    let history = state
        .loyalty
        .subscriptions
        .list_subscriptions(query.user_id)
        .await?;
    Ok(Json(SubscriptionListResponse { active, history }))
}
