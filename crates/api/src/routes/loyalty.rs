//! Loyalty ledger routes

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use portal_loyalty::{BalanceSummary, LedgerEntry};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

/// `GET /loyalty?user_id=` - current totals; zeros for users without an
/// account yet.
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<BalanceSummary>> {
    let summary = state.loyalty.ledger.balance(query.user_id).await?;
    Ok(Json(summary))
}

/// `GET /loyalty/history?user_id=` - credit/debit history, newest first.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<LedgerEntry>>> {
    let entries = state.loyalty.ledger.history(query.user_id).await?;
    Ok(Json(entries))
}

/// Body for `POST /loyalty/redeem`.
///
/// Two redemption shapes share this endpoint: a balance redemption
/// (`points`, or neither field to redeem the entire balance) and a tier
/// redemption (`tier_id`, optionally acknowledging an override).
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub user_id: Uuid,
    pub points: Option<i64>,
    pub tier_id: Option<Uuid>,
    #[serde(default)]
    pub acknowledge_override: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RedeemResponse {
    Tier(portal_loyalty::RedemptionOutcome),
    Balance {
        points_used: i64,
        balance: BalanceSummary,
    },
}

/// `POST /loyalty/redeem`
pub async fn redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> ApiResult<Json<RedeemResponse>> {
    if request.tier_id.is_some() && request.points.is_some() {
        return Err(ApiError::BadRequest(
            "specify either tier_id or points, not both".to_string(),
        ));
    }

    if let Some(tier_id) = request.tier_id {
        let outcome = state
            .loyalty
            .subscriptions
            .redeem_for_tier(request.user_id, tier_id, request.acknowledge_override)
            .await?;
        return Ok(Json(RedeemResponse::Tier(outcome)));
    }

    // Balance redemption; no explicit amount means "redeem everything".
    let points = match request.points {
        Some(points) => points,
        None => {
            state
                .loyalty
                .ledger
                .balance(request.user_id)
                .await?
                .balance
        }
    };
    let balance = state
        .loyalty
        .ledger
        .redeem_balance(request.user_id, points)
        .await?;
    Ok(Json(RedeemResponse::Balance {
        points_used: points,
        balance,
    }))
}
