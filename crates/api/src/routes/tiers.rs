//! Tier catalog routes

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use portal_shared::TierType;

use portal_loyalty::SubscriptionTier;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TierListQuery {
    /// Optional filter: `hotspot` or `home_internet`.
    #[serde(rename = "type")]
    pub tier_type: Option<TierType>,
}

/// `GET /tiers?type=`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TierListQuery>,
) -> ApiResult<Json<Vec<SubscriptionTier>>> {
    let tiers = state.loyalty.tiers.list(query.tier_type).await?;
    Ok(Json(tiers))
}
