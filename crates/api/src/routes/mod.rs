//! HTTP routes

pub mod admin;
pub mod loyalty;
pub mod subscriptions;
pub mod tiers;

use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Loyalty ledger
        .route("/loyalty", get(loyalty::get_balance))
        .route("/loyalty/history", get(loyalty::get_history))
        .route("/loyalty/redeem", post(loyalty::redeem))
        // Subscriptions
        .route(
            "/subscriptions",
            get(subscriptions::list).post(subscriptions::purchase),
        )
        // Tier catalog
        .route("/tiers", get(tiers::list))
        // Admin (authentication delegated to the fronting gateway)
        .route("/admin/tiers", post(admin::create_tier))
        .route(
            "/admin/tiers/{id}",
            put(admin::update_tier).delete(admin::delete_tier),
        )
        .route("/admin/invariants", get(admin::run_invariants))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
