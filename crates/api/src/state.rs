//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use portal_loyalty::LoyaltyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub loyalty: Arc<LoyaltyService>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let loyalty = Arc::new(LoyaltyService::postgres(pool.clone()));
        Self { pool, loyalty }
    }
}
