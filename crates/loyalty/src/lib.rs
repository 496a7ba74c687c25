// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Portal Loyalty Module
//!
//! The loyalty & redemption engine for the portal: tracks points earned from
//! subscription purchases, authorizes balance and tier redemptions, and keeps
//! each user's balance consistent under concurrent operations.
//!
//! ## Features
//!
//! - **Points Ledger**: Append-only credits and debits with a per-user balance
//! - **Tier Redemption**: Spend points on a subscription tier at the redeem rate
//! - **Override Guard**: No silent replacement of a plan with remaining time
//! - **Tier Catalog**: Hotspot and home internet plans with admin CRUD
//! - **Invariant Checks**: Runnable consistency checks over the whole system
//!
//! Persistence is a swappable port: Postgres in production, in-memory for
//! tests. All balance mutations are optimistic compare-and-swap with a
//! bounded retry budget, so operations for one user serialize while different
//! users never contend.

pub mod error;
pub mod invariants;
pub mod ledger;
pub mod memory;
pub mod pg;
pub mod rates;
pub mod store;
pub mod subscriptions;
pub mod tiers;

#[cfg(test)]
mod edge_case_tests;

// Error
pub use error::{LoyaltyError, LoyaltyResult};

// Ledger
pub use ledger::{
    BalanceSummary, LedgerEntry, LedgerEntryKind, LedgerService, LoyaltyAccount, NewLedgerEntry,
};

// Subscriptions
pub use subscriptions::{PurchaseOutcome, RedemptionOutcome, Subscription, SubscriptionService};

// Tiers
pub use tiers::{NewTier, SubscriptionTier, TierService, TierUpdate};

// Stores
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{PortalStore, MAX_CAS_RETRIES};

// Rates
pub use rates::{earned_points, required_points, EARN_RATE, REDEEM_RATE};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

use std::sync::Arc;

use sqlx::PgPool;

/// Main loyalty service that combines all engine functionality
#[derive(Clone)]
pub struct LoyaltyService {
    pub ledger: LedgerService,
    pub subscriptions: SubscriptionService,
    pub tiers: TierService,
}

impl LoyaltyService {
    /// Create the engine on top of any storage implementation.
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self {
            ledger: LedgerService::new(store.clone()),
            subscriptions: SubscriptionService::new(store.clone()),
            tiers: TierService::new(store),
        }
    }

    /// Production wiring: Postgres-backed store.
    pub fn postgres(pool: PgPool) -> Self {
        Self::new(Arc::new(PgStore::new(pool)))
    }

    /// In-memory wiring for tests and demos.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}
