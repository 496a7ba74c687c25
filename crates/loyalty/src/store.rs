//! Storage port for the loyalty engine
//!
//! Persistence is a swappable concern behind [`PortalStore`]: Postgres in
//! production ([`crate::pg::PgStore`]), an in-memory implementation for tests
//! and demos ([`crate::memory::MemoryStore`]). Commit methods use optimistic
//! compare-and-swap on the account `version`; returning `false` signals a
//! conflict the service may retry.

use async_trait::async_trait;
use uuid::Uuid;

use portal_shared::TierType;

use crate::error::LoyaltyResult;
use crate::ledger::{LedgerEntry, LoyaltyAccount, NewLedgerEntry};
use crate::subscriptions::Subscription;
use crate::tiers::SubscriptionTier;

/// How many optimistic-lock conflicts a service absorbs before reporting
/// `ConcurrentModification` to the caller.
pub const MAX_CAS_RETRIES: u32 = 3;

/// Storage operations the loyalty engine needs.
///
/// The CAS contract for commits: `expected_version == 0` means "insert if
/// absent" (lazy account creation); any other value must match the stored
/// version exactly. On success the stored version becomes
/// `expected_version + 1`. A `false` return means the version check failed
/// and nothing was written.
#[async_trait]
pub trait PortalStore: Send + Sync {
    // --- Loyalty accounts & ledger ---

    async fn load_account(&self, user_id: Uuid) -> LoyaltyResult<Option<LoyaltyAccount>>;

    /// Write an account mutation and its ledger entry atomically, guarded by
    /// the version check.
    async fn commit_account(
        &self,
        account: &LoyaltyAccount,
        expected_version: i64,
        entry: &NewLedgerEntry,
    ) -> LoyaltyResult<bool>;

    /// Write an account mutation, an optional ledger entry, and a new active
    /// subscription atomically; any currently active subscription for the
    /// user is marked expired in the same transaction.
    async fn commit_subscription_change(
        &self,
        account: &LoyaltyAccount,
        expected_version: i64,
        entry: Option<&NewLedgerEntry>,
        subscription: &Subscription,
    ) -> LoyaltyResult<bool>;

    /// Ledger history for a user, newest first.
    async fn ledger_entries(&self, user_id: Uuid) -> LoyaltyResult<Vec<LedgerEntry>>;

    // --- Tier catalog ---

    async fn tier(&self, tier_id: Uuid) -> LoyaltyResult<Option<SubscriptionTier>>;

    async fn list_tiers(&self, tier_type: Option<TierType>)
        -> LoyaltyResult<Vec<SubscriptionTier>>;

    async fn insert_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()>;

    async fn update_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()>;

    /// Fails with `TierNotFound` for unknown ids and `TierInUse` when
    /// subscriptions reference the tier.
    async fn delete_tier(&self, tier_id: Uuid) -> LoyaltyResult<()>;

    // --- Subscriptions ---

    /// The row currently marked active for the user, if any. Callers decide
    /// liveness against the clock.
    async fn active_subscription(&self, user_id: Uuid) -> LoyaltyResult<Option<Subscription>>;

    /// All subscriptions for a user, newest first.
    async fn list_subscriptions(&self, user_id: Uuid) -> LoyaltyResult<Vec<Subscription>>;
}
