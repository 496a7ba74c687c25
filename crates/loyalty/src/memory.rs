//! In-memory implementation of the storage port
//!
//! Used by the engine's tests and available for demos. Implements the same
//! CAS contract as the Postgres store so concurrency behavior is faithful:
//! a commit only lands when the caller's expected version matches.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use portal_shared::{SubscriptionStatus, TierType};

use crate::error::{LoyaltyError, LoyaltyResult};
use crate::ledger::{LedgerEntry, LoyaltyAccount, NewLedgerEntry};
use crate::store::PortalStore;
use crate::subscriptions::Subscription;
use crate::tiers::SubscriptionTier;

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, LoyaltyAccount>,
    tiers: HashMap<Uuid, SubscriptionTier>,
    subscriptions: Vec<Subscription>,
    ledger: Vec<LedgerEntry>,
}

impl Inner {
    fn current_version(&self, user_id: Uuid) -> i64 {
        self.accounts.get(&user_id).map(|a| a.version).unwrap_or(0)
    }

    fn push_entry(&mut self, entry: &NewLedgerEntry) {
        self.ledger.push(LedgerEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            kind: entry.kind,
            points: entry.points,
            tier_id: entry.tier_id,
            note: entry.note.clone(),
            created_at: OffsetDateTime::now_utc(),
        });
    }

    fn store_account(&mut self, account: &LoyaltyAccount, expected_version: i64) {
        let mut stored = account.clone();
        stored.version = expected_version + 1;
        self.accounts.insert(account.user_id, stored);
    }
}

/// Mutex-guarded maps with Postgres-equivalent commit semantics.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortalStore for MemoryStore {
    async fn load_account(&self, user_id: Uuid) -> LoyaltyResult<Option<LoyaltyAccount>> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(&user_id).cloned())
    }

    async fn commit_account(
        &self,
        account: &LoyaltyAccount,
        expected_version: i64,
        entry: &NewLedgerEntry,
    ) -> LoyaltyResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.current_version(account.user_id) != expected_version {
            return Ok(false);
        }
        inner.store_account(account, expected_version);
        inner.push_entry(entry);
        Ok(true)
    }

    async fn commit_subscription_change(
        &self,
        account: &LoyaltyAccount,
        expected_version: i64,
        entry: Option<&NewLedgerEntry>,
        subscription: &Subscription,
    ) -> LoyaltyResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.current_version(account.user_id) != expected_version {
            return Ok(false);
        }
        inner.store_account(account, expected_version);
        if let Some(entry) = entry {
            inner.push_entry(entry);
        }
        for existing in inner
            .subscriptions
            .iter_mut()
            .filter(|s| s.user_id == subscription.user_id)
        {
            existing.status = SubscriptionStatus::Expired;
        }
        inner.subscriptions.push(subscription.clone());
        Ok(true)
    }

    async fn ledger_entries(&self, user_id: Uuid) -> LoyaltyResult<Vec<LedgerEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<LedgerEntry> = inner
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn tier(&self, tier_id: Uuid) -> LoyaltyResult<Option<SubscriptionTier>> {
        let inner = self.inner.lock().await;
        Ok(inner.tiers.get(&tier_id).cloned())
    }

    async fn list_tiers(
        &self,
        tier_type: Option<TierType>,
    ) -> LoyaltyResult<Vec<SubscriptionTier>> {
        let inner = self.inner.lock().await;
        let mut tiers: Vec<SubscriptionTier> = inner
            .tiers
            .values()
            .filter(|t| tier_type.map_or(true, |ty| t.tier_type == ty))
            .cloned()
            .collect();
        tiers.sort_by_key(|t| t.price_cents);
        Ok(tiers)
    }

    async fn insert_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()> {
        let mut inner = self.inner.lock().await;
        inner.tiers.insert(tier.id, tier.clone());
        Ok(())
    }

    async fn update_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.tiers.contains_key(&tier.id) {
            return Err(LoyaltyError::TierNotFound(tier.id));
        }
        inner.tiers.insert(tier.id, tier.clone());
        Ok(())
    }

    async fn delete_tier(&self, tier_id: Uuid) -> LoyaltyResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.tiers.contains_key(&tier_id) {
            return Err(LoyaltyError::TierNotFound(tier_id));
        }
        if inner.subscriptions.iter().any(|s| s.tier_id == tier_id) {
            return Err(LoyaltyError::TierInUse(tier_id));
        }
        inner.tiers.remove(&tier_id);
        Ok(())
    }

    async fn active_subscription(&self, user_id: Uuid) -> LoyaltyResult<Option<Subscription>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.status == SubscriptionStatus::Active)
            .cloned())
    }

    async fn list_subscriptions(&self, user_id: Uuid) -> LoyaltyResult<Vec<Subscription>> {
        let inner = self.inner.lock().await;
        let mut subs: Vec<Subscription> = inner
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }
}
