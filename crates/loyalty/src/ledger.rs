//! Loyalty points ledger
//!
//! Maintains one account per user with append-only credit/debit semantics.
//! Every mutation is a bounded read-modify-write guarded by an optimistic
//! version check; see [`crate::store::PortalStore`] for the commit contract.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{LoyaltyError, LoyaltyResult};
use crate::rates;
use crate::store::{PortalStore, MAX_CAS_RETRIES};

/// A user's loyalty account.
///
/// `balance` is maintained equal to `points_earned - points_redeemed` on every
/// write; the invariant checker verifies the identity independently.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoyaltyAccount {
    pub user_id: Uuid,
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub balance: i64,
    /// Optimistic lock version. Zero means the account has not been persisted
    /// yet (accounts are created lazily on first credit).
    pub version: i64,
    pub last_updated: OffsetDateTime,
}

impl LoyaltyAccount {
    /// An unpersisted account with zero totals.
    pub fn fresh(user_id: Uuid) -> Self {
        Self {
            user_id,
            points_earned: 0,
            points_redeemed: 0,
            balance: 0,
            version: 0,
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    fn recompute_balance(&mut self) {
        self.balance = self.points_earned - self.points_redeemed;
    }
}

/// Snapshot of an account's totals, as returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub balance: i64,
}

impl BalanceSummary {
    /// All-zero summary for users without an account yet.
    pub fn zero() -> Self {
        Self {
            points_earned: 0,
            points_redeemed: 0,
            balance: 0,
        }
    }
}

impl From<&LoyaltyAccount> for BalanceSummary {
    fn from(account: &LoyaltyAccount) -> Self {
        Self {
            points_earned: account.points_earned,
            points_redeemed: account.points_redeemed,
            balance: account.balance,
        }
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ledger_entry_kind", rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Credit,
    Debit,
}

/// Persisted ledger row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: LedgerEntryKind,
    pub points: i64,
    pub tier_id: Option<Uuid>,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Ledger entry to be written in the same transaction as its account update.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub kind: LedgerEntryKind,
    pub points: i64,
    pub tier_id: Option<Uuid>,
    pub note: Option<String>,
}

/// Service for crediting, querying, and debiting loyalty points.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn PortalStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self { store }
    }

    /// Credit points for a settled purchase amount.
    ///
    /// Creates the account lazily on first credit. Fails with `InvalidAmount`
    /// for non-positive amounts; never fails on a missing account.
    pub async fn credit_points(
        &self,
        user_id: Uuid,
        amount_cents: i64,
    ) -> LoyaltyResult<BalanceSummary> {
        if amount_cents <= 0 {
            return Err(LoyaltyError::InvalidAmount(amount_cents));
        }
        let points = rates::earned_points(amount_cents);
        if points == 0 {
            // Sub-threshold amount earns nothing; report the unchanged balance
            // rather than writing an empty ledger entry.
            return self.balance(user_id).await;
        }

        self.apply(user_id, LedgerEntryKind::Credit, points, None, |account| {
            account.points_earned += points;
            Ok(())
        })
        .await
    }

    /// Current totals for a user. Returns zeros when no account exists.
    pub async fn balance(&self, user_id: Uuid) -> LoyaltyResult<BalanceSummary> {
        let account = self.store.load_account(user_id).await?;
        Ok(account
            .as_ref()
            .map(BalanceSummary::from)
            .unwrap_or_else(BalanceSummary::zero))
    }

    /// Debit an explicit number of points from the balance.
    ///
    /// Callers redeeming "everything" pass the current balance. Fails with
    /// `InsufficientPoints` (carrying the shortfall) when the balance cannot
    /// cover the request.
    pub async fn redeem_balance(
        &self,
        user_id: Uuid,
        points: i64,
    ) -> LoyaltyResult<BalanceSummary> {
        if points <= 0 {
            return Err(LoyaltyError::InvalidAmount(points));
        }

        self.apply(user_id, LedgerEntryKind::Debit, points, None, |account| {
            if points > account.balance {
                return Err(LoyaltyError::InsufficientPoints {
                    required: points,
                    balance: account.balance,
                    shortfall: points - account.balance,
                });
            }
            account.points_redeemed += points;
            Ok(())
        })
        .await
    }

    /// Full credit/debit history for a user, newest first.
    pub async fn history(&self, user_id: Uuid) -> LoyaltyResult<Vec<LedgerEntry>> {
        self.store.ledger_entries(user_id).await
    }

    /// Read-modify-write with a bounded optimistic retry budget.
    async fn apply<F>(
        &self,
        user_id: Uuid,
        kind: LedgerEntryKind,
        points: i64,
        note: Option<String>,
        mutate: F,
    ) -> LoyaltyResult<BalanceSummary>
    where
        F: Fn(&mut LoyaltyAccount) -> LoyaltyResult<()>,
    {
        for attempt in 0..MAX_CAS_RETRIES {
            let mut account = self
                .store
                .load_account(user_id)
                .await?
                .unwrap_or_else(|| LoyaltyAccount::fresh(user_id));
            let expected_version = account.version;

            mutate(&mut account)?;
            account.recompute_balance();
            account.last_updated = OffsetDateTime::now_utc();

            let entry = NewLedgerEntry {
                user_id,
                kind,
                points,
                tier_id: None,
                note: note.clone(),
            };

            if self
                .store
                .commit_account(&account, expected_version, &entry)
                .await?
            {
                tracing::info!(
                    user_id = %user_id,
                    kind = ?kind,
                    points,
                    balance = account.balance,
                    "Ledger entry committed"
                );
                return Ok(BalanceSummary::from(&account));
            }

            tracing::debug!(
                user_id = %user_id,
                attempt,
                "Account version conflict, retrying"
            );
        }

        Err(LoyaltyError::ConcurrentModification)
    }
}
