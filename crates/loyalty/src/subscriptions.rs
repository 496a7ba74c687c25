//! Subscription management
//!
//! All tier activations go through one authoritative path,
//! [`SubscriptionService::activate_tier`], whether the user pays cash or
//! redeems points. The path enforces the override guard (no silent loss of a
//! running plan), debits or credits the ledger, and supersedes the current
//! active subscription in a single atomic commit.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use portal_shared::SubscriptionStatus;

use crate::error::{LoyaltyError, LoyaltyResult};
use crate::ledger::{BalanceSummary, LedgerEntryKind, LoyaltyAccount, NewLedgerEntry};
use crate::rates;
use crate::store::{PortalStore, MAX_CAS_RETRIES};
use crate::tiers::SubscriptionTier;

/// A user's subscription to a tier.
///
/// `tier_name` is denormalized at creation time so override prompts and
/// history views do not need a catalog lookup (and survive tier renames).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier_id: Uuid,
    pub tier_name: String,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Subscription {
    /// Whether this subscription is live at `now`. Expiry is purely a
    /// read-time comparison; no background job flips the status.
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date > now
    }

    /// Remaining validity at `now`, clamped to zero.
    pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
        if self.end_date > now {
            self.end_date - now
        } else {
            Duration::ZERO
        }
    }
}

/// Result of a cash purchase.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOutcome {
    pub subscription: Subscription,
    /// Loyalty points credited for this purchase.
    pub points_earned: i64,
    pub balance: BalanceSummary,
}

/// Result of redeeming points for a tier.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionOutcome {
    pub subscription: Subscription,
    /// Points actually debited.
    pub points_used: i64,
    pub balance: BalanceSummary,
}

/// How a tier activation is settled.
enum Settlement {
    /// Already-collected cash amount; earns points.
    Cash { amount_cents: i64 },
    /// Paid from the loyalty balance; debits points.
    Points,
}

/// Service managing subscription lifecycle and the override guard.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn PortalStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self { store }
    }

    /// Activate a tier paid in cash, crediting earned points.
    pub async fn purchase_tier(
        &self,
        user_id: Uuid,
        tier_id: Uuid,
        acknowledge_override: bool,
    ) -> LoyaltyResult<PurchaseOutcome> {
        let tier = self.require_tier(tier_id).await?;
        let amount_cents = tier.price_cents;
        let (subscription, points, balance) = self
            .activate_tier(
                user_id,
                &tier,
                acknowledge_override,
                Settlement::Cash { amount_cents },
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            tier_id = %tier_id,
            tier_name = %subscription.tier_name,
            amount_cents,
            points_earned = points,
            "Tier purchased"
        );

        Ok(PurchaseOutcome {
            subscription,
            points_earned: points,
            balance,
        })
    }

    /// Activate a tier paid entirely from the loyalty balance.
    pub async fn redeem_for_tier(
        &self,
        user_id: Uuid,
        tier_id: Uuid,
        acknowledge_override: bool,
    ) -> LoyaltyResult<RedemptionOutcome> {
        let tier = self.require_tier(tier_id).await?;
        let (subscription, points, balance) = self
            .activate_tier(user_id, &tier, acknowledge_override, Settlement::Points)
            .await?;

        tracing::info!(
            user_id = %user_id,
            tier_id = %tier_id,
            tier_name = %subscription.tier_name,
            points_used = points,
            remaining_balance = balance.balance,
            "Tier redeemed with points"
        );

        Ok(RedemptionOutcome {
            subscription,
            points_used: points,
            balance,
        })
    }

    /// The user's currently live subscription, if any.
    pub async fn active_subscription(&self, user_id: Uuid) -> LoyaltyResult<Option<Subscription>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .store
            .active_subscription(user_id)
            .await?
            .filter(|sub| sub.is_active_at(now)))
    }

    /// Full subscription history, newest first.
    pub async fn list_subscriptions(&self, user_id: Uuid) -> LoyaltyResult<Vec<Subscription>> {
        self.store.list_subscriptions(user_id).await
    }

    async fn require_tier(&self, tier_id: Uuid) -> LoyaltyResult<SubscriptionTier> {
        self.store
            .tier(tier_id)
            .await?
            .ok_or(LoyaltyError::TierNotFound(tier_id))
    }

    // =========================================================================
    // SINGLE AUTHORITATIVE TIER ACTIVATION
    // =========================================================================
    // Every operation that creates an active subscription goes through this
    // function: cash purchases and point redemptions alike. The business rule
    // lives here once; call sites never reimplement it.
    // =========================================================================

    async fn activate_tier(
        &self,
        user_id: Uuid,
        tier: &SubscriptionTier,
        acknowledge_override: bool,
        settlement: Settlement,
    ) -> LoyaltyResult<(Subscription, i64, BalanceSummary)> {
        for attempt in 0..MAX_CAS_RETRIES {
            // Override guard: replacing a plan with remaining time forfeits
            // that time, so it requires explicit acknowledgement from the
            // caller. Checked on every attempt: a retry after losing the race
            // to a concurrent activation must see that activation.
            let now = OffsetDateTime::now_utc();
            if let Some(current) = self.store.active_subscription(user_id).await? {
                if current.is_active_at(now) && !acknowledge_override {
                    let remaining = current.remaining_at(now);
                    return Err(LoyaltyError::OverrideNotAcknowledged {
                        tier_name: current.tier_name,
                        remaining,
                    });
                }
            }

            let mut account = self
                .store
                .load_account(user_id)
                .await?
                .unwrap_or_else(|| LoyaltyAccount::fresh(user_id));
            let expected_version = account.version;

            let (points, entry) = match &settlement {
                Settlement::Cash { amount_cents } => {
                    let earned = rates::earned_points(*amount_cents);
                    account.points_earned += earned;
                    let entry = (earned > 0).then(|| NewLedgerEntry {
                        user_id,
                        kind: LedgerEntryKind::Credit,
                        points: earned,
                        tier_id: Some(tier.id),
                        note: Some(format!("purchase: {}", tier.name)),
                    });
                    (earned, entry)
                }
                Settlement::Points => {
                    let required = rates::required_points(tier.price_cents);
                    if required > account.balance {
                        return Err(LoyaltyError::InsufficientPoints {
                            required,
                            balance: account.balance,
                            shortfall: required - account.balance,
                        });
                    }
                    account.points_redeemed += required;
                    let entry = Some(NewLedgerEntry {
                        user_id,
                        kind: LedgerEntryKind::Debit,
                        points: required,
                        tier_id: Some(tier.id),
                        note: Some(format!("redeemed for: {}", tier.name)),
                    });
                    (required, entry)
                }
            };
            account.balance = account.points_earned - account.points_redeemed;
            account.last_updated = now;

            let start_date = OffsetDateTime::now_utc();
            let subscription = Subscription {
                id: Uuid::new_v4(),
                user_id,
                tier_id: tier.id,
                tier_name: tier.name.clone(),
                status: SubscriptionStatus::Active,
                start_date,
                end_date: start_date + tier.validity(),
                created_at: start_date,
            };

            if self
                .store
                .commit_subscription_change(
                    &account,
                    expected_version,
                    entry.as_ref(),
                    &subscription,
                )
                .await?
            {
                return Ok((subscription, points, BalanceSummary::from(&account)));
            }

            tracing::debug!(
                user_id = %user_id,
                tier_id = %tier.id,
                attempt,
                "Account version conflict during activation, retrying"
            );
        }

        Err(LoyaltyError::ConcurrentModification)
    }
}
