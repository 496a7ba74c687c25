// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Loyalty Engine
//!
//! Tests critical boundary conditions and race conditions in:
//! - Ledger credits/debits and the balance identity
//! - Tier redemption cost and shortfall reporting
//! - The subscription override guard
//! - Concurrent redemption of the last affordable tier

use portal_shared::TierType;
use uuid::Uuid;

use crate::tiers::NewTier;
use crate::LoyaltyService;

fn hotspot_tier(price_cents: i64, duration_hours: i32) -> NewTier {
    NewTier {
        name: format!("{} Hour Plan", duration_hours),
        price_cents,
        duration: duration_hours,
        tier_type: TierType::Hotspot,
        speed_limit_mbps: None,
        data_limit_mb: None,
        description: None,
    }
}

mod ledger_tests {
    use super::*;
    use crate::LoyaltyError;

    #[tokio::test]
    async fn test_unknown_user_has_zero_balance() {
        let engine = LoyaltyService::in_memory();
        let summary = engine.ledger.balance(Uuid::new_v4()).await.unwrap();
        assert_eq!(summary.points_earned, 0);
        assert_eq!(summary.points_redeemed, 0);
        assert_eq!(summary.balance, 0);
    }

    #[tokio::test]
    async fn test_balance_query_is_idempotent() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        engine.ledger.credit_points(user, 25_00).await.unwrap();

        let first = engine.ledger.balance(user).await.unwrap();
        let second = engine.ledger.balance(user).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_credit_applies_earn_rate() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();

        // 100.00 currency units at 10 points/unit
        let summary = engine.ledger.credit_points(user, 100_00).await.unwrap();
        assert_eq!(summary.points_earned, 1000);
        assert_eq!(summary.balance, 1000);
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();

        assert!(matches!(
            engine.ledger.credit_points(user, 0).await,
            Err(LoyaltyError::InvalidAmount(0))
        ));
        assert!(matches!(
            engine.ledger.credit_points(user, -5_00).await,
            Err(LoyaltyError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.ledger.redeem_balance(user, 0).await,
            Err(LoyaltyError::InvalidAmount(0))
        ));
    }

    #[tokio::test]
    async fn test_balance_identity_holds_across_operations() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();

        for (credit_cents, redeem_points) in [(10_00, 50), (30_00, 200), (5_00, 1)] {
            let after_credit = engine.ledger.credit_points(user, credit_cents).await.unwrap();
            assert_eq!(
                after_credit.balance,
                after_credit.points_earned - after_credit.points_redeemed
            );

            let after_redeem = engine.ledger.redeem_balance(user, redeem_points).await.unwrap();
            assert_eq!(
                after_redeem.balance,
                after_redeem.points_earned - after_redeem.points_redeemed
            );
            assert!(after_redeem.balance >= 0);
        }
    }

    #[tokio::test]
    async fn test_redeem_one_over_balance_fails_with_shortfall() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        engine.ledger.credit_points(user, 10_00).await.unwrap(); // 100 points

        let err = engine.ledger.redeem_balance(user, 101).await.unwrap_err();
        match err {
            LoyaltyError::InsufficientPoints {
                required,
                balance,
                shortfall,
            } => {
                assert_eq!(required, 101);
                assert_eq!(balance, 100);
                assert_eq!(shortfall, 1);
            }
            other => panic!("expected InsufficientPoints, got {other:?}"),
        }

        // Exact balance drains to zero.
        let summary = engine.ledger.redeem_balance(user, 100).await.unwrap();
        assert_eq!(summary.balance, 0);
        assert_eq!(summary.points_redeemed, 100);
    }

    #[tokio::test]
    async fn test_ledger_history_records_every_mutation() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();

        engine.ledger.credit_points(user, 20_00).await.unwrap();
        engine.ledger.redeem_balance(user, 50).await.unwrap();

        let history = engine.ledger.history(user).await.unwrap();
        assert_eq!(history.len(), 2);

        let credits: i64 = history
            .iter()
            .filter(|e| e.kind == crate::LedgerEntryKind::Credit)
            .map(|e| e.points)
            .sum();
        let debits: i64 = history
            .iter()
            .filter(|e| e.kind == crate::LedgerEntryKind::Debit)
            .map(|e| e.points)
            .sum();
        assert_eq!(credits, 200);
        assert_eq!(debits, 50);
    }
}

mod redemption_tests {
    use super::*;
    use crate::LoyaltyError;
    use portal_shared::SubscriptionStatus;

    #[tokio::test]
    async fn test_tier_priced_ten_units_requires_700_points() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        let tier = engine.tiers.create(hotspot_tier(10_00, 1)).await.unwrap();

        // Balance 699: fails reporting a shortfall of exactly 1.
        engine.ledger.credit_points(user, 69_90).await.unwrap();
        let err = engine
            .subscriptions
            .redeem_for_tier(user, tier.id, false)
            .await
            .unwrap_err();
        match err {
            LoyaltyError::InsufficientPoints {
                required, shortfall, ..
            } => {
                assert_eq!(required, 700);
                assert_eq!(shortfall, 1);
            }
            other => panic!("expected InsufficientPoints, got {other:?}"),
        }

        // Top up to exactly 700 and redeem.
        engine.ledger.credit_points(user, 10).await.unwrap(); // +1 point
        let outcome = engine
            .subscriptions
            .redeem_for_tier(user, tier.id, false)
            .await
            .unwrap();
        assert_eq!(outcome.points_used, 700);
        assert_eq!(outcome.balance.balance, 0);
        assert_eq!(outcome.subscription.tier_id, tier.id);
        assert_eq!(outcome.subscription.status, SubscriptionStatus::Active);

        let active = engine.subscriptions.active_subscription(user).await.unwrap();
        assert_eq!(active.unwrap().id, outcome.subscription.id);
    }

    #[tokio::test]
    async fn test_purchase_credits_earned_points_and_activates() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        let tier = engine.tiers.create(hotspot_tier(30_00, 6)).await.unwrap();

        let outcome = engine
            .subscriptions
            .purchase_tier(user, tier.id, false)
            .await
            .unwrap();
        assert_eq!(outcome.points_earned, 300);
        assert_eq!(outcome.balance.balance, 300);
        assert!(engine
            .subscriptions
            .active_subscription(user)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_redeeming_unknown_tier_fails() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        let missing = Uuid::new_v4();

        assert!(matches!(
            engine.subscriptions.redeem_for_tier(user, missing, false).await,
            Err(LoyaltyError::TierNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_tier_in_use_cannot_be_deleted() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        let tier = engine.tiers.create(hotspot_tier(10_00, 1)).await.unwrap();
        engine
            .subscriptions
            .purchase_tier(user, tier.id, false)
            .await
            .unwrap();

        assert!(matches!(
            engine.tiers.delete(tier.id).await,
            Err(LoyaltyError::TierInUse(id)) if id == tier.id
        ));

        let unused = engine.tiers.create(hotspot_tier(20_00, 3)).await.unwrap();
        engine.tiers.delete(unused.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_tier_listing_filters_by_type() {
        let engine = LoyaltyService::in_memory();
        engine.tiers.create(hotspot_tier(10_00, 1)).await.unwrap();
        engine
            .tiers
            .create(NewTier {
                name: "Home Internet 10 Mbps".to_string(),
                price_cents: 1000_00,
                duration: 30,
                tier_type: TierType::HomeInternet,
                speed_limit_mbps: Some(10),
                data_limit_mb: None,
                description: None,
            })
            .await
            .unwrap();

        let all = engine.tiers.list(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let home = engine.tiers.list(Some(TierType::HomeInternet)).await.unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].speed_limit_mbps, Some(10));
    }
}

mod override_tests {
    use super::*;
    use crate::LoyaltyError;
    use portal_shared::SubscriptionStatus;

    #[tokio::test]
    async fn test_replacing_running_plan_requires_acknowledgement() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        let two_hours = engine.tiers.create(hotspot_tier(20_00, 2)).await.unwrap();
        let day_pass = engine.tiers.create(hotspot_tier(50_00, 24)).await.unwrap();

        engine
            .subscriptions
            .purchase_tier(user, two_hours.id, false)
            .await
            .unwrap();

        let err = engine
            .subscriptions
            .purchase_tier(user, day_pass.id, false)
            .await
            .unwrap_err();
        match err {
            LoyaltyError::OverrideNotAcknowledged {
                tier_name,
                remaining,
            } => {
                assert_eq!(tier_name, two_hours.name);
                // Just activated, so remaining is about 2 hours.
                assert!(remaining <= time::Duration::hours(2));
                assert!(remaining > time::Duration::minutes(119));
            }
            other => panic!("expected OverrideNotAcknowledged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acknowledged_override_forfeits_remaining_time() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        let two_hours = engine.tiers.create(hotspot_tier(20_00, 2)).await.unwrap();
        let day_pass = engine.tiers.create(hotspot_tier(50_00, 24)).await.unwrap();

        let first = engine
            .subscriptions
            .purchase_tier(user, two_hours.id, false)
            .await
            .unwrap();
        let balance_before = engine.ledger.balance(user).await.unwrap();

        let second = engine
            .subscriptions
            .purchase_tier(user, day_pass.id, true)
            .await
            .unwrap();

        let history = engine.subscriptions.list_subscriptions(user).await.unwrap();
        assert_eq!(history.len(), 2);
        let old = history
            .iter()
            .find(|s| s.id == first.subscription.id)
            .unwrap();
        assert_eq!(old.status, SubscriptionStatus::Expired);
        assert_eq!(
            engine
                .subscriptions
                .active_subscription(user)
                .await
                .unwrap()
                .unwrap()
                .id,
            second.subscription.id
        );

        // The forfeited remainder earns nothing back: the only balance change
        // is the points earned on the new purchase itself.
        let balance_after = engine.ledger.balance(user).await.unwrap();
        assert_eq!(
            balance_after.balance,
            balance_before.balance + second.points_earned
        );
        assert_eq!(balance_after.points_redeemed, balance_before.points_redeemed);
    }

    #[tokio::test]
    async fn test_redemption_also_respects_override_guard() {
        let engine = LoyaltyService::in_memory();
        let user = Uuid::new_v4();
        let running = engine.tiers.create(hotspot_tier(20_00, 2)).await.unwrap();
        let target = engine.tiers.create(hotspot_tier(10_00, 1)).await.unwrap();

        engine.ledger.credit_points(user, 100_00).await.unwrap(); // 1000 points
        engine
            .subscriptions
            .purchase_tier(user, running.id, false)
            .await
            .unwrap();

        assert!(matches!(
            engine.subscriptions.redeem_for_tier(user, target.id, false).await,
            Err(LoyaltyError::OverrideNotAcknowledged { .. })
        ));

        // Acknowledged redemption supersedes the running plan.
        let outcome = engine
            .subscriptions
            .redeem_for_tier(user, target.id, true)
            .await
            .unwrap();
        assert_eq!(outcome.points_used, 700);
    }

    use std::sync::Arc;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use crate::ledger::{LedgerEntry, LoyaltyAccount, NewLedgerEntry};
    use crate::store::PortalStore;
    use crate::subscriptions::Subscription;
    use crate::tiers::SubscriptionTier;
    use crate::{LoyaltyResult, LoyaltyService, MemoryStore};

    /// Store whose first activation commit loses to a competing activation
    /// for the same user, landing between the guard check and the write.
    struct ContendedStore {
        inner: MemoryStore,
        competing: std::sync::Mutex<Option<Subscription>>,
    }

    #[async_trait]
    impl PortalStore for ContendedStore {
        async fn load_account(&self, user_id: Uuid) -> LoyaltyResult<Option<LoyaltyAccount>> {
            self.inner.load_account(user_id).await
        }

        async fn commit_account(
            &self,
            account: &LoyaltyAccount,
            expected_version: i64,
            entry: &NewLedgerEntry,
        ) -> LoyaltyResult<bool> {
            self.inner
                .commit_account(account, expected_version, entry)
                .await
        }

        async fn commit_subscription_change(
            &self,
            account: &LoyaltyAccount,
            expected_version: i64,
            entry: Option<&NewLedgerEntry>,
            subscription: &Subscription,
        ) -> LoyaltyResult<bool> {
            let competing = self.competing.lock().unwrap().take();
            if let Some(rival_sub) = competing {
                let mut rival = self
                    .inner
                    .load_account(rival_sub.user_id)
                    .await?
                    .unwrap_or_else(|| LoyaltyAccount::fresh(rival_sub.user_id));
                let rival_version = rival.version;
                rival.points_earned += 200;
                rival.balance = rival.points_earned - rival.points_redeemed;
                assert!(
                    self.inner
                        .commit_subscription_change(&rival, rival_version, None, &rival_sub)
                        .await?,
                    "competing activation must land first"
                );
            }
            self.inner
                .commit_subscription_change(account, expected_version, entry, subscription)
                .await
        }

        async fn ledger_entries(&self, user_id: Uuid) -> LoyaltyResult<Vec<LedgerEntry>> {
            self.inner.ledger_entries(user_id).await
        }

        async fn tier(&self, tier_id: Uuid) -> LoyaltyResult<Option<SubscriptionTier>> {
            self.inner.tier(tier_id).await
        }

        async fn list_tiers(
            &self,
            tier_type: Option<TierType>,
        ) -> LoyaltyResult<Vec<SubscriptionTier>> {
            self.inner.list_tiers(tier_type).await
        }

        async fn insert_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()> {
            self.inner.insert_tier(tier).await
        }

        async fn update_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()> {
            self.inner.update_tier(tier).await
        }

        async fn delete_tier(&self, tier_id: Uuid) -> LoyaltyResult<()> {
            self.inner.delete_tier(tier_id).await
        }

        async fn active_subscription(&self, user_id: Uuid) -> LoyaltyResult<Option<Subscription>> {
            self.inner.active_subscription(user_id).await
        }

        async fn list_subscriptions(&self, user_id: Uuid) -> LoyaltyResult<Vec<Subscription>> {
            self.inner.list_subscriptions(user_id).await
        }
    }

    // A request that passes the guard, then loses the version check to a
    // concurrent activation, must fail the guard on retry instead of silently
    // superseding the subscription the other request just activated.
    #[tokio::test]
    async fn test_guard_rechecked_when_commit_loses_to_concurrent_activation() {
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let rival_sub = Subscription {
            id: Uuid::new_v4(),
            user_id: user,
            tier_id: Uuid::new_v4(),
            tier_name: "2 Hour Plan".to_string(),
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: now + time::Duration::hours(2),
            created_at: now,
        };
        let store = Arc::new(ContendedStore {
            inner: MemoryStore::new(),
            competing: std::sync::Mutex::new(Some(rival_sub.clone())),
        });
        let engine = LoyaltyService::new(store);
        let tier = engine.tiers.create(hotspot_tier(10_00, 1)).await.unwrap();

        let err = engine
            .subscriptions
            .purchase_tier(user, tier.id, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoyaltyError::OverrideNotAcknowledged { ref tier_name, .. }
                if tier_name == "2 Hour Plan"
        ));

        // The competing activation survives with its time intact.
        let active = engine
            .subscriptions
            .active_subscription(user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, rival_sub.id);
    }
}

mod concurrency_tests {
    use super::*;
    use crate::LoyaltyError;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    // Two requests race for the last affordable redemption: exactly one debit
    // may land, and the final balance must reflect exactly one debit.
    #[tokio::test]
    async fn test_concurrent_redemption_of_last_affordable_tier() {
        let engine = Arc::new(LoyaltyService::in_memory());
        let user = Uuid::new_v4();
        let tier = engine.tiers.create(hotspot_tier(10_00, 1)).await.unwrap();

        // Exactly enough for one redemption (700 points).
        engine.ledger.credit_points(user, 70_00).await.unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = vec![];
        for _ in 0..2 {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let tier_id = tier.id;
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine
                    .subscriptions
                    .redeem_for_tier(user, tier_id, true)
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => {
                    successes += 1;
                    assert_eq!(outcome.points_used, 700);
                }
                Err(
                    LoyaltyError::InsufficientPoints { .. }
                    | LoyaltyError::ConcurrentModification,
                ) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1, "exactly one redemption must succeed");

        let summary = engine.ledger.balance(user).await.unwrap();
        assert_eq!(summary.balance, 0);
        assert_eq!(summary.points_redeemed, 700);
        assert_eq!(
            summary.balance,
            summary.points_earned - summary.points_redeemed
        );
    }

    #[tokio::test]
    async fn test_concurrent_credits_all_land() {
        let engine = Arc::new(LoyaltyService::in_memory());
        let user = Uuid::new_v4();

        let barrier = Arc::new(Barrier::new(4));
        let mut handles = vec![];
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.ledger.credit_points(user, 10_00).await
            }));
        }

        let mut credited = 0;
        for handle in handles {
            // A credit may exhaust its retry budget under heavy contention;
            // that is a retryable outcome, not a correctness failure.
            if handle.await.unwrap().is_ok() {
                credited += 1;
            }
        }
        assert!(credited >= 1);

        let summary = engine.ledger.balance(user).await.unwrap();
        assert_eq!(summary.points_earned, credited * 100);
        assert_eq!(
            summary.balance,
            summary.points_earned - summary.points_redeemed
        );
    }

    #[tokio::test]
    async fn test_operations_on_different_users_are_independent() {
        let engine = Arc::new(LoyaltyService::in_memory());
        let users: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        let mut handles = vec![];
        for user in users.clone() {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.ledger.credit_points(user, 15_00).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for user in users {
            let summary = engine.ledger.balance(user).await.unwrap();
            assert_eq!(summary.points_earned, 150);
        }
    }
}
