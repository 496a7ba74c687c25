//! Postgres implementation of the storage port

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use portal_shared::TierType;

use crate::error::{LoyaltyError, LoyaltyResult};
use crate::ledger::{LedgerEntry, LoyaltyAccount, NewLedgerEntry};
use crate::store::PortalStore;
use crate::subscriptions::Subscription;
use crate::tiers::SubscriptionTier;

/// Postgres-backed store. All commit methods wrap their writes in a single
/// transaction so account, ledger, and subscription rows never diverge.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// CAS write of the account row inside an open transaction.
    ///
    /// `expected_version == 0` inserts (lazy creation); otherwise updates
    /// guarded by the version column. Returns whether the write landed.
    async fn write_account(
        tx: &mut Transaction<'_, Postgres>,
        account: &LoyaltyAccount,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let rows_affected = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO loyalty_accounts
                    (user_id, points_earned, points_redeemed, balance, version, last_updated)
                VALUES ($1, $2, $3, $4, 1, $5)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(account.user_id)
            .bind(account.points_earned)
            .bind(account.points_redeemed)
            .bind(account.balance)
            .bind(account.last_updated)
            .execute(&mut **tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE loyalty_accounts SET
                    points_earned = $2,
                    points_redeemed = $3,
                    balance = $4,
                    version = version + 1,
                    last_updated = $5
                WHERE user_id = $1 AND version = $6
                "#,
            )
            .bind(account.user_id)
            .bind(account.points_earned)
            .bind(account.points_redeemed)
            .bind(account.balance)
            .bind(account.last_updated)
            .bind(expected_version)
            .execute(&mut **tx)
            .await?
            .rows_affected()
        };

        Ok(rows_affected == 1)
    }

    async fn write_ledger_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewLedgerEntry,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_ledger (user_id, kind, points, tier_id, note)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.kind)
        .bind(entry.points)
        .bind(entry.tier_id)
        .bind(&entry.note)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PortalStore for PgStore {
    async fn load_account(&self, user_id: Uuid) -> LoyaltyResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            SELECT user_id, points_earned, points_redeemed, balance, version, last_updated
            FROM loyalty_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn commit_account(
        &self,
        account: &LoyaltyAccount,
        expected_version: i64,
        entry: &NewLedgerEntry,
    ) -> LoyaltyResult<bool> {
        let mut tx = self.pool.begin().await?;

        if !Self::write_account(&mut tx, account, expected_version).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        Self::write_ledger_entry(&mut tx, entry).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn commit_subscription_change(
        &self,
        account: &LoyaltyAccount,
        expected_version: i64,
        entry: Option<&NewLedgerEntry>,
        subscription: &Subscription,
    ) -> LoyaltyResult<bool> {
        let mut tx = self.pool.begin().await?;

        if !Self::write_account(&mut tx, account, expected_version).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(entry) = entry {
            Self::write_ledger_entry(&mut tx, entry).await?;
        }

        // Supersede: the previous plan's remaining time is forfeited.
        sqlx::query(
            "UPDATE subscriptions SET status = 'expired' WHERE user_id = $1 AND status = 'active'",
        )
        .bind(subscription.user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, user_id, tier_id, tier_name, status, start_date, end_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.tier_id)
        .bind(&subscription.tier_name)
        .bind(subscription.status)
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn ledger_entries(&self, user_id: Uuid) -> LoyaltyResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, kind, points, tier_id, note, created_at
            FROM loyalty_ledger
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn tier(&self, tier_id: Uuid) -> LoyaltyResult<Option<SubscriptionTier>> {
        let tier = sqlx::query_as::<_, SubscriptionTier>(
            r#"
            SELECT id, name, price_cents, duration, tier_type,
                   speed_limit_mbps, data_limit_mb, description, created_at, updated_at
            FROM subscription_tiers
            WHERE id = $1
            "#,
        )
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tier)
    }

    async fn list_tiers(
        &self,
        tier_type: Option<TierType>,
    ) -> LoyaltyResult<Vec<SubscriptionTier>> {
        let tiers = sqlx::query_as::<_, SubscriptionTier>(
            r#"
            SELECT id, name, price_cents, duration, tier_type,
                   speed_limit_mbps, data_limit_mb, description, created_at, updated_at
            FROM subscription_tiers
            WHERE $1::tier_type IS NULL OR tier_type = $1
            ORDER BY price_cents ASC
            "#,
        )
        .bind(tier_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(tiers)
    }

    async fn insert_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_tiers
                (id, name, price_cents, duration, tier_type,
                 speed_limit_mbps, data_limit_mb, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(tier.id)
        .bind(&tier.name)
        .bind(tier.price_cents)
        .bind(tier.duration)
        .bind(tier.tier_type)
        .bind(tier.speed_limit_mbps)
        .bind(tier.data_limit_mb)
        .bind(&tier.description)
        .bind(tier.created_at)
        .bind(tier.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_tier(&self, tier: &SubscriptionTier) -> LoyaltyResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE subscription_tiers SET
                name = $2,
                price_cents = $3,
                duration = $4,
                speed_limit_mbps = $5,
                data_limit_mb = $6,
                description = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(tier.id)
        .bind(&tier.name)
        .bind(tier.price_cents)
        .bind(tier.duration)
        .bind(tier.speed_limit_mbps)
        .bind(tier.data_limit_mb)
        .bind(&tier.description)
        .bind(tier.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(LoyaltyError::TierNotFound(tier.id));
        }
        Ok(())
    }

    async fn delete_tier(&self, tier_id: Uuid) -> LoyaltyResult<()> {
        match sqlx::query("DELETE FROM subscription_tiers WHERE id = $1")
            .bind(tier_id)
            .execute(&self.pool)
            .await
        {
            Ok(result) if result.rows_affected() == 0 => Err(LoyaltyError::TierNotFound(tier_id)),
            Ok(_) => Ok(()),
            Err(e) => {
                // 23503: foreign_key_violation - subscriptions still reference it
                let fk_violation = e
                    .as_database_error()
                    .and_then(|db| db.code())
                    .is_some_and(|code| code == "23503");
                if fk_violation {
                    Err(LoyaltyError::TierInUse(tier_id))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn active_subscription(&self, user_id: Uuid) -> LoyaltyResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, tier_id, tier_name, status, start_date, end_date, created_at
            FROM subscriptions
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn list_subscriptions(&self, user_id: Uuid) -> LoyaltyResult<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, tier_id, tier_name, status, start_date, end_date, created_at
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }
}
