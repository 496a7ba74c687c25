//! Subscription tier catalog
//!
//! Tiers are the purchasable plans: short-lived hotspot passes (validity in
//! hours) and monthly-style home internet plans (validity in days). Admin
//! CRUD lives here too so every view shares one implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use portal_shared::TierType;

use crate::error::{LoyaltyError, LoyaltyResult};
use crate::store::PortalStore;

/// A purchasable plan.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionTier {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    /// Hours for hotspot tiers, days for home internet tiers.
    pub duration: i32,
    pub tier_type: TierType,
    pub speed_limit_mbps: Option<i32>,
    pub data_limit_mb: Option<i64>,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SubscriptionTier {
    /// How long a subscription to this tier stays valid.
    pub fn validity(&self) -> Duration {
        match self.tier_type {
            TierType::Hotspot => Duration::hours(i64::from(self.duration)),
            TierType::HomeInternet => Duration::days(i64::from(self.duration)),
        }
    }
}

/// Payload for creating a tier.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTier {
    pub name: String,
    pub price_cents: i64,
    pub duration: i32,
    pub tier_type: TierType,
    pub speed_limit_mbps: Option<i32>,
    pub data_limit_mb: Option<i64>,
    pub description: Option<String>,
}

/// Partial update for a tier. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierUpdate {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub duration: Option<i32>,
    pub speed_limit_mbps: Option<i32>,
    pub data_limit_mb: Option<i64>,
    pub description: Option<String>,
}

/// Catalog service: listing for users, CRUD for admins.
#[derive(Clone)]
pub struct TierService {
    store: Arc<dyn PortalStore>,
}

impl TierService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self { store }
    }

    /// List tiers, optionally filtered by type.
    pub async fn list(&self, tier_type: Option<TierType>) -> LoyaltyResult<Vec<SubscriptionTier>> {
        self.store.list_tiers(tier_type).await
    }

    /// Fetch a tier or fail with `TierNotFound`.
    pub async fn get(&self, tier_id: Uuid) -> LoyaltyResult<SubscriptionTier> {
        self.store
            .tier(tier_id)
            .await?
            .ok_or(LoyaltyError::TierNotFound(tier_id))
    }

    pub async fn create(&self, new_tier: NewTier) -> LoyaltyResult<SubscriptionTier> {
        if new_tier.price_cents < 0 {
            return Err(LoyaltyError::InvalidAmount(new_tier.price_cents));
        }
        if new_tier.duration <= 0 {
            return Err(LoyaltyError::InvalidAmount(i64::from(new_tier.duration)));
        }

        let now = OffsetDateTime::now_utc();
        let tier = SubscriptionTier {
            id: Uuid::new_v4(),
            name: new_tier.name,
            price_cents: new_tier.price_cents,
            duration: new_tier.duration,
            tier_type: new_tier.tier_type,
            speed_limit_mbps: new_tier.speed_limit_mbps,
            data_limit_mb: new_tier.data_limit_mb,
            description: new_tier.description,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_tier(&tier).await?;

        tracing::info!(tier_id = %tier.id, name = %tier.name, tier_type = %tier.tier_type, "Tier created");
        Ok(tier)
    }

    pub async fn update(&self, tier_id: Uuid, update: TierUpdate) -> LoyaltyResult<SubscriptionTier> {
        let mut tier = self.get(tier_id).await?;

        if let Some(name) = update.name {
            tier.name = name;
        }
        if let Some(price_cents) = update.price_cents {
            if price_cents < 0 {
                return Err(LoyaltyError::InvalidAmount(price_cents));
            }
            tier.price_cents = price_cents;
        }
        if let Some(duration) = update.duration {
            if duration <= 0 {
                return Err(LoyaltyError::InvalidAmount(i64::from(duration)));
            }
            tier.duration = duration;
        }
        if let Some(speed) = update.speed_limit_mbps {
            tier.speed_limit_mbps = Some(speed);
        }
        if let Some(data) = update.data_limit_mb {
            tier.data_limit_mb = Some(data);
        }
        if let Some(description) = update.description {
            tier.description = Some(description);
        }
        tier.updated_at = OffsetDateTime::now_utc();

        self.store.update_tier(&tier).await?;

        tracing::info!(tier_id = %tier.id, "Tier updated");
        Ok(tier)
    }

    /// Delete a tier. Fails with `TierInUse` when subscriptions reference it.
    pub async fn delete(&self, tier_id: Uuid) -> LoyaltyResult<()> {
        self.store.delete_tier(tier_id).await?;
        tracing::info!(tier_id = %tier_id, "Tier deleted");
        Ok(())
    }
}
