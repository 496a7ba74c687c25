//! Enums shared between the loyalty engine and the API surface.

use serde::{Deserialize, Serialize};

/// Kind of purchasable plan.
///
/// Hotspot tiers are short-lived (validity measured in hours); home internet
/// tiers are monthly-style plans (validity measured in days).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "tier_type", rename_all = "snake_case")]
pub enum TierType {
    Hotspot,
    HomeInternet,
}

impl TierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierType::Hotspot => "hotspot",
            TierType::HomeInternet => "home_internet",
        }
    }
}

impl std::fmt::Display for TierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a subscription.
///
/// A subscription only ever moves `Active` -> `Expired`, either by its
/// `end_date` elapsing (a read-time comparison, never a background job) or by
/// being superseded when the user activates a new plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
