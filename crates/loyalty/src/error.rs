//! Loyalty engine error types

use time::Duration;
use uuid::Uuid;

/// Errors returned by the loyalty engine.
///
/// Business-rule violations are typed so the presentation layer can render a
/// specific, actionable message instead of a generic failure string. Storage
/// failures surface as [`LoyaltyError::Backend`] and are never retried here.
#[derive(Debug, thiserror::Error)]
pub enum LoyaltyError {
    /// Non-positive point or currency amount.
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// Redemption exceeds the spendable balance. Carries the shortfall so the
    /// caller can tell the user exactly how many points are missing.
    #[error("insufficient points: need {shortfall} more ({required} required, {balance} available)")]
    InsufficientPoints {
        required: i64,
        balance: i64,
        shortfall: i64,
    },

    /// An active subscription with remaining time would be silently replaced.
    /// The caller must present the remaining time and re-submit with the
    /// override acknowledged.
    #[error("active plan '{tier_name}' still has {remaining} remaining; confirmation required to replace it")]
    OverrideNotAcknowledged {
        tier_name: String,
        remaining: Duration,
    },

    #[error("subscription tier {0} not found")]
    TierNotFound(Uuid),

    /// Tier deletion blocked because subscriptions reference it.
    #[error("subscription tier {0} is referenced by existing subscriptions")]
    TierInUse(Uuid),

    /// Optimistic-lock conflict that survived the bounded retry budget.
    /// Retryable by the caller.
    #[error("account was modified by another request, please retry")]
    ConcurrentModification,

    /// Storage/transport failure, surfaced unchanged.
    #[error("backend unavailable: {0}")]
    Backend(#[from] sqlx::Error),
}

pub type LoyaltyResult<T> = Result<T, LoyaltyError>;
