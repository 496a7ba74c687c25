//! Loyalty Invariants Module
//!
//! Provides runnable consistency checks for the loyalty system.
//! These invariants can be run after any mutation to ensure the ledger,
//! accounts, and subscriptions are in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::LoyaltyResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// User(s) affected
    pub user_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - points may be granted or charged incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for balance identity violation
#[derive(Debug, sqlx::FromRow)]
struct BalanceIdentityRow {
    user_id: Uuid,
    points_earned: i64,
    points_redeemed: i64,
    balance: i64,
}

/// Row type for multiple active subscriptions violation
#[derive(Debug, sqlx::FromRow)]
struct MultipleActiveRow {
    user_id: Uuid,
    active_count: i64,
}

/// Row type for ledger/account disagreement violation
#[derive(Debug, sqlx::FromRow)]
struct LedgerMismatchRow {
    user_id: Uuid,
    points_earned: i64,
    points_redeemed: i64,
    ledger_credits: i64,
    ledger_debits: i64,
}

/// Row type for orphaned subscription violation
#[derive(Debug, sqlx::FromRow)]
struct OrphanSubscriptionRow {
    subscription_id: Uuid,
    user_id: Uuid,
    tier_id: Uuid,
}

/// Service for running loyalty invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> LoyaltyResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_balance_identity().await?);
        violations.extend(self.check_non_negative_totals().await?);
        violations.extend(self.check_single_active_subscription().await?);
        violations.extend(self.check_ledger_matches_accounts().await?);
        violations.extend(self.check_no_orphan_subscriptions().await?);

        let checks_run = 5;
        let checks_failed = violations
            .iter()
            .map(|v| v.invariant.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed: checks_run - checks_failed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant: balance == points_earned - points_redeemed for every account
    async fn check_balance_identity(&self) -> LoyaltyResult<Vec<InvariantViolation>> {
        let rows = sqlx::query_as::<_, BalanceIdentityRow>(
            r#"
            SELECT user_id, points_earned, points_redeemed, balance
            FROM loyalty_accounts
            WHERE balance <> points_earned - points_redeemed
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "balance_identity".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "Account {} has balance {} but earned {} - redeemed {} = {}",
                    row.user_id,
                    row.balance,
                    row.points_earned,
                    row.points_redeemed,
                    row.points_earned - row.points_redeemed
                ),
                context: serde_json::json!({
                    "points_earned": row.points_earned,
                    "points_redeemed": row.points_redeemed,
                    "balance": row.balance,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant: no account holds a negative balance or negative totals
    async fn check_non_negative_totals(&self) -> LoyaltyResult<Vec<InvariantViolation>> {
        let rows = sqlx::query_as::<_, BalanceIdentityRow>(
            r#"
            SELECT user_id, points_earned, points_redeemed, balance
            FROM loyalty_accounts
            WHERE balance < 0 OR points_earned < 0 OR points_redeemed < 0
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "non_negative_totals".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "Account {} has a negative total (earned {}, redeemed {}, balance {})",
                    row.user_id, row.points_earned, row.points_redeemed, row.balance
                ),
                context: serde_json::json!({
                    "points_earned": row.points_earned,
                    "points_redeemed": row.points_redeemed,
                    "balance": row.balance,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant: at most one active subscription per user
    async fn check_single_active_subscription(&self) -> LoyaltyResult<Vec<InvariantViolation>> {
        let rows = sqlx::query_as::<_, MultipleActiveRow>(
            r#"
            SELECT user_id, COUNT(*) AS active_count
            FROM subscriptions
            WHERE status = 'active'
            GROUP BY user_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_active_subscription".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "User {} has {} active subscriptions (expected at most 1)",
                    row.user_id, row.active_count
                ),
                context: serde_json::json!({ "active_count": row.active_count }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant: ledger sums agree with account totals
    async fn check_ledger_matches_accounts(&self) -> LoyaltyResult<Vec<InvariantViolation>> {
        let rows = sqlx::query_as::<_, LedgerMismatchRow>(
            r#"
            SELECT a.user_id, a.points_earned, a.points_redeemed,
                   COALESCE(SUM(l.points) FILTER (WHERE l.kind = 'credit'), 0)::BIGINT AS ledger_credits,
                   COALESCE(SUM(l.points) FILTER (WHERE l.kind = 'debit'), 0)::BIGINT AS ledger_debits
            FROM loyalty_accounts a
            LEFT JOIN loyalty_ledger l ON l.user_id = a.user_id
            GROUP BY a.user_id, a.points_earned, a.points_redeemed
            HAVING a.points_earned <> COALESCE(SUM(l.points) FILTER (WHERE l.kind = 'credit'), 0)
                OR a.points_redeemed <> COALESCE(SUM(l.points) FILTER (WHERE l.kind = 'debit'), 0)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "ledger_matches_accounts".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "Account {} totals (earned {}, redeemed {}) disagree with ledger sums (credits {}, debits {})",
                    row.user_id,
                    row.points_earned,
                    row.points_redeemed,
                    row.ledger_credits,
                    row.ledger_debits
                ),
                context: serde_json::json!({
                    "points_earned": row.points_earned,
                    "points_redeemed": row.points_redeemed,
                    "ledger_credits": row.ledger_credits,
                    "ledger_debits": row.ledger_debits,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant: every subscription references an existing tier
    async fn check_no_orphan_subscriptions(&self) -> LoyaltyResult<Vec<InvariantViolation>> {
        let rows = sqlx::query_as::<_, OrphanSubscriptionRow>(
            r#"
            SELECT s.id AS subscription_id, s.user_id, s.tier_id
            FROM subscriptions s
            LEFT JOIN subscription_tiers t ON t.id = s.tier_id
            WHERE t.id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "no_orphan_subscriptions".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "Subscription {} references missing tier {}",
                    row.subscription_id, row.tier_id
                ),
                context: serde_json::json!({
                    "subscription_id": row.subscription_id,
                    "tier_id": row.tier_id,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }
}
