//! Shared types and database plumbing for the portal workspace.
//!
//! Everything here is consumed by both the loyalty engine and the API server:
//! pool construction, embedded migrations, and the small enums that cross
//! crate boundaries.

mod db;
mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use types::{SubscriptionStatus, TierType};
