//! TaskFlow resource controllers.
//!
//! [`TaskService`] owns the `tasks` table and the cached per-user task list. [`AnalyticsService`] serves the cached
//! per-user aggregates. Every task mutation drops the owner's task list and all of the owner's analytics entries, so
//! the two stay consistent with the table up to the lost-invalidation window documented at the crate level.

pub mod analytics;
pub mod entity;
pub mod migrations;
pub mod stats;
pub mod tasks;

use sea_orm::DbErr;
use thiserror::Error;

use crate::error::CacheError;
use crate::policy::CachePolicy;
use crate::policy::PolicyTable;

#[doc(inline)]
pub use analytics::AnalyticsService;
#[doc(inline)]
pub use migrations::Migrator;
#[doc(inline)]
pub use tasks::TaskService;

pub const ANALYTICS: &str = "analytics";
pub const OVERVIEW: &str = "overview";
pub const PRODUCTIVITY: &str = "productivity";
pub const CATEGORIES: &str = "categories";
pub const TRENDS: &str = "trends";

pub const TASKS: &str = "tasks";
pub const LIST: &str = "list";

/// Cache policies of the TaskFlow services.
pub fn policy_table() -> Result<PolicyTable, CacheError> {
    PolicyTable::new()
        .with(ANALYTICS, OVERVIEW, CachePolicy::new(300))?
        .with(ANALYTICS, PRODUCTIVITY, CachePolicy::new(600))?
        .with(ANALYTICS, CATEGORIES, CachePolicy::new(600))?
        .with(
            ANALYTICS,
            TRENDS,
            CachePolicy::new(900).with_variants(stats::TrendPeriod::ALL.iter().map(|p| p.as_str())),
        )?
        .with(TASKS, LIST, CachePolicy::new(300))
}

#[derive(Debug, Error)]
pub enum TaskFlowError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("task {id} not found")]
    NotFound { id: i32 },

    #[error("{0}")]
    Validation(String),

    #[error("unknown trends period '{0}', expected one of 7d, 30d, 90d")]
    InvalidPeriod(String),
}

pub type Result<T, E = TaskFlowError> = std::result::Result<T, E>;

/// Result of a task mutation.
///
/// The mutation itself has been committed. `cache_degraded` tells that some of the dependent cache entries could not
/// be dropped and will be served stale until their TTL runs out.
#[derive(Debug, Clone, PartialEq)]
pub struct Written<T> {
    pub value:          T,
    pub cache_degraded: bool,
}
