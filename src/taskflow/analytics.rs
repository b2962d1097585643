use std::sync::Arc;

use chrono::Utc;
use fieldx::fxstruct;
use sea_orm::ColumnTrait;
use sea_orm::DatabaseConnection;
use sea_orm::EntityTrait;
use sea_orm::QueryFilter;
use tracing::instrument;

use super::entity::task;
use super::entity::Task;
use super::stats;
use super::stats::CategoryStat;
use super::stats::Overview;
use super::stats::Productivity;
use super::stats::TrendPeriod;
use super::stats::Trends;
use super::Result;
use super::ANALYTICS;
use super::CATEGORIES;
use super::OVERVIEW;
use super::PRODUCTIVITY;
use super::TRENDS;
use crate::cache::ResourceCache;
use crate::key::CacheKey;
use crate::key::OwnerId;
use crate::types::InvalidationReport;
use crate::types::StatusEntry;

/// Analytics resources which can be cleared one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum AnalyticsResource {
    Overview,
    Productivity,
    Categories,
    /// All trend periods at once.
    Trends,
}

impl AnalyticsResource {
    pub fn resource_name(&self) -> &'static str {
        match self {
            Self::Overview => OVERVIEW,
            Self::Productivity => PRODUCTIVITY,
            Self::Categories => CATEGORIES,
            Self::Trends => TRENDS,
        }
    }
}

/// Cached per-user task analytics.
#[fxstruct(sync, no_new, builder)]
pub struct AnalyticsService {
    #[fieldx(get)]
    db: DatabaseConnection,

    #[fieldx(get(clone))]
    cache: Arc<ResourceCache>,
}

impl AnalyticsService {
    async fn user_tasks(db: &DatabaseConnection, user_id: OwnerId) -> Result<Vec<Task>, sea_orm::DbErr> {
        task::Entity::find()
            .filter(task::Column::UserId.eq(user_id))
            .all(db)
            .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn overview(&self, user_id: OwnerId) -> Result<Overview> {
        let db = self.db();
        Ok(self
            .cache()
            .fetch(ANALYTICS, OVERVIEW, user_id, None, || async move {
                let tasks = Self::user_tasks(db, user_id).await?;
                Ok::<_, sea_orm::DbErr>(stats::overview(&tasks, Utc::now()))
            })
            .await?)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn productivity(&self, user_id: OwnerId) -> Result<Productivity> {
        let db = self.db();
        Ok(self
            .cache()
            .fetch(ANALYTICS, PRODUCTIVITY, user_id, None, || async move {
                let tasks = Self::user_tasks(db, user_id).await?;
                Ok::<_, sea_orm::DbErr>(stats::productivity(&tasks, Utc::now()))
            })
            .await?)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn categories(&self, user_id: OwnerId) -> Result<Vec<CategoryStat>> {
        let db = self.db();
        Ok(self
            .cache()
            .fetch(ANALYTICS, CATEGORIES, user_id, None, || async move {
                let tasks = Self::user_tasks(db, user_id).await?;
                Ok::<_, sea_orm::DbErr>(stats::categories(&tasks))
            })
            .await?)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn trends(&self, user_id: OwnerId, period: TrendPeriod) -> Result<Trends> {
        let db = self.db();
        Ok(self
            .cache()
            .fetch(ANALYTICS, TRENDS, user_id, Some(period.as_str()), || async move {
                let tasks = Self::user_tasks(db, user_id).await?;
                Ok::<_, sea_orm::DbErr>(stats::trends(&tasks, period, Utc::now()))
            })
            .await?)
    }

    /// Trends for a period given by its name; no period means `7d`. Unknown names are rejected before the cache is
    /// consulted.
    pub async fn trends_for(&self, user_id: OwnerId, period: Option<&str>) -> Result<Trends> {
        let period = match period {
            Some(period) => period.parse::<TrendPeriod>()?,
            None => TrendPeriod::default(),
        };
        self.trends(user_id, period).await
    }

    /// Drop cached analytics of the user: a single resource with all its variants, or everything.
    #[instrument(level = "debug", skip(self))]
    pub async fn clear_cache(
        &self,
        user_id: OwnerId,
        resource: Option<AnalyticsResource>,
    ) -> Result<InvalidationReport> {
        let cache = self.cache();
        Ok(match resource {
            Some(resource) => {
                cache
                    .invalidate_all(ANALYTICS, resource.resource_name(), user_id)
                    .await?
            }
            None => cache.invalidate_namespace(ANALYTICS, user_id).await?,
        })
    }

    /// State of every analytics entry of the user, in the order overview, productivity, categories, then trends by
    /// period. [`StatusEntry::label`] gives `overview`, ..., `trends:7d`.
    pub async fn cache_status(&self, user_id: OwnerId) -> Result<Vec<StatusEntry>> {
        let cache = self.cache();
        let mut keys = [OVERVIEW, PRODUCTIVITY, CATEGORIES]
            .into_iter()
            .map(|resource| cache.key(ANALYTICS, resource, user_id, None))
            .collect::<Result<Vec<CacheKey>, _>>()?;
        for period in TrendPeriod::ALL {
            keys.push(cache.key(ANALYTICS, TRENDS, user_id, Some(period.as_str()))?);
        }
        Ok(cache.status_of(&keys).await?)
    }
}
