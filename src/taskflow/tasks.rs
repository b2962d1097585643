use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use fieldx::fxstruct;
use garde::Validate;
use sea_orm::ActiveModelTrait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::ActiveValue::Set;
use sea_orm::ColumnTrait;
use sea_orm::DatabaseConnection;
use sea_orm::EntityTrait;
use sea_orm::QueryFilter;
use sea_orm::QueryOrder;
use serde::Deserialize;
use tracing::instrument;

use super::entity::task;
use super::entity::Task;
use super::entity::TaskPriority;
use super::entity::TaskStatus;
use super::stats;
use super::stats::TaskStats;
use super::Result;
use super::TaskFlowError;
use super::Written;
use super::ANALYTICS;
use super::LIST;
use super::TASKS;
use crate::cache::ResourceCache;
use crate::error::CacheError;
use crate::key::OwnerId;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewTask {
    #[garde(length(chars, min = 1, max = 255))]
    pub title:       String,
    #[serde(default)]
    #[garde(length(chars, max = 1000))]
    pub description: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 100))]
    pub category:    Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub priority:    Option<TaskPriority>,
    #[serde(default)]
    #[garde(skip)]
    pub due_date:    Option<DateTime<Utc>>,
}

/// Changes to apply to a task. `None` leaves a field as it is; for the nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, Validate)]
pub struct TaskChanges {
    /// Required; every update restates the title.
    #[garde(length(chars, min = 1, max = 255))]
    pub title:       String,
    #[garde(length(chars, max = 1000))]
    pub description: Option<Option<String>>,
    #[garde(length(chars, max = 100))]
    pub category:    Option<Option<String>>,
    #[garde(skip)]
    pub priority:    Option<TaskPriority>,
    #[garde(skip)]
    pub status:      Option<TaskStatus>,
    #[garde(skip)]
    pub due_date:    Option<Option<DateTime<Utc>>>,
}

impl TaskChanges {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn category(mut self, category: Option<&str>) -> Self {
        self.category = Some(category.map(str::to_string));
        self
    }
}

/// Task storage with a cached per-user task list.
///
/// Every mutation is committed to the database first, then the user's task list and all of the user's analytics
/// entries are dropped from the cache. Failure to drop them never fails the mutation; it is reported through
/// [`Written::cache_degraded`].
#[fxstruct(sync, no_new, builder)]
pub struct TaskService {
    #[fieldx(get)]
    db: DatabaseConnection,

    #[fieldx(get(clone))]
    cache: Arc<ResourceCache>,
}

impl TaskService {
    /// The user's tasks, newest first.
    #[instrument(level = "debug", skip(self))]
    pub async fn list(&self, user_id: OwnerId) -> Result<Vec<Task>> {
        let db = self.db();
        Ok(self
            .cache()
            .fetch(TASKS, LIST, user_id, None, || async move {
                task::Entity::find()
                    .filter(task::Column::UserId.eq(user_id))
                    .order_by_desc(task::Column::CreatedAt)
                    .order_by_desc(task::Column::Id)
                    .all(db)
                    .await
            })
            .await?)
    }

    pub async fn get(&self, user_id: OwnerId, id: i32) -> Result<Task> {
        self.find(user_id, id).await
    }

    pub async fn by_category(&self, user_id: OwnerId, category: &str) -> Result<Vec<Task>> {
        Ok(task::Entity::find()
            .filter(task::Column::UserId.eq(user_id))
            .filter(task::Column::Category.eq(category))
            .order_by_desc(task::Column::CreatedAt)
            .order_by_desc(task::Column::Id)
            .all(self.db())
            .await?)
    }

    pub async fn stats(&self, user_id: OwnerId) -> Result<TaskStats> {
        let tasks = task::Entity::find()
            .filter(task::Column::UserId.eq(user_id))
            .all(self.db())
            .await?;
        Ok(stats::task_stats(&tasks, Utc::now()))
    }

    #[instrument(level = "debug", skip(self, new_task), fields(title = %new_task.title))]
    pub async fn create(&self, user_id: OwnerId, new_task: NewTask) -> Result<Written<Task>> {
        validated(&new_task)?;
        let now = Utc::now();

        let created = task::ActiveModel {
            id:          NotSet,
            user_id:     Set(user_id),
            title:       Set(new_task.title),
            description: Set(new_task.description),
            category:    Set(new_task.category),
            priority:    Set(new_task.priority.unwrap_or_default()),
            status:      Set(TaskStatus::Pending),
            due_date:    Set(new_task.due_date),
            created_at:  Set(now),
            updated_at:  Set(now),
        }
        .insert(self.db())
        .await?;

        self.written(user_id, created).await
    }

    #[instrument(level = "debug", skip(self, changes))]
    pub async fn update(&self, user_id: OwnerId, id: i32, changes: TaskChanges) -> Result<Written<Task>> {
        validated(&changes)?;
        let mut active: task::ActiveModel = self.find(user_id, id).await?.into();

        active.title = Set(changes.title);
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(category) = changes.category {
            active.category = Set(category);
        }
        if let Some(priority) = changes.priority {
            active.priority = Set(priority);
        }
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        if let Some(due_date) = changes.due_date {
            active.due_date = Set(due_date);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(self.db()).await?;
        self.written(user_id, updated).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn delete(&self, user_id: OwnerId, id: i32) -> Result<Written<()>> {
        let deleted = task::Entity::delete_many()
            .filter(task::Column::Id.eq(id))
            .filter(task::Column::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        if deleted.rows_affected == 0 {
            return Err(TaskFlowError::NotFound { id });
        }

        self.written(user_id, ()).await
    }

    async fn find(&self, user_id: OwnerId, id: i32) -> Result<Task> {
        task::Entity::find_by_id(id)
            .filter(task::Column::UserId.eq(user_id))
            .one(self.db())
            .await?
            .ok_or(TaskFlowError::NotFound { id })
    }

    /// Drop everything a task mutation may have made stale.
    async fn written<T>(&self, user_id: OwnerId, value: T) -> Result<Written<T>> {
        let cache = self.cache();
        let policies = cache.policies();
        let mut keys = policies.keys_for(TASKS, LIST, user_id)?;
        keys.extend(policies.namespace_keys(ANALYTICS, user_id)?);

        let cache_degraded = match cache.invalidate_keys(&keys).await {
            Ok(report) => !report.is_complete(),
            Err(err @ CacheError::InvalidationFailed { .. }) => {
                tracing::debug!(%err, "task mutation left stale cache entries");
                true
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Written { value, cache_degraded })
    }
}

fn validated<T: Validate<Context = ()>>(input: &T) -> Result<()> {
    input
        .validate()
        .map_err(|report| TaskFlowError::Validation(report.to_string().trim_end().to_string()))
}
