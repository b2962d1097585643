//! Aggregations over a user's task rows.
//!
//! All functions here are pure: they take the rows and the current moment and compute the figures served by
//! [`AnalyticsService`](super::AnalyticsService) and [`TaskService::stats`](super::TaskService::stats).

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::DateTime;
use chrono::Datelike;
use chrono::Duration as ChronoDuration;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use super::entity::Task;
use super::entity::TaskPriority;
use super::entity::TaskStatus;
use super::TaskFlowError;

/// Grouping key of tasks without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Days of history covered by the productivity report, also the maximum number of its rows.
pub const PRODUCTIVITY_DAYS: i64 = 30;

/// A percentage or an average, rounded to one decimal.
///
/// Serialized as a JSON number: whole values as integers (`0`, `100`), the rest with one decimal (`66.7`).
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Rate(f64);

impl Rate {
    pub const ZERO: Rate = Rate(0.0);

    /// `part / total * 100`; zero if there is nothing to count.
    pub fn percent(part: u64, total: u64) -> Self {
        if total == 0 {
            Self::ZERO
        }
        else {
            Self::rounded(part as f64 / total as f64 * 100.0)
        }
    }

    /// `sum / count`; zero if there is nothing to count.
    pub fn average(sum: u64, count: usize) -> Self {
        if count == 0 {
            Self::ZERO
        }
        else {
            Self::rounded(sum as f64 / count as f64)
        }
    }

    pub fn rounded(value: f64) -> Self {
        if value.is_finite() {
            Self((value * 10.0).round() / 10.0)
        }
        else {
            Self::ZERO
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Serialize for Rate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Both bounds are well within the range where f64 represents integers exactly.
        if self.0.fract() == 0.0 && self.0.abs() < 1e15 {
            serializer.serialize_i64(self.0 as i64)
        }
        else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        f64::deserialize(deserializer).map(Self::rounded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_tasks:           u64,
    pub completed_tasks:       u64,
    pub pending_tasks:         u64,
    pub in_progress_tasks:     u64,
    pub overdue_tasks:         u64,
    pub high_priority_tasks:   u64,
    pub medium_priority_tasks: u64,
    pub low_priority_tasks:    u64,
    pub completion_rate:       Rate,
}

/// Plain counters of [`TaskService::stats`](super::TaskService::stats).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total_tasks:       u64,
    pub completed_tasks:   u64,
    pub pending_tasks:     u64,
    pub in_progress_tasks: u64,
    pub overdue_tasks:     u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date:            NaiveDate,
    pub tasks_created:   u64,
    pub tasks_completed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Productivity {
    /// Newest day first.
    pub daily_stats:          Vec<DailyStat>,
    pub avg_daily_completion: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category:          String,
    pub total_tasks:       u64,
    pub completed_tasks:   u64,
    pub pending_tasks:     u64,
    pub in_progress_tasks: u64,
    pub completion_rate:   Rate,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
pub enum TrendPeriod {
    #[default]
    #[serde(rename = "7d")]
    #[strum(serialize = "7d")]
    Week,
    #[serde(rename = "30d")]
    #[strum(serialize = "30d")]
    Month,
    #[serde(rename = "90d")]
    #[strum(serialize = "90d")]
    Quarter,
}

impl TrendPeriod {
    pub const ALL: [TrendPeriod; 3] = [TrendPeriod::Week, TrendPeriod::Month, TrendPeriod::Quarter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
        }
    }

    /// Start of the bucket a moment falls into: the day for the short periods, the week starting on Monday for the
    /// long one.
    pub fn bucket_of(&self, at: DateTime<Utc>) -> NaiveDate {
        let day = at.date_naive();
        match self {
            Self::Week | Self::Month => day,
            Self::Quarter => day - ChronoDuration::days(i64::from(day.weekday().num_days_from_monday())),
        }
    }
}

impl std::str::FromStr for TrendPeriod {
    type Err = TaskFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| TaskFlowError::InvalidPeriod(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Bucket start.
    pub period:          NaiveDate,
    pub completed_tasks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trends {
    pub period: TrendPeriod,
    /// Oldest bucket first.
    pub data:   Vec<TrendPoint>,
}

pub fn task_stats(tasks: &[Task], now: DateTime<Utc>) -> TaskStats {
    let mut stats = TaskStats::default();
    for task in tasks {
        stats.total_tasks += 1;
        match task.status {
            TaskStatus::Completed => stats.completed_tasks += 1,
            TaskStatus::Pending => stats.pending_tasks += 1,
            TaskStatus::InProgress => stats.in_progress_tasks += 1,
        }
        if task.is_overdue(now) {
            stats.overdue_tasks += 1;
        }
    }
    stats
}

pub fn overview(tasks: &[Task], now: DateTime<Utc>) -> Overview {
    let counts = task_stats(tasks, now);
    let by_priority = |priority| tasks.iter().filter(|t| t.priority == priority).count() as u64;

    Overview {
        total_tasks:           counts.total_tasks,
        completed_tasks:       counts.completed_tasks,
        pending_tasks:         counts.pending_tasks,
        in_progress_tasks:     counts.in_progress_tasks,
        overdue_tasks:         counts.overdue_tasks,
        high_priority_tasks:   by_priority(TaskPriority::High),
        medium_priority_tasks: by_priority(TaskPriority::Medium),
        low_priority_tasks:    by_priority(TaskPriority::Low),
        completion_rate:       Rate::percent(counts.completed_tasks, counts.total_tasks),
    }
}

pub fn productivity(tasks: &[Task], now: DateTime<Utc>) -> Productivity {
    let since = now - ChronoDuration::days(PRODUCTIVITY_DAYS);
    let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();

    for task in tasks.iter().filter(|t| t.created_at >= since) {
        let day = days.entry(task.created_at.date_naive()).or_default();
        day.0 += 1;
        if task.is_completed() {
            day.1 += 1;
        }
    }

    let daily_stats = days
        .into_iter()
        .rev()
        .take(PRODUCTIVITY_DAYS as usize)
        .map(|(date, (created, completed))| DailyStat {
            date,
            tasks_created: created,
            tasks_completed: completed,
        })
        .collect::<Vec<_>>();

    let completed: u64 = daily_stats.iter().map(|d| d.tasks_completed).sum();
    let avg_daily_completion = Rate::average(completed, daily_stats.len());

    Productivity {
        daily_stats,
        avg_daily_completion,
    }
}

pub fn categories(tasks: &[Task]) -> Vec<CategoryStat> {
    let mut groups: HashMap<Option<&str>, CategoryStat> = HashMap::new();

    for task in tasks {
        let stat = groups.entry(task.category.as_deref()).or_insert_with(|| CategoryStat {
            category:          task.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string()),
            total_tasks:       0,
            completed_tasks:   0,
            pending_tasks:     0,
            in_progress_tasks: 0,
            completion_rate:   Rate::ZERO,
        });
        stat.total_tasks += 1;
        match task.status {
            TaskStatus::Completed => stat.completed_tasks += 1,
            TaskStatus::Pending => stat.pending_tasks += 1,
            TaskStatus::InProgress => stat.in_progress_tasks += 1,
        }
    }

    let mut stats = groups
        .into_values()
        .map(|mut stat| {
            stat.completion_rate = Rate::percent(stat.completed_tasks, stat.total_tasks);
            stat
        })
        .collect::<Vec<_>>();
    stats.sort_by(|a, b| b.total_tasks.cmp(&a.total_tasks).then_with(|| a.category.cmp(&b.category)));
    stats
}

/// Completed tasks per bucket, by the time they were last updated.
pub fn trends(tasks: &[Task], period: TrendPeriod, now: DateTime<Utc>) -> Trends {
    let since = now - ChronoDuration::days(period.days());
    let mut buckets: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for task in tasks.iter().filter(|t| t.is_completed() && t.updated_at >= since) {
        *buckets.entry(period.bucket_of(task.updated_at)).or_default() += 1;
    }

    Trends {
        period,
        data: buckets
            .into_iter()
            .map(|(period, completed_tasks)| TrendPoint {
                period,
                completed_tasks,
            })
            .collect(),
    }
}
