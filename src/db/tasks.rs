//! Task model and database operations
//!
//! One repository serves both the CRUD routes and the sync engine. It works
//! against a plain connection so the sync coordinator can run every call of
//! a sync exchange inside a single transaction.

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::sqlite::SqliteConnection;

use crate::error::{AppError, Result};

/// A task in the Eisenhower matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Quadrant 0-3: urgent+important, important, urgent, neither.
    /// Deliberately loose (plain integer, unlike [`RepeatType`]): the wire
    /// contract has always accepted any int here, and rejecting unknown
    /// values would fail whole sync batches from older clients.
    pub quadrant: i64,
    pub completed: bool,
    pub archived: bool,
    /// Epoch milliseconds
    pub due_date: Option<i64>,
    pub repeat_type: Option<RepeatType>,
    /// Epoch milliseconds, set once
    pub created_at: i64,
    /// Epoch milliseconds, strictly increases on every mutation
    pub updated_at: i64,
    pub user_id: i64,
}

/// Task recurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RepeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatType::Daily => "daily",
            RepeatType::Weekly => "weekly",
            RepeatType::Monthly => "monthly",
            RepeatType::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(RepeatType::Daily),
            "weekly" => Some(RepeatType::Weekly),
            "monthly" => Some(RepeatType::Monthly),
            "yearly" => Some(RepeatType::Yearly),
            _ => None,
        }
    }
}

/// Payload for creating a task. Ids are always server-assigned; any id a
/// client puts in the payload is ignored by deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quadrant: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub repeat_type: Option<RepeatType>,
}

/// Partial update fields. Absent fields are left untouched; an explicit
/// `null` clears a nullable field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quadrant: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub due_date: Option<Option<i64>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub repeat_type: Option<Option<RepeatType>>,
}

impl TaskFields {
    /// Overwrite exactly the fields present in the patch
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(quadrant) = self.quadrant {
            task.quadrant = quadrant;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(archived) = self.archived {
            task.archived = archived;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(repeat_type) = self.repeat_type {
            task.repeat_type = repeat_type;
        }
    }
}

/// A patch addressed at an existing task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPatch {
    pub id: i64,
    #[serde(flatten)]
    pub fields: TaskFields,
}

/// Distinguishes "field absent" from "field set to null"
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Filters for the task listing endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskFilter {
    pub quadrant: Option<i64>,
    pub show_archived: bool,
    /// Substring match against title or description
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
    pub repeat_type: Option<RepeatType>,
    /// Due-date window relative to the request time
    pub time_range: Option<TimeRange>,
    pub skip: i64,
    pub limit: i64,
}

impl Default for TaskFilter {
    fn default() -> Self {
        TaskFilter {
            quadrant: None,
            show_archived: false,
            search: None,
            status: None,
            repeat_type: None,
            time_range: None,
            skip: 0,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Active,
    Completed,
}

const DAY_MS: i64 = 86_400_000;

/// Due-date buckets for the listing endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Today,
    Week,
}

impl TimeRange {
    /// Half-open [start, end) window in epoch millis, on UTC day
    /// boundaries. Weeks start on Monday.
    pub fn bounds(&self, now: i64) -> (i64, i64) {
        let day = now.div_euclid(DAY_MS);
        match self {
            TimeRange::Today => (day * DAY_MS, (day + 1) * DAY_MS),
            TimeRange::Week => {
                // Day 0 (1970-01-01) was a Thursday
                let weekday = (day + 3).rem_euclid(7);
                let start = (day - weekday) * DAY_MS;
                (start, start + 7 * DAY_MS)
            }
        }
    }
}

/// Task repository
///
/// Borrows a connection so callers decide the transaction scope: routes hand
/// it a pooled connection, the sync coordinator hands it a transaction.
pub struct TaskRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TaskRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert a new task with a store-assigned id
    pub async fn insert(&mut self, user_id: i64, new: &NewTask, now: i64) -> Result<Task> {
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (title, description, quadrant, completed, archived,
                               due_date, repeat_type, created_at, updated_at, user_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.quadrant)
        .bind(new.completed)
        .bind(new.archived)
        .bind(new.due_date)
        .bind(new.repeat_type.map(|r| r.as_str()))
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;

        let id = result.last_insert_rowid();
        self.find(id, user_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch inserted task".to_string()))
    }

    /// Look up a task owned by the given user
    pub async fn find(&mut self, id: i64, user_id: i64) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, title, description, quadrant, completed, archived,
                   due_date, repeat_type, created_at, updated_at, user_id
            FROM tasks
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(row.map(TaskRow::into_task))
    }

    /// Apply a partial patch to an existing task, bumping `updated_at`.
    ///
    /// Returns `None` when the target does not exist (or belongs to someone
    /// else); the caller decides whether that is an error.
    pub async fn apply_patch(
        &mut self,
        user_id: i64,
        patch: &TaskPatch,
        now: i64,
    ) -> Result<Option<Task>> {
        let Some(mut task) = self.find(patch.id, user_id).await? else {
            return Ok(None);
        };

        patch.fields.apply_to(&mut task);
        // Strictly increasing even when two mutations land in the same
        // clock millisecond.
        task.updated_at = now.max(task.updated_at + 1);

        sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, quadrant = ?, completed = ?,
                archived = ?, due_date = ?, repeat_type = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.quadrant)
        .bind(task.completed)
        .bind(task.archived)
        .bind(task.due_date)
        .bind(task.repeat_type.map(|r| r.as_str()))
        .bind(task.updated_at)
        .bind(task.id)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(Some(task))
    }

    /// Hard-delete a task. No tombstone is kept, so other clients only
    /// observe the deletion by the row's absence.
    pub async fn delete(&mut self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All of a user's tasks mutated strictly after the watermark
    pub async fn updated_after(&mut self, user_id: i64, watermark: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, title, description, quadrant, completed, archived,
                   due_date, repeat_type, created_at, updated_at, user_id
            FROM tasks
            WHERE user_id = ? AND updated_at > ?
            ORDER BY updated_at ASC
            "#,
        )
        .bind(user_id)
        .bind(watermark)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    /// Filtered listing for a user. `now` anchors the `time_range` window.
    pub async fn list(&mut self, user_id: i64, filter: &TaskFilter, now: i64) -> Result<Vec<Task>> {
        let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, title, description, quadrant, completed, archived, \
             due_date, repeat_type, created_at, updated_at, user_id \
             FROM tasks WHERE user_id = ",
        );
        query.push_bind(user_id);

        if !filter.show_archived {
            query.push(" AND archived = 0");
        }
        if let Some(quadrant) = filter.quadrant {
            query.push(" AND quadrant = ");
            query.push_bind(quadrant);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            query.push(" AND (title LIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR description LIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
        match filter.status {
            Some(StatusFilter::Completed) => {
                query.push(" AND completed = 1");
            }
            Some(StatusFilter::Active) => {
                query.push(" AND completed = 0");
            }
            None => {}
        }
        if let Some(repeat_type) = filter.repeat_type {
            query.push(" AND repeat_type = ");
            query.push_bind(repeat_type.as_str());
        }
        if let Some(range) = filter.time_range {
            let (start, end) = range.bounds(now);
            query.push(" AND due_date >= ");
            query.push_bind(start);
            query.push(" AND due_date < ");
            query.push_bind(end);
        }
        // id breaks ties so pagination stays stable when inserts share
        // a millisecond
        query.push(" ORDER BY updated_at DESC, id DESC");
        query.push(" LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let rows = query
            .build_query_as::<TaskRow>()
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    title: String,
    description: Option<String>,
    quadrant: i64,
    completed: bool,
    archived: bool,
    due_date: Option<i64>,
    repeat_type: Option<String>,
    created_at: i64,
    updated_at: i64,
    user_id: i64,
}

impl TaskRow {
    fn into_task(self) -> Task {
        Task {
            id: self.id,
            title: self.title,
            description: self.description,
            quadrant: self.quadrant,
            completed: self.completed,
            archived: self.archived,
            due_date: self.due_date,
            repeat_type: self.repeat_type.as_deref().and_then(RepeatType::parse),
            created_at: self.created_at,
            updated_at: self.updated_at,
            user_id: self.user_id,
        }
    }
}
