//! Read access to synced entities.
//!
//! All queries are scoped to one user. Delta queries come in two shapes:
//! a bootstrap read (no watermark) that returns every live record and no
//! tombstones, and an incremental read that returns everything touched
//! after the watermark, tombstones included. Children are only hydrated
//! for live logs; a tombstone carries identity and nothing else.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::protocol::{FuturePlanPayload, ServerAttachment, ServerDailyLog, ServerGoal};
use crate::server::db::{format_ts, parse_ts};

pub struct EntityStore {
    pool: SqlitePool,
}

// Row types for database queries
#[derive(sqlx::FromRow)]
pub(crate) struct GoalRow {
    pub id: i64,
    pub client_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: String,
    pub duration_days: i64,
    pub color: String,
    pub is_active: i64,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DailyLogRow {
    pub id: i64,
    pub goal_id: i64,
    pub goal_client_id: String,
    pub client_id: String,
    pub log_date: String,
    pub notes: Option<String>,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct FuturePlanRow {
    title: String,
    description: Option<String>,
    planned_date: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: i64,
    file_name: String,
    file_path: String,
    file_type: Option<String>,
    file_size: Option<i64>,
}

fn parse_date(s: &str) -> NaiveDate {
    s.parse().unwrap_or_default()
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_default()
}

pub(crate) fn goal_to_wire(row: GoalRow) -> ServerGoal {
    ServerGoal {
        id: row.id,
        client_id: parse_uuid(&row.client_id),
        title: row.title,
        description: row.description,
        start_date: parse_date(&row.start_date),
        duration_days: row.duration_days as i32,
        color: row.color,
        is_active: row.is_active != 0,
        updated_at: parse_ts(&row.updated_at).unwrap_or_else(|_| Utc::now()),
        is_deleted: row.deleted_at.is_some(),
    }
}

impl EntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the user's sync watermark, if any sync has completed.
    pub async fn watermark(&self, user_id: i64) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT last_sync_at FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .and_then(|(ts,)| ts)
            .and_then(|ts| parse_ts(&ts).ok()))
    }

    /// Goals changed since the watermark, or every live goal on bootstrap.
    pub async fn goals_since(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ServerGoal>, sqlx::Error> {
        let rows: Vec<GoalRow> = match since {
            Some(ts) => {
                sqlx::query_as(
                    "SELECT * FROM goals WHERE user_id = ? AND updated_at > ? ORDER BY updated_at",
                )
                .bind(user_id)
                .bind(format_ts(ts))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM goals WHERE user_id = ? AND deleted_at IS NULL ORDER BY updated_at",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(goal_to_wire).collect())
    }

    /// Daily logs changed since the watermark, children hydrated for live
    /// rows.
    pub async fn daily_logs_since(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ServerDailyLog>, sqlx::Error> {
        let base = r#"
            SELECT l.id, l.goal_id, g.client_id AS goal_client_id, l.client_id,
                   l.log_date, l.notes, l.updated_at, l.deleted_at
            FROM daily_logs l
            JOIN goals g ON g.id = l.goal_id
        "#;

        let rows: Vec<DailyLogRow> = match since {
            Some(ts) => {
                sqlx::query_as(&format!(
                    "{} WHERE l.user_id = ? AND l.updated_at > ? ORDER BY l.updated_at",
                    base
                ))
                .bind(user_id)
                .bind(format_ts(ts))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "{} WHERE l.user_id = ? AND l.deleted_at IS NULL ORDER BY l.updated_at",
                    base
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut logs = Vec::with_capacity(rows.len());
        for row in rows {
            logs.push(self.hydrate_log(row).await?);
        }
        Ok(logs)
    }

    /// Every live goal for the user, for the REST listing.
    pub async fn list_goals(&self, user_id: i64) -> Result<Vec<ServerGoal>, sqlx::Error> {
        let rows: Vec<GoalRow> = sqlx::query_as(
            "SELECT * FROM goals WHERE user_id = ? AND deleted_at IS NULL ORDER BY start_date, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(goal_to_wire).collect())
    }

    pub async fn get_goal(
        &self,
        user_id: i64,
        goal_id: i64,
    ) -> Result<Option<ServerGoal>, sqlx::Error> {
        let row: Option<GoalRow> = sqlx::query_as(
            "SELECT * FROM goals WHERE user_id = ? AND id = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(goal_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(goal_to_wire))
    }

    /// Number of live logs recorded against a goal.
    pub async fn logged_days(&self, user_id: i64, goal_id: i64) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM daily_logs WHERE user_id = ? AND goal_id = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(goal_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Live logs for one goal, oldest first.
    pub async fn logs_for_goal(
        &self,
        user_id: i64,
        goal_id: i64,
    ) -> Result<Vec<ServerDailyLog>, sqlx::Error> {
        let rows: Vec<DailyLogRow> = sqlx::query_as(
            r#"
            SELECT l.id, l.goal_id, g.client_id AS goal_client_id, l.client_id,
                   l.log_date, l.notes, l.updated_at, l.deleted_at
            FROM daily_logs l
            JOIN goals g ON g.id = l.goal_id
            WHERE l.user_id = ? AND l.goal_id = ? AND l.deleted_at IS NULL
            ORDER BY l.log_date
            "#,
        )
        .bind(user_id)
        .bind(goal_id)
        .fetch_all(&self.pool)
        .await?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in rows {
            logs.push(self.hydrate_log(row).await?);
        }
        Ok(logs)
    }

    async fn hydrate_log(&self, row: DailyLogRow) -> Result<ServerDailyLog, sqlx::Error> {
        let is_deleted = row.deleted_at.is_some();

        let mut log = ServerDailyLog {
            id: row.id,
            goal_id: row.goal_id,
            goal_client_id: parse_uuid(&row.goal_client_id),
            client_id: parse_uuid(&row.client_id),
            log_date: parse_date(&row.log_date),
            notes: row.notes,
            updated_at: parse_ts(&row.updated_at).unwrap_or_else(|_| Utc::now()),
            is_deleted,
            activities: Vec::new(),
            good_things: Vec::new(),
            future_plans: Vec::new(),
            attachments: Vec::new(),
        };

        if is_deleted {
            // Tombstones carry identity only.
            log.notes = None;
            return Ok(log);
        }

        let activities: Vec<(String,)> =
            sqlx::query_as("SELECT activity FROM log_activities WHERE daily_log_id = ? ORDER BY id")
                .bind(row.id)
                .fetch_all(&self.pool)
                .await?;
        log.activities = activities.into_iter().map(|(a,)| a).collect();

        let good_things: Vec<(String,)> = sqlx::query_as(
            "SELECT description FROM log_good_things WHERE daily_log_id = ? ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        log.good_things = good_things.into_iter().map(|(g,)| g).collect();

        let plans: Vec<FuturePlanRow> = sqlx::query_as(
            "SELECT title, description, planned_date FROM log_future_plans WHERE daily_log_id = ? ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        log.future_plans = plans
            .into_iter()
            .map(|p| FuturePlanPayload {
                title: p.title,
                description: p.description,
                planned_date: p.planned_date.as_deref().map(parse_date),
            })
            .collect();

        let attachments: Vec<AttachmentRow> = sqlx::query_as(
            "SELECT id, file_name, file_path, file_type, file_size FROM attachments WHERE daily_log_id = ? ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        log.attachments = attachments
            .into_iter()
            .map(|a| ServerAttachment {
                id: a.id,
                file_name: a.file_name,
                file_path: a.file_path,
                file_type: a.file_type,
                file_size: a.file_size,
            })
            .collect();

        Ok(log)
    }
}
