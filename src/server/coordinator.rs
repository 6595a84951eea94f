//! Transactional application of sync batches.
//!
//! Each request is applied inside one transaction, under a per-user async
//! mutex so two devices of the same user cannot interleave. A single
//! batch timestamp is captured up front and used for every row written
//! and for the response watermark, so `synced_at` covers exactly the rows
//! this batch touched. Per-record failures are caught and reported in
//! `conflicts` instead of failing the whole batch.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::protocol::{
    ChangeRecord, DailyLogPayload, EntityKind, GoalPayload, ServerChanges, SyncAck, SyncConflict,
    SyncRequest, SyncResponse, SyncStatus, SyncedData,
};
use crate::server::db::format_ts;
use crate::server::entity_store::EntityStore;

pub struct SyncCoordinator {
    pool: SqlitePool,
    locks: StdMutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl SyncCoordinator {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(user_id).or_default().clone()
    }

    /// Applies the batch and answers with acks, conflicts and the outbound
    /// delta relative to the client's watermark.
    pub async fn sync(
        &self,
        user_id: i64,
        request: SyncRequest,
    ) -> Result<SyncResponse, sqlx::Error> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let applied_at = Utc::now();

        let mut tx = self.pool.begin().await?;
        let synced = apply_batch(&mut tx, user_id, applied_at, &request.changes).await?;

        sqlx::query("UPDATE users SET last_sync_at = ? WHERE id = ?")
            .bind(format_ts(applied_at))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        // The delta is relative to the client's watermark, so the rows this
        // batch just wrote come back in it. The client merges the echo and
        // then advances its watermark to synced_at, which matches the
        // updated_at of every echoed row, so nothing is delivered twice.
        let store = EntityStore::new(self.pool.clone());
        let server_changes = ServerChanges {
            goals: store.goals_since(user_id, request.last_sync_at).await?,
            daily_logs: store
                .daily_logs_since(user_id, request.last_sync_at)
                .await?,
        };

        tracing::info!(
            user_id,
            applied = request.changes.len(),
            conflicts = synced.conflicts.len(),
            outbound_goals = server_changes.goals.len(),
            outbound_logs = server_changes.daily_logs.len(),
            "sync batch applied"
        );

        Ok(SyncResponse {
            synced,
            server_changes,
            synced_at: applied_at,
        })
    }
}

/// Applies every change in order. Separate from [`SyncCoordinator::sync`]
/// so the surrounding transaction is visible to tests.
pub(crate) async fn apply_batch(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    applied_at: DateTime<Utc>,
    changes: &[ChangeRecord],
) -> Result<SyncedData, sqlx::Error> {
    let mut synced = SyncedData::default();
    let ts = format_ts(applied_at);

    for change in changes {
        match change {
            ChangeRecord::CreateGoal { client_id, data } => {
                record(
                    &mut synced,
                    EntityKind::Goal,
                    *client_id,
                    create_goal(tx, user_id, &ts, *client_id, data).await,
                );
            }
            ChangeRecord::UpdateGoal { client_id, data } => {
                record(
                    &mut synced,
                    EntityKind::Goal,
                    *client_id,
                    update_goal(tx, user_id, &ts, *client_id, data).await,
                );
            }
            ChangeRecord::DeleteGoal { client_id } => {
                record(
                    &mut synced,
                    EntityKind::Goal,
                    *client_id,
                    delete_goal(tx, user_id, &ts, *client_id).await,
                );
            }
            ChangeRecord::CreateDailyLog { client_id, data } => {
                let result = create_daily_log(tx, user_id, &ts, *client_id, data).await;
                if let Ok(ack) = &result {
                    if ack.status == SyncStatus::GoalNotFound {
                        // Reported both as an ack and as a conflict entry.
                        synced.conflicts.push(SyncConflict {
                            client_id: *client_id,
                            entity_type: EntityKind::DailyLog,
                            error: format!("goal {} not found", data.goal_client_id),
                        });
                    }
                }
                record(&mut synced, EntityKind::DailyLog, *client_id, result);
            }
            ChangeRecord::UpdateDailyLog { client_id, data } => {
                record(
                    &mut synced,
                    EntityKind::DailyLog,
                    *client_id,
                    update_daily_log(tx, user_id, &ts, *client_id, data).await,
                );
            }
            ChangeRecord::DeleteDailyLog { client_id } => {
                record(
                    &mut synced,
                    EntityKind::DailyLog,
                    *client_id,
                    delete_daily_log(tx, user_id, &ts, *client_id).await,
                );
            }
        }
    }

    Ok(synced)
}

/// Routes one record's outcome into the acks or, on a caught database
/// error, into the conflict list.
fn record(
    synced: &mut SyncedData,
    kind: EntityKind,
    client_id: Uuid,
    result: Result<SyncAck, sqlx::Error>,
) {
    match result {
        Ok(ack) => match kind {
            EntityKind::Goal => synced.goals.push(ack),
            EntityKind::DailyLog => synced.daily_logs.push(ack),
        },
        Err(e) => {
            tracing::warn!(%client_id, entity = %kind, "record failed: {}", e);
            synced.conflicts.push(SyncConflict {
                client_id,
                entity_type: kind,
                error: e.to_string(),
            });
        }
    }
}

async fn goal_id_by_client_id(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    client_id: Uuid,
) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM goals WHERE user_id = ? AND client_id = ?")
            .bind(user_id)
            .bind(client_id.to_string())
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|(id,)| id))
}

async fn create_goal(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    ts: &str,
    client_id: Uuid,
    data: &GoalPayload,
) -> Result<SyncAck, sqlx::Error> {
    // Retried batches must not duplicate rows.
    if let Some(id) = goal_id_by_client_id(tx, user_id, client_id).await? {
        return Ok(SyncAck {
            client_id,
            server_id: Some(id),
            status: SyncStatus::AlreadyExists,
        });
    }

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO goals (user_id, client_id, title, description, start_date,
                           duration_days, color, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(client_id.to_string())
    .bind(&data.title)
    .bind(&data.description)
    .bind(data.start_date.to_string())
    .bind(data.duration_days)
    .bind(&data.color)
    .bind(ts)
    .bind(ts)
    .fetch_one(&mut **tx)
    .await?;

    Ok(SyncAck {
        client_id,
        server_id: Some(id),
        status: SyncStatus::Created,
    })
}

async fn update_goal(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    ts: &str,
    client_id: Uuid,
    data: &GoalPayload,
) -> Result<SyncAck, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE goals
        SET title = ?, description = ?, start_date = ?, duration_days = ?,
            color = ?, updated_at = ?
        WHERE user_id = ? AND client_id = ? AND deleted_at IS NULL
        RETURNING id
        "#,
    )
    .bind(&data.title)
    .bind(&data.description)
    .bind(data.start_date.to_string())
    .bind(data.duration_days)
    .bind(&data.color)
    .bind(ts)
    .bind(user_id)
    .bind(client_id.to_string())
    .fetch_optional(&mut **tx)
    .await?;

    Ok(match row {
        Some((id,)) => SyncAck {
            client_id,
            server_id: Some(id),
            status: SyncStatus::Updated,
        },
        None => SyncAck {
            client_id,
            server_id: None,
            status: SyncStatus::NotFound,
        },
    })
}

async fn delete_goal(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    ts: &str,
    client_id: Uuid,
) -> Result<SyncAck, sqlx::Error> {
    // Idempotent: deleting an absent or already-deleted goal still acks.
    sqlx::query(
        r#"
        UPDATE goals SET deleted_at = ?, updated_at = ?, is_active = 0
        WHERE user_id = ? AND client_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(ts)
    .bind(ts)
    .bind(user_id)
    .bind(client_id.to_string())
    .execute(&mut **tx)
    .await?;

    let server_id = goal_id_by_client_id(tx, user_id, client_id).await?;
    Ok(SyncAck {
        client_id,
        server_id,
        status: SyncStatus::Deleted,
    })
}

async fn create_daily_log(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    ts: &str,
    client_id: Uuid,
    data: &DailyLogPayload,
) -> Result<SyncAck, sqlx::Error> {
    let goal_row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM goals WHERE user_id = ? AND client_id = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(data.goal_client_id.to_string())
    .fetch_optional(&mut **tx)
    .await?;

    let goal_id = match goal_row {
        Some((id,)) => id,
        // No partial row is written for an unresolvable goal.
        None => {
            return Ok(SyncAck {
                client_id,
                server_id: None,
                status: SyncStatus::GoalNotFound,
            })
        }
    };

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM daily_logs WHERE user_id = ? AND client_id = ?")
            .bind(user_id)
            .bind(client_id.to_string())
            .fetch_optional(&mut **tx)
            .await?;
    if let Some((id,)) = existing {
        return Ok(SyncAck {
            client_id,
            server_id: Some(id),
            status: SyncStatus::AlreadyExists,
        });
    }

    // One log per (goal, date). A second device creating the same day
    // merges into the existing row: the row keeps its identity, the
    // incoming notes and children win.
    let same_day: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM daily_logs WHERE goal_id = ? AND log_date = ?")
            .bind(goal_id)
            .bind(data.log_date.to_string())
            .fetch_optional(&mut **tx)
            .await?;

    let log_id = match same_day {
        Some((id,)) => {
            sqlx::query(
                "UPDATE daily_logs SET notes = ?, updated_at = ?, deleted_at = NULL WHERE id = ?",
            )
            .bind(&data.notes)
            .bind(ts)
            .bind(id)
            .execute(&mut **tx)
            .await?;
            id
        }
        None => {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO daily_logs (goal_id, user_id, client_id, log_date,
                                        notes, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(goal_id)
            .bind(user_id)
            .bind(client_id.to_string())
            .bind(data.log_date.to_string())
            .bind(&data.notes)
            .bind(ts)
            .bind(ts)
            .fetch_one(&mut **tx)
            .await?;
            id
        }
    };

    replace_children(tx, log_id, data).await?;

    Ok(SyncAck {
        client_id,
        server_id: Some(log_id),
        status: SyncStatus::Created,
    })
}

async fn update_daily_log(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    ts: &str,
    client_id: Uuid,
    data: &DailyLogPayload,
) -> Result<SyncAck, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE daily_logs SET notes = ?, updated_at = ?
        WHERE user_id = ? AND client_id = ? AND deleted_at IS NULL
        RETURNING id
        "#,
    )
    .bind(&data.notes)
    .bind(ts)
    .bind(user_id)
    .bind(client_id.to_string())
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some((id,)) => {
            replace_children(tx, id, data).await?;
            Ok(SyncAck {
                client_id,
                server_id: Some(id),
                status: SyncStatus::Updated,
            })
        }
        None => Ok(SyncAck {
            client_id,
            server_id: None,
            status: SyncStatus::NotFound,
        }),
    }
}

async fn delete_daily_log(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    ts: &str,
    client_id: Uuid,
) -> Result<SyncAck, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE daily_logs SET deleted_at = ?, updated_at = ?
        WHERE user_id = ? AND client_id = ? AND deleted_at IS NULL
        RETURNING id
        "#,
    )
    .bind(ts)
    .bind(ts)
    .bind(user_id)
    .bind(client_id.to_string())
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((id,)) = row {
        // Tombstones keep identity only.
        clear_children(tx, id).await?;
    }

    let server_id: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM daily_logs WHERE user_id = ? AND client_id = ?")
            .bind(user_id)
            .bind(client_id.to_string())
            .fetch_optional(&mut **tx)
            .await?;

    Ok(SyncAck {
        client_id,
        server_id: server_id.map(|(id,)| id),
        status: SyncStatus::Deleted,
    })
}

async fn clear_children(
    tx: &mut Transaction<'_, Sqlite>,
    log_id: i64,
) -> Result<(), sqlx::Error> {
    for table in ["log_activities", "log_good_things", "log_future_plans"] {
        sqlx::query(&format!("DELETE FROM {} WHERE daily_log_id = ?", table))
            .bind(log_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Child collections have no identity of their own and are replaced
/// wholesale with the incoming payload. Attachments are server-managed
/// and left alone.
async fn replace_children(
    tx: &mut Transaction<'_, Sqlite>,
    log_id: i64,
    data: &DailyLogPayload,
) -> Result<(), sqlx::Error> {
    clear_children(tx, log_id).await?;

    for activity in &data.activities {
        sqlx::query("INSERT INTO log_activities (daily_log_id, activity) VALUES (?, ?)")
            .bind(log_id)
            .bind(activity)
            .execute(&mut **tx)
            .await?;
    }

    for good_thing in &data.good_things {
        sqlx::query("INSERT INTO log_good_things (daily_log_id, description) VALUES (?, ?)")
            .bind(log_id)
            .bind(good_thing)
            .execute(&mut **tx)
            .await?;
    }

    for plan in &data.future_plans {
        sqlx::query(
            "INSERT INTO log_future_plans (daily_log_id, title, description, planned_date) VALUES (?, ?, ?, ?)",
        )
        .bind(log_id)
        .bind(&plan.title)
        .bind(&plan.description)
        .bind(plan.planned_date.map(|d| d.to_string()))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
