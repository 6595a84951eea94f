//! Local reconciler: folds a sync response back into the store.
//!
//! Acks attach server ids and clear pending flags; server changes are
//! merged with server-wins semantics; tombstones remove the local record.
//! The watermark only advances once the whole merge has been applied, so a
//! partial failure before that point leaves the client safe to re-sync.

use crate::protocol::{SyncResponse, SyncStatus};
use crate::store::{LocalStore, StoreAction};

/// What a single reconcile pass did, for logging and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Local records confirmed by the server this round.
    pub acknowledged: usize,
    /// Goals inserted or replaced from the server delta.
    pub goals_merged: usize,
    /// Daily logs inserted or replaced from the server delta.
    pub logs_merged: usize,
    /// Per-record conflicts reported by the server.
    pub conflicts: usize,
}

/// Applies a coordinator response to the local store.
pub fn apply_response(store: &mut LocalStore, response: &SyncResponse) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();

    for ack in &response.synced.goals {
        match ack.status {
            SyncStatus::Created | SyncStatus::AlreadyExists => {
                if let Some(server_id) = ack.server_id {
                    store.apply(StoreAction::MarkGoalSynced {
                        client_id: ack.client_id,
                        server_id,
                    });
                    summary.acknowledged += 1;
                }
            }
            SyncStatus::Updated => {
                if let Some(server_id) = ack.server_id {
                    store.apply(StoreAction::MarkGoalSynced {
                        client_id: ack.client_id,
                        server_id,
                    });
                }
                summary.acknowledged += 1;
            }
            SyncStatus::Deleted => {
                store.apply(StoreAction::RemoveGoal(ack.client_id));
                summary.acknowledged += 1;
            }
            SyncStatus::NotFound | SyncStatus::GoalNotFound => {
                // Stale local copy; surfaced, not retried.
                tracing::warn!(client_id = %ack.client_id, status = ?ack.status,
                    "goal change rejected by server");
            }
        }
    }

    for ack in &response.synced.daily_logs {
        match ack.status {
            SyncStatus::Created | SyncStatus::AlreadyExists => {
                if let Some(server_id) = ack.server_id {
                    store.apply(StoreAction::MarkLogSynced {
                        client_id: ack.client_id,
                        server_id,
                    });
                    summary.acknowledged += 1;
                }
            }
            SyncStatus::Updated => {
                if let Some(server_id) = ack.server_id {
                    store.apply(StoreAction::MarkLogSynced {
                        client_id: ack.client_id,
                        server_id,
                    });
                }
                summary.acknowledged += 1;
            }
            SyncStatus::Deleted => {
                store.apply(StoreAction::RemoveLog(ack.client_id));
                summary.acknowledged += 1;
            }
            SyncStatus::NotFound | SyncStatus::GoalNotFound => {
                tracing::warn!(client_id = %ack.client_id, status = ?ack.status,
                    "daily log change rejected by server");
            }
        }
    }

    for conflict in &response.synced.conflicts {
        tracing::warn!(
            client_id = %conflict.client_id,
            entity = %conflict.entity_type,
            error = %conflict.error,
            "sync conflict"
        );
        summary.conflicts += 1;
    }

    for goal in &response.server_changes.goals {
        store.apply(StoreAction::ApplyServerGoal(goal.clone()));
        summary.goals_merged += 1;
    }

    for log in &response.server_changes.daily_logs {
        store.apply(StoreAction::ApplyServerLog(log.clone()));
        summary.logs_merged += 1;
    }

    // Only now is it safe to consider the server state incorporated.
    store.apply(StoreAction::SyncCompleted(response.synced_at));

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyLog, Goal};
    use crate::protocol::{
        ServerChanges, ServerDailyLog, ServerGoal, SyncAck, SyncConflict, SyncedData, EntityKind,
    };
    use crate::store::StoreAction;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn empty_response() -> SyncResponse {
        SyncResponse {
            synced: SyncedData::default(),
            server_changes: ServerChanges::default(),
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_created_ack_attaches_server_id() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Read", date(2024, 1, 1), 365);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));

        let mut response = empty_response();
        response.synced.goals.push(SyncAck {
            client_id,
            server_id: Some(17),
            status: SyncStatus::Created,
        });

        let summary = apply_response(&mut store, &response);
        assert_eq!(summary.acknowledged, 1);
        let goal = store.goal(client_id).unwrap();
        assert_eq!(goal.server_id, Some(17));
        assert!(!goal.pending);
        assert_eq!(store.last_sync_at, Some(response.synced_at));
    }

    #[test]
    fn test_already_exists_ack_is_equivalent_to_created() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Read", date(2024, 1, 1), 365);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));

        let mut response = empty_response();
        response.synced.goals.push(SyncAck {
            client_id,
            server_id: Some(17),
            status: SyncStatus::AlreadyExists,
        });

        apply_response(&mut store, &response);
        assert_eq!(store.goal(client_id).unwrap().server_id, Some(17));
        assert!(!store.goal(client_id).unwrap().pending);
    }

    #[test]
    fn test_not_found_does_not_block_merge() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Stale", date(2024, 1, 1), 30);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));

        let mut response = empty_response();
        response.synced.goals.push(SyncAck {
            client_id,
            server_id: None,
            status: SyncStatus::NotFound,
        });
        response.server_changes.goals.push(ServerGoal {
            id: 2,
            client_id: Uuid::new_v4(),
            title: "Other".to_string(),
            description: None,
            start_date: date(2024, 2, 1),
            duration_days: 10,
            color: "#FFFFFF".to_string(),
            is_active: true,
            updated_at: Utc::now(),
            is_deleted: false,
        });

        let summary = apply_response(&mut store, &response);
        assert_eq!(summary.goals_merged, 1);
        assert_eq!(store.goals.len(), 2);
        // The stale record stays pending; the server said it knows nothing
        // of it, and nothing destructive happens client-side.
        assert!(store.goal(client_id).unwrap().pending);
    }

    #[test]
    fn test_delete_ack_purges_local_record() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Doomed", date(2024, 1, 1), 30);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));
        store.apply(StoreAction::DeleteGoal(client_id));

        let mut response = empty_response();
        response.synced.goals.push(SyncAck {
            client_id,
            server_id: None,
            status: SyncStatus::Deleted,
        });

        apply_response(&mut store, &response);
        assert!(store.goals.is_empty());
        assert_eq!(store.pending_changes(), 0);
    }

    #[test]
    fn test_server_tombstone_removes_log() {
        let mut store = LocalStore::new();
        let goal_id = Uuid::new_v4();
        let log = DailyLog::new(goal_id, date(2024, 3, 1));
        let log_client_id = log.client_id;
        store.apply(StoreAction::AddLog(log));
        store.apply(StoreAction::MarkLogSynced {
            client_id: log_client_id,
            server_id: 5,
        });

        let mut response = empty_response();
        response.server_changes.daily_logs.push(ServerDailyLog {
            id: 5,
            goal_id: 1,
            goal_client_id: goal_id,
            client_id: log_client_id,
            log_date: date(2024, 3, 1),
            notes: None,
            updated_at: Utc::now(),
            is_deleted: true,
            activities: vec![],
            good_things: vec![],
            future_plans: vec![],
            attachments: vec![],
        });

        apply_response(&mut store, &response);
        assert!(store.logs.is_empty());
    }

    #[test]
    fn test_conflicts_counted_and_merge_continues() {
        let mut store = LocalStore::new();

        let mut response = empty_response();
        response.synced.conflicts.push(SyncConflict {
            client_id: Uuid::new_v4(),
            entity_type: EntityKind::DailyLog,
            error: "goal not found".to_string(),
        });

        let summary = apply_response(&mut store, &response);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(store.last_sync_at, Some(response.synced_at));
    }
}
