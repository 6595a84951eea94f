//! Client-side state container.
//!
//! All local mutation goes through [`LocalStore::apply`] with a
//! [`StoreAction`], so the pending-flag transitions live in one place and
//! the collector can treat the store as a read-only snapshot. The store is
//! persisted as a single JSON file, written atomically via temp file +
//! rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::{Attachment, DailyLog, FuturePlan, Goal};
use crate::protocol::{ServerDailyLog, ServerGoal};

/// Errors loading or saving the local store.
#[derive(Debug)]
pub enum StoreError {
    Io(PathBuf, io::Error),
    Corrupt(PathBuf, serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
            StoreError::Corrupt(path, e) => {
                write!(f, "Failed to parse state file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(_, e) => Some(e),
            StoreError::Corrupt(_, e) => Some(e),
        }
    }
}

/// A state transition. Every mutation of the local store is one of these.
#[derive(Debug, Clone)]
pub enum StoreAction {
    AddGoal(Goal),
    /// Replace a goal's fields by client id and mark it pending.
    UpdateGoal(Goal),
    /// Flag a goal (and nothing else) as deleted-pending.
    DeleteGoal(Uuid),
    /// Attach the server id and clear the pending flag.
    MarkGoalSynced { client_id: Uuid, server_id: i64 },
    /// Fold a server-side goal into local state (server wins).
    ApplyServerGoal(ServerGoal),
    /// Drop a goal entirely (acknowledged deletion or tombstone).
    RemoveGoal(Uuid),
    AddLog(DailyLog),
    UpdateLog(DailyLog),
    DeleteLog(Uuid),
    MarkLogSynced { client_id: Uuid, server_id: i64 },
    ApplyServerLog(ServerDailyLog),
    RemoveLog(Uuid),
    /// Advance the watermark after a merge has fully completed.
    SyncCompleted(DateTime<Utc>),
}

/// The whole of local entity state plus the sync watermark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalStore {
    pub goals: Vec<Goal>,
    pub logs: Vec<DailyLog>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the store from disk, starting empty if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| StoreError::Corrupt(path.to_path_buf(), e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(StoreError::Io(path.to_path_buf(), e)),
        }
    }

    /// Saves atomically: write to a temp file, then rename into place.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Corrupt(path.to_path_buf(), e))?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(|e| StoreError::Io(temp_path.clone(), e))?;
        std::fs::rename(&temp_path, path).map_err(|e| StoreError::Io(path.to_path_buf(), e))?;

        Ok(())
    }

    pub fn goal(&self, client_id: Uuid) -> Option<&Goal> {
        self.goals.iter().find(|g| g.client_id == client_id)
    }

    pub fn log(&self, client_id: Uuid) -> Option<&DailyLog> {
        self.logs.iter().find(|l| l.client_id == client_id)
    }

    /// Finds a goal by client-id prefix, for CLI addressing. Returns `None`
    /// when the prefix is ambiguous or matches nothing.
    pub fn find_goal(&self, prefix: &str) -> Option<&Goal> {
        let mut matches = self
            .goals
            .iter()
            .filter(|g| !g.deleted && g.client_id.to_string().starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn find_log(&self, prefix: &str) -> Option<&DailyLog> {
        let mut matches = self
            .logs
            .iter()
            .filter(|l| !l.deleted && l.client_id.to_string().starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Number of records still waiting for server confirmation.
    pub fn pending_changes(&self) -> usize {
        self.goals.iter().filter(|g| g.pending).count()
            + self.logs.iter().filter(|l| l.pending).count()
    }

    /// Applies one state transition.
    pub fn apply(&mut self, action: StoreAction) {
        match action {
            StoreAction::AddGoal(mut goal) => {
                goal.pending = true;
                self.goals.push(goal);
            }
            StoreAction::UpdateGoal(goal) => {
                if let Some(existing) =
                    self.goals.iter_mut().find(|g| g.client_id == goal.client_id)
                {
                    // The server id survives local edits.
                    let server_id = existing.server_id.or(goal.server_id);
                    *existing = Goal {
                        server_id,
                        pending: true,
                        ..goal
                    };
                }
            }
            StoreAction::DeleteGoal(client_id) => {
                if let Some(goal) = self.goals.iter_mut().find(|g| g.client_id == client_id) {
                    goal.deleted = true;
                    goal.pending = true;
                }
            }
            StoreAction::MarkGoalSynced {
                client_id,
                server_id,
            } => {
                if let Some(goal) = self.goals.iter_mut().find(|g| g.client_id == client_id) {
                    goal.server_id = Some(server_id);
                    goal.pending = false;
                }
            }
            StoreAction::ApplyServerGoal(server_goal) => self.apply_server_goal(server_goal),
            StoreAction::RemoveGoal(client_id) => {
                self.goals.retain(|g| g.client_id != client_id);
            }
            StoreAction::AddLog(mut log) => {
                log.pending = true;
                self.logs.push(log);
            }
            StoreAction::UpdateLog(log) => {
                if let Some(existing) =
                    self.logs.iter_mut().find(|l| l.client_id == log.client_id)
                {
                    let server_id = existing.server_id.or(log.server_id);
                    *existing = DailyLog {
                        server_id,
                        pending: true,
                        ..log
                    };
                }
            }
            StoreAction::DeleteLog(client_id) => {
                if let Some(log) = self.logs.iter_mut().find(|l| l.client_id == client_id) {
                    log.deleted = true;
                    log.pending = true;
                }
            }
            StoreAction::MarkLogSynced {
                client_id,
                server_id,
            } => {
                if let Some(log) = self.logs.iter_mut().find(|l| l.client_id == client_id) {
                    log.server_id = Some(server_id);
                    log.pending = false;
                }
            }
            StoreAction::ApplyServerLog(server_log) => self.apply_server_log(server_log),
            StoreAction::RemoveLog(client_id) => {
                self.logs.retain(|l| l.client_id != client_id);
            }
            StoreAction::SyncCompleted(at) => {
                self.last_sync_at = Some(at);
            }
        }
    }

    fn apply_server_goal(&mut self, server_goal: ServerGoal) {
        if server_goal.is_deleted {
            self.goals.retain(|g| {
                g.client_id != server_goal.client_id && g.server_id != Some(server_goal.id)
            });
            return;
        }

        let incoming = Goal {
            server_id: Some(server_goal.id),
            client_id: server_goal.client_id,
            title: server_goal.title,
            description: server_goal.description,
            start_date: server_goal.start_date,
            duration_days: server_goal.duration_days,
            color: server_goal.color,
            is_active: server_goal.is_active,
            pending: false,
            deleted: false,
        };

        let position = self.goals.iter().position(|g| {
            g.client_id == incoming.client_id || g.server_id == incoming.server_id
        });
        match position {
            Some(idx) => {
                if self.goals[idx].pending {
                    tracing::warn!(
                        client_id = %self.goals[idx].client_id,
                        "server version overwrites locally pending goal edits"
                    );
                }
                self.goals[idx] = incoming;
            }
            None => self.goals.push(incoming),
        }
    }

    fn apply_server_log(&mut self, server_log: ServerDailyLog) {
        if server_log.is_deleted {
            self.logs.retain(|l| {
                l.client_id != server_log.client_id && l.server_id != Some(server_log.id)
            });
            return;
        }

        let incoming = DailyLog {
            server_id: Some(server_log.id),
            client_id: server_log.client_id,
            goal_client_id: server_log.goal_client_id,
            log_date: server_log.log_date,
            notes: server_log.notes,
            activities: server_log.activities,
            good_things: server_log.good_things,
            future_plans: server_log
                .future_plans
                .into_iter()
                .map(|p| FuturePlan {
                    title: p.title,
                    description: p.description,
                    planned_date: p.planned_date,
                })
                .collect(),
            attachments: server_log
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    server_id: Some(a.id),
                    file_name: a.file_name,
                    file_path: a.file_path,
                    file_type: a.file_type,
                    file_size: a.file_size,
                })
                .collect(),
            pending: false,
            deleted: false,
        };

        let position = self.logs.iter().position(|l| {
            l.client_id == incoming.client_id || l.server_id == incoming.server_id
        });
        match position {
            Some(idx) => {
                if self.logs[idx].pending {
                    tracing::warn!(
                        client_id = %self.logs[idx].client_id,
                        "server version overwrites locally pending log edits"
                    );
                }
                self.logs[idx] = incoming;
            }
            None => self.logs.push(incoming),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn server_goal(id: i64, client_id: Uuid, title: &str, deleted: bool) -> ServerGoal {
        ServerGoal {
            id,
            client_id,
            title: title.to_string(),
            description: None,
            start_date: date(2024, 1, 1),
            duration_days: 30,
            color: "#FFFFFF".to_string(),
            is_active: true,
            updated_at: Utc::now(),
            is_deleted: deleted,
        }
    }

    #[test]
    fn test_add_and_delete_goal_sets_flags() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Run", date(2024, 1, 1), 30);
        let client_id = goal.client_id;

        store.apply(StoreAction::AddGoal(goal));
        assert_eq!(store.pending_changes(), 1);

        store.apply(StoreAction::DeleteGoal(client_id));
        let goal = store.goal(client_id).unwrap();
        assert!(goal.deleted);
        assert!(goal.pending);
    }

    #[test]
    fn test_mark_goal_synced_clears_pending() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Run", date(2024, 1, 1), 30);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));

        store.apply(StoreAction::MarkGoalSynced {
            client_id,
            server_id: 42,
        });

        let goal = store.goal(client_id).unwrap();
        assert_eq!(goal.server_id, Some(42));
        assert!(!goal.pending);
        assert_eq!(store.pending_changes(), 0);
    }

    #[test]
    fn test_update_goal_keeps_server_id() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Run", date(2024, 1, 1), 30);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal.clone()));
        store.apply(StoreAction::MarkGoalSynced {
            client_id,
            server_id: 7,
        });

        let mut edited = goal;
        edited.title = "Run Farther".to_string();
        edited.server_id = None;
        store.apply(StoreAction::UpdateGoal(edited));

        let goal = store.goal(client_id).unwrap();
        assert_eq!(goal.title, "Run Farther");
        assert_eq!(goal.server_id, Some(7));
        assert!(goal.pending);
    }

    #[test]
    fn test_apply_server_goal_inserts_new() {
        let mut store = LocalStore::new();
        store.apply(StoreAction::ApplyServerGoal(server_goal(
            1,
            Uuid::new_v4(),
            "From other device",
            false,
        )));

        assert_eq!(store.goals.len(), 1);
        assert!(!store.goals[0].pending);
        assert_eq!(store.goals[0].server_id, Some(1));
    }

    #[test]
    fn test_apply_server_goal_replaces_existing() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Old Title", date(2024, 1, 1), 30);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));

        store.apply(StoreAction::ApplyServerGoal(server_goal(
            9,
            client_id,
            "Server Title",
            false,
        )));

        assert_eq!(store.goals.len(), 1);
        let goal = store.goal(client_id).unwrap();
        assert_eq!(goal.title, "Server Title");
        assert_eq!(goal.server_id, Some(9));
        assert!(!goal.pending);
    }

    #[test]
    fn test_tombstone_removes_local_goal() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Doomed", date(2024, 1, 1), 30);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));
        store.apply(StoreAction::MarkGoalSynced {
            client_id,
            server_id: 3,
        });

        store.apply(StoreAction::ApplyServerGoal(server_goal(
            3, client_id, "Doomed", true,
        )));

        assert!(store.goals.is_empty());
    }

    #[test]
    fn test_sync_completed_advances_watermark() {
        let mut store = LocalStore::new();
        assert!(store.last_sync_at.is_none());

        let at = Utc::now();
        store.apply(StoreAction::SyncCompleted(at));
        assert_eq!(store.last_sync_at, Some(at));
    }

    #[test]
    fn test_find_goal_by_prefix() {
        let mut store = LocalStore::new();
        let goal = Goal::new("Run", date(2024, 1, 1), 30);
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));

        let prefix = &client_id.to_string()[..8];
        assert_eq!(store.find_goal(prefix).unwrap().client_id, client_id);
        assert!(store.find_goal("zzzzzzzz").is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let mut store = LocalStore::new();
        let goal = Goal::new("Persisted", date(2024, 1, 1), 14);
        let goal_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));
        store.apply(StoreAction::AddLog(DailyLog::new(goal_id, date(2024, 1, 2))));
        store.save(&path).unwrap();

        let loaded = LocalStore::load(&path).unwrap();
        assert_eq!(loaded.goals.len(), 1);
        assert_eq!(loaded.logs.len(), 1);
        assert!(loaded.goals[0].pending);
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::load(&temp.path().join("nope.json")).unwrap();
        assert!(store.goals.is_empty());
        assert!(store.last_sync_at.is_none());
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let result = LocalStore::load(&path);
        assert!(matches!(result, Err(StoreError::Corrupt(_, _))));
    }
}
