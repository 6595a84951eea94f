//! Wire types for the sync protocol.
//!
//! The sync endpoint speaks JSON with camelCase keys. A change record on the
//! wire looks like `{entityType, operation, clientId, data?}`; internally it
//! is a sum type keyed by (entity, operation) so the coordinator's apply
//! switch is checked for exhaustiveness at compile time. The raw wire shape
//! is bridged via `RawChange` with serde's try_from/into.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity kinds that participate in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Goal,
    DailyLog,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Goal => write!(f, "goal"),
            EntityKind::DailyLog => write!(f, "daily_log"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Mutable fields of a goal, as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub duration_days: i32,
    pub color: String,
}

/// A future plan inside a daily log payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturePlanPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub planned_date: Option<NaiveDate>,
}

/// Full contents of a daily log, as sent by the client.
///
/// The owning goal is referenced by its client identifier, never its server
/// id: the goal may be created in the same batch, and the server resolves
/// the linkage at apply time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLogPayload {
    pub goal_client_id: Uuid,
    pub log_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub good_things: Vec<String>,
    #[serde(default)]
    pub future_plans: Vec<FuturePlanPayload>,
}

/// Untyped payload slot of a raw change record.
///
/// Untagged is safe here: the required field sets of the two payloads are
/// disjoint (`title`/`durationDays` vs `goalClientId`/`logDate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ChangeData {
    Goal(GoalPayload),
    DailyLog(DailyLogPayload),
}

/// The literal wire shape of a change record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChange {
    entity_type: EntityKind,
    operation: Operation,
    client_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<ChangeData>,
}

/// A single queued client mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChange", into = "RawChange")]
pub enum ChangeRecord {
    CreateGoal { client_id: Uuid, data: GoalPayload },
    UpdateGoal { client_id: Uuid, data: GoalPayload },
    DeleteGoal { client_id: Uuid },
    CreateDailyLog { client_id: Uuid, data: DailyLogPayload },
    UpdateDailyLog { client_id: Uuid, data: DailyLogPayload },
    DeleteDailyLog { client_id: Uuid },
}

impl ChangeRecord {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            ChangeRecord::CreateGoal { .. }
            | ChangeRecord::UpdateGoal { .. }
            | ChangeRecord::DeleteGoal { .. } => EntityKind::Goal,
            ChangeRecord::CreateDailyLog { .. }
            | ChangeRecord::UpdateDailyLog { .. }
            | ChangeRecord::DeleteDailyLog { .. } => EntityKind::DailyLog,
        }
    }

    pub fn client_id(&self) -> Uuid {
        match self {
            ChangeRecord::CreateGoal { client_id, .. }
            | ChangeRecord::UpdateGoal { client_id, .. }
            | ChangeRecord::DeleteGoal { client_id }
            | ChangeRecord::CreateDailyLog { client_id, .. }
            | ChangeRecord::UpdateDailyLog { client_id, .. }
            | ChangeRecord::DeleteDailyLog { client_id } => *client_id,
        }
    }
}

impl TryFrom<RawChange> for ChangeRecord {
    type Error = String;

    fn try_from(raw: RawChange) -> Result<Self, Self::Error> {
        let RawChange {
            entity_type,
            operation,
            client_id,
            data,
        } = raw;

        match (entity_type, operation, data) {
            (EntityKind::Goal, Operation::Create, Some(ChangeData::Goal(data))) => {
                Ok(ChangeRecord::CreateGoal { client_id, data })
            }
            (EntityKind::Goal, Operation::Update, Some(ChangeData::Goal(data))) => {
                Ok(ChangeRecord::UpdateGoal { client_id, data })
            }
            // Deletes carry no payload; a stray one is ignored.
            (EntityKind::Goal, Operation::Delete, _) => Ok(ChangeRecord::DeleteGoal { client_id }),
            (EntityKind::DailyLog, Operation::Create, Some(ChangeData::DailyLog(data))) => {
                Ok(ChangeRecord::CreateDailyLog { client_id, data })
            }
            (EntityKind::DailyLog, Operation::Update, Some(ChangeData::DailyLog(data))) => {
                Ok(ChangeRecord::UpdateDailyLog { client_id, data })
            }
            (EntityKind::DailyLog, Operation::Delete, _) => {
                Ok(ChangeRecord::DeleteDailyLog { client_id })
            }
            (kind, op, Some(_)) => Err(format!(
                "change {}/{:?} carries a payload of the wrong shape",
                kind, op
            )),
            (kind, op, None) => Err(format!("change {}/{:?} is missing its payload", kind, op)),
        }
    }
}

impl From<ChangeRecord> for RawChange {
    fn from(record: ChangeRecord) -> Self {
        match record {
            ChangeRecord::CreateGoal { client_id, data } => RawChange {
                entity_type: EntityKind::Goal,
                operation: Operation::Create,
                client_id,
                data: Some(ChangeData::Goal(data)),
            },
            ChangeRecord::UpdateGoal { client_id, data } => RawChange {
                entity_type: EntityKind::Goal,
                operation: Operation::Update,
                client_id,
                data: Some(ChangeData::Goal(data)),
            },
            ChangeRecord::DeleteGoal { client_id } => RawChange {
                entity_type: EntityKind::Goal,
                operation: Operation::Delete,
                client_id,
                data: None,
            },
            ChangeRecord::CreateDailyLog { client_id, data } => RawChange {
                entity_type: EntityKind::DailyLog,
                operation: Operation::Create,
                client_id,
                data: Some(ChangeData::DailyLog(data)),
            },
            ChangeRecord::UpdateDailyLog { client_id, data } => RawChange {
                entity_type: EntityKind::DailyLog,
                operation: Operation::Update,
                client_id,
                data: Some(ChangeData::DailyLog(data)),
            },
            ChangeRecord::DeleteDailyLog { client_id } => RawChange {
                entity_type: EntityKind::DailyLog,
                operation: Operation::Delete,
                client_id,
                data: None,
            },
        }
    }
}

/// Request body for `POST /sync/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Per-record outcome of applying a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Created,
    AlreadyExists,
    Updated,
    Deleted,
    NotFound,
    GoalNotFound,
}

/// Acknowledgement for one applied change record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAck {
    pub client_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    pub status: SyncStatus,
}

/// A record-level failure, isolated from the rest of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub client_id: Uuid,
    pub entity_type: EntityKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedData {
    pub goals: Vec<SyncAck>,
    pub daily_logs: Vec<SyncAck>,
    pub conflicts: Vec<SyncConflict>,
}

/// A goal as the server reports it in the outbound delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGoal {
    pub id: i64,
    pub client_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub duration_days: i32,
    pub color: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAttachment {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
}

/// A daily log as the server reports it, children embedded unless the log
/// is a tombstone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDailyLog {
    pub id: i64,
    pub goal_id: i64,
    pub goal_client_id: Uuid,
    pub client_id: Uuid,
    pub log_date: NaiveDate,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub good_things: Vec<String>,
    #[serde(default)]
    pub future_plans: Vec<FuturePlanPayload>,
    #[serde(default)]
    pub attachments: Vec<ServerAttachment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerChanges {
    pub goals: Vec<ServerGoal>,
    pub daily_logs: Vec<ServerDailyLog>,
}

/// Full response body of `POST /sync/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub synced: SyncedData,
    pub server_changes: ServerChanges,
    pub synced_at: DateTime<Utc>,
}

/// Response body of `GET /sync/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusData {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub server_time: DateTime<Utc>,
}

/// The `{success, message?, data?}` envelope every endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: serde::Deserialize<'de>"
))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn goal_payload() -> GoalPayload {
        GoalPayload {
            title: "Read Daily".to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            duration_days: 365,
            color: "#4A90D9".to_string(),
        }
    }

    #[test]
    fn test_goal_create_wire_shape() {
        let id = Uuid::new_v4();
        let record = ChangeRecord::CreateGoal {
            client_id: id,
            data: goal_payload(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["entityType"], "goal");
        assert_eq!(value["operation"], "create");
        assert_eq!(value["clientId"], id.to_string());
        assert_eq!(value["data"]["title"], "Read Daily");
        assert_eq!(value["data"]["durationDays"], 365);
        assert_eq!(value["data"]["startDate"], "2024-01-01");
    }

    #[test]
    fn test_delete_omits_data() {
        let record = ChangeRecord::DeleteGoal {
            client_id: Uuid::new_v4(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_parse_daily_log_create() {
        let goal_id = Uuid::new_v4();
        let id = Uuid::new_v4();
        let value = json!({
            "entityType": "daily_log",
            "operation": "create",
            "clientId": id.to_string(),
            "data": {
                "goalClientId": goal_id.to_string(),
                "logDate": "2024-03-10",
                "notes": "went well",
                "activities": ["run", "read"],
                "goodThings": ["sunny"],
                "futurePlans": [{"title": "hike", "plannedDate": "2024-03-17"}]
            }
        });

        let record: ChangeRecord = serde_json::from_value(value).unwrap();
        match record {
            ChangeRecord::CreateDailyLog { client_id, data } => {
                assert_eq!(client_id, id);
                assert_eq!(data.goal_client_id, goal_id);
                assert_eq!(data.activities, vec!["run", "read"]);
                assert_eq!(data.future_plans.len(), 1);
                assert_eq!(
                    data.future_plans[0].planned_date,
                    NaiveDate::from_ymd_opt(2024, 3, 17)
                );
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_create_without_payload_rejected() {
        let value = json!({
            "entityType": "goal",
            "operation": "create",
            "clientId": Uuid::new_v4().to_string()
        });

        let result: Result<ChangeRecord, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_mismatched_payload_rejected() {
        // A goal create carrying a daily-log payload must not parse.
        let value = json!({
            "entityType": "goal",
            "operation": "create",
            "clientId": Uuid::new_v4().to_string(),
            "data": {
                "goalClientId": Uuid::new_v4().to_string(),
                "logDate": "2024-03-10"
            }
        });

        let result: Result<ChangeRecord, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_record_roundtrip() {
        let record = ChangeRecord::UpdateDailyLog {
            client_id: Uuid::new_v4(),
            data: DailyLogPayload {
                goal_client_id: Uuid::new_v4(),
                log_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                notes: Some("late entry".to_string()),
                activities: vec!["gym".to_string()],
                good_things: vec![],
                future_plans: vec![],
            },
        };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: ChangeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_sync_status_serialization() {
        assert_eq!(
            serde_json::to_value(SyncStatus::AlreadyExists).unwrap(),
            "already_exists"
        );
        assert_eq!(
            serde_json::to_value(SyncStatus::GoalNotFound).unwrap(),
            "goal_not_found"
        );
    }

    #[test]
    fn test_sync_request_null_watermark() {
        let req: SyncRequest =
            serde_json::from_value(json!({"changes": [], "lastSyncAt": null})).unwrap();
        assert!(req.last_sync_at.is_none());
        assert!(req.changes.is_empty());
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = serde_json::to_value(ApiResponse::ok(5)).unwrap();
        assert_eq!(ok, json!({"success": true, "data": 5}));

        let err = serde_json::to_value(ApiResponse::<()>::error("Invalid sync data")).unwrap();
        assert_eq!(err, json!({"success": false, "message": "Invalid sync data"}));
    }
}
