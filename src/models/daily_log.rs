use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Something planned for a later date, attached to a daily log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturePlan {
    pub title: String,
    pub description: Option<String>,
    pub planned_date: Option<NaiveDate>,
}

impl FuturePlan {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            planned_date: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.planned_date = Some(date);
        self
    }
}

/// File metadata attached to a daily log. The file contents themselves are
/// uploaded through a separate endpoint and never travel through sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub server_id: Option<i64>,
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
}

/// One day's entry for a goal.
///
/// A log belongs to its goal by client identifier; the server resolves the
/// goal's server id during sync. At most one log exists per (goal, date) —
/// the server merges a duplicate create into the existing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub server_id: Option<i64>,
    pub client_id: Uuid,
    pub goal_client_id: Uuid,
    pub log_date: NaiveDate,
    pub notes: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub good_things: Vec<String>,
    #[serde(default)]
    pub future_plans: Vec<FuturePlan>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl DailyLog {
    /// Creates a new local log for a goal, pending until synced.
    pub fn new(goal_client_id: Uuid, log_date: NaiveDate) -> Self {
        Self {
            server_id: None,
            client_id: Uuid::new_v4(),
            goal_client_id,
            log_date,
            notes: None,
            activities: Vec::new(),
            good_things: Vec::new(),
            future_plans: Vec::new(),
            attachments: Vec::new(),
            pending: true,
            deleted: false,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_activities(mut self, activities: Vec<String>) -> Self {
        self.activities = activities;
        self
    }

    pub fn with_good_things(mut self, good_things: Vec<String>) -> Self {
        self.good_things = good_things;
        self
    }

    pub fn with_future_plans(mut self, future_plans: Vec<FuturePlan>) -> Self {
        self.future_plans = future_plans;
        self
    }
}

impl fmt::Display for DailyLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_date)?;
        if let Some(notes) = &self.notes {
            write!(f, ": {}", notes)?;
        }
        if !self.activities.is_empty() {
            write!(f, " [{}]", self.activities.join(", "))?;
        }
        if self.pending {
            write!(f, " (pending)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_log_is_pending() {
        let goal_id = Uuid::new_v4();
        let log = DailyLog::new(goal_id, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());

        assert!(log.pending);
        assert!(log.server_id.is_none());
        assert_eq!(log.goal_client_id, goal_id);
        assert!(log.activities.is_empty());
    }

    #[test]
    fn test_builder_fields() {
        let log = DailyLog::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
            .with_notes("good day")
            .with_activities(vec!["run".to_string()])
            .with_future_plans(vec![
                FuturePlan::new("hike").on(NaiveDate::from_ymd_opt(2024, 3, 17).unwrap())
            ]);

        assert_eq!(log.notes.as_deref(), Some("good day"));
        assert_eq!(log.future_plans[0].title, "hike");
    }

    #[test]
    fn test_json_roundtrip() {
        let log = DailyLog::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
            .with_notes("entry")
            .with_good_things(vec!["sunny".to_string()]);

        let json = serde_json::to_string(&log).unwrap();
        let parsed: DailyLog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, log);
    }
}
