use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A goal as the client holds it.
///
/// `client_id` is minted once at creation and identifies the goal across
/// devices forever; `server_id` is attached after the first successful sync.
/// `pending` marks the goal as mutated since the last confirmed sync, and
/// `deleted` marks a deletion that has not been acknowledged yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub server_id: Option<i64>,
    pub client_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub duration_days: i32,
    pub color: String,
    pub is_active: bool,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl Goal {
    /// Creates a new local goal, pending until the server confirms it.
    pub fn new(title: impl Into<String>, start_date: NaiveDate, duration_days: i32) -> Self {
        Self {
            server_id: None,
            client_id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            start_date,
            duration_days,
            color: "#FFFFFF".to_string(),
            is_active: true,
            pending: true,
            deleted: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Last calendar day covered by the goal.
    pub fn end_date(&self) -> NaiveDate {
        self.start_date + chrono::Days::new(self.duration_days.max(1) as u64 - 1)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} → {}, {} days)",
            self.title,
            self.start_date,
            self.end_date(),
            self.duration_days
        )?;
        if self.deleted {
            write!(f, " [deleted]")?;
        } else if self.pending {
            write!(f, " [pending]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_goal_is_pending_without_server_id() {
        let goal = Goal::new("Read Daily", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 365);

        assert!(goal.pending);
        assert!(goal.server_id.is_none());
        assert!(goal.is_active);
        assert!(!goal.deleted);
    }

    #[test]
    fn test_client_ids_are_unique() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = Goal::new("A", date, 30);
        let b = Goal::new("B", date, 30);
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn test_end_date() {
        let goal = Goal::new("Run", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 31);
        assert_eq!(goal.end_date(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn test_json_roundtrip() {
        let goal = Goal::new("Write", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 90)
            .with_description("morning pages")
            .with_color("#223344");

        let json = serde_json::to_string(&goal).unwrap();
        let parsed: Goal = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, goal);
    }
}
