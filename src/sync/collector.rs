//! Change collector: turns pending local records into a wire batch.
//!
//! This is a pure snapshot function. It never mutates the store — clearing
//! pending flags is the reconciler's job, after the server has confirmed —
//! so calling it twice without intervening edits yields the same batch.

use crate::models::{DailyLog, Goal};
use crate::protocol::{ChangeRecord, DailyLogPayload, FuturePlanPayload, GoalPayload};
use crate::store::LocalStore;

fn goal_payload(goal: &Goal) -> GoalPayload {
    GoalPayload {
        title: goal.title.clone(),
        description: goal.description.clone(),
        start_date: goal.start_date,
        duration_days: goal.duration_days,
        color: goal.color.clone(),
    }
}

fn log_payload(log: &DailyLog) -> DailyLogPayload {
    DailyLogPayload {
        goal_client_id: log.goal_client_id,
        log_date: log.log_date,
        notes: log.notes.clone(),
        activities: log.activities.clone(),
        good_things: log.good_things.clone(),
        future_plans: log
            .future_plans
            .iter()
            .map(|p| FuturePlanPayload {
                title: p.title.clone(),
                description: p.description.clone(),
                planned_date: p.planned_date,
            })
            .collect(),
    }
}

/// Collects every record flagged pending, goals first, in store order.
///
/// Classification per record: deleted wins over everything (delete, no
/// payload); otherwise a record that already has a server id is an update;
/// otherwise a create carrying the full payload. Daily-log creates reference
/// their goal by client id, since the goal may travel in the same batch.
pub fn collect_changes(store: &LocalStore) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();

    for goal in store.goals.iter().filter(|g| g.pending) {
        let record = if goal.deleted {
            ChangeRecord::DeleteGoal {
                client_id: goal.client_id,
            }
        } else if goal.server_id.is_some() {
            ChangeRecord::UpdateGoal {
                client_id: goal.client_id,
                data: goal_payload(goal),
            }
        } else {
            ChangeRecord::CreateGoal {
                client_id: goal.client_id,
                data: goal_payload(goal),
            }
        };
        changes.push(record);
    }

    for log in store.logs.iter().filter(|l| l.pending) {
        let record = if log.deleted {
            ChangeRecord::DeleteDailyLog {
                client_id: log.client_id,
            }
        } else if log.server_id.is_some() {
            ChangeRecord::UpdateDailyLog {
                client_id: log.client_id,
                data: log_payload(log),
            }
        } else {
            ChangeRecord::CreateDailyLog {
                client_id: log.client_id,
                data: log_payload(log),
            }
        };
        changes.push(record);
    }

    changes
}
