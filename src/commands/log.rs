use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use std::io::{self, Write};
use std::path::Path;

use daytrack::models::{DailyLog, FuturePlan};
use daytrack::store::{LocalStore, StoreAction};

use crate::commands::OutputFormat;

#[derive(Args)]
pub struct LogCommand {
    #[command(subcommand)]
    pub command: LogSubcommand,
}

#[derive(Subcommand)]
pub enum LogSubcommand {
    /// Record a day against a goal
    Add {
        /// Goal ID (or unambiguous prefix)
        goal: String,

        /// Day being logged (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Activity done that day (can be repeated)
        #[arg(long = "activity", value_name = "ACTIVITY")]
        activities: Vec<String>,

        /// Something good that happened (can be repeated)
        #[arg(long = "good-thing", value_name = "TEXT")]
        good_things: Vec<String>,

        /// Something planned for later (can be repeated)
        #[arg(long = "plan", value_name = "TITLE")]
        plans: Vec<String>,
    },

    /// List logged days
    List {
        /// Only logs for this goal ID (or prefix)
        goal: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a logged day
    Delete {
        /// Log ID (or unambiguous prefix)
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl LogCommand {
    pub fn run(&self, state_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let mut store = LocalStore::load(state_path)?;

        match &self.command {
            LogSubcommand::Add {
                goal,
                date,
                notes,
                activities,
                good_things,
                plans,
            } => {
                let goal = store
                    .find_goal(goal)
                    .ok_or_else(|| format!("No goal matching '{}'", goal))?;
                let goal_client_id = goal.client_id;
                let goal_title = goal.title.clone();
                let log_date = date.unwrap_or_else(|| Local::now().date_naive());

                // One log per goal per day; logging the same day again
                // folds the new entries into the existing log.
                let existing = store
                    .logs
                    .iter()
                    .find(|l| {
                        l.goal_client_id == goal_client_id && l.log_date == log_date && !l.deleted
                    })
                    .cloned();

                let action = match existing {
                    Some(mut log) => {
                        if notes.is_some() {
                            log.notes = notes.clone();
                        }
                        log.activities.extend(activities.iter().cloned());
                        log.good_things.extend(good_things.iter().cloned());
                        log.future_plans
                            .extend(plans.iter().map(|p| FuturePlan::new(p.as_str())));
                        println!("Updated log for '{}' on {}", goal_title, log_date);
                        StoreAction::UpdateLog(log)
                    }
                    None => {
                        let mut log = DailyLog::new(goal_client_id, log_date);
                        if let Some(notes) = notes {
                            log = log.with_notes(notes);
                        }
                        log = log
                            .with_activities(activities.clone())
                            .with_good_things(good_things.clone())
                            .with_future_plans(
                                plans.iter().map(|p| FuturePlan::new(p.as_str())).collect(),
                            );
                        println!("Logged '{}' on {}", goal_title, log_date);
                        StoreAction::AddLog(log)
                    }
                };

                store.apply(action);
                store.save(state_path)?;
                Ok(())
            }

            LogSubcommand::List { goal, format } => {
                let goal_filter = match goal {
                    Some(identifier) => Some(
                        store
                            .find_goal(identifier)
                            .ok_or_else(|| format!("No goal matching '{}'", identifier))?
                            .client_id,
                    ),
                    None => None,
                };

                let logs: Vec<_> = store
                    .logs
                    .iter()
                    .filter(|l| !l.deleted)
                    .filter(|l| goal_filter.map_or(true, |g| l.goal_client_id == g))
                    .collect();

                if logs.is_empty() {
                    println!("No logs found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&logs)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<10}  {:<12}  {:<30}  SYNC", "ID", "DATE", "GOAL");
                        println!("{}", "-".repeat(64));
                        for log in &logs {
                            let id = log.client_id.to_string();
                            let goal_title = store
                                .goal(log.goal_client_id)
                                .map(|g| g.title.clone())
                                .unwrap_or_else(|| "(unknown goal)".to_string());
                            println!(
                                "{:<10}  {:<12}  {:<30}  {}",
                                &id[..8],
                                log.log_date,
                                goal_title,
                                if log.pending { "pending" } else { "synced" }
                            );
                        }
                        println!("\nTotal: {} log(s)", logs.len());
                    }
                }
                Ok(())
            }

            LogSubcommand::Delete { identifier, force } => {
                let log = store
                    .find_log(identifier)
                    .ok_or_else(|| format!("No log matching '{}'", identifier))?;
                let client_id = log.client_id;
                let log_date = log.log_date;

                if !force {
                    print!("Delete log for {}? [y/N] ", log_date);
                    io::stdout().flush()?;
                    let mut answer = String::new();
                    io::stdin().read_line(&mut answer)?;
                    if !answer.trim().eq_ignore_ascii_case("y") {
                        println!("Aborted");
                        return Ok(());
                    }
                }

                store.apply(StoreAction::DeleteLog(client_id));
                store.save(state_path)?;
                println!("Deleted log for {}", log_date);
                Ok(())
            }
        }
    }
}
