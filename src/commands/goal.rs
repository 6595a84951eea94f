use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use std::io::{self, Write};
use std::path::Path;

use daytrack::models::Goal;
use daytrack::store::{LocalStore, StoreAction};

use crate::commands::OutputFormat;

#[derive(Args)]
pub struct GoalCommand {
    #[command(subcommand)]
    pub command: GoalSubcommand,
}

#[derive(Subcommand)]
pub enum GoalSubcommand {
    /// Start tracking a new goal
    Add {
        /// What you want to do every day
        title: String,

        /// First day of the goal (defaults to today)
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// How many days to keep it up
        #[arg(long, default_value = "30")]
        duration: i32,

        /// Longer description
        #[arg(long)]
        description: Option<String>,

        /// Display color, e.g. #FF5733
        #[arg(long)]
        color: Option<String>,
    },

    /// List goals
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing goal
    Update {
        /// Goal ID (or unambiguous prefix)
        identifier: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New start date
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// New duration in days
        #[arg(long)]
        duration: Option<i32>,

        /// New color
        #[arg(long)]
        color: Option<String>,
    },

    /// Delete a goal
    Delete {
        /// Goal ID (or unambiguous prefix)
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl GoalCommand {
    pub fn run(&self, state_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let mut store = LocalStore::load(state_path)?;

        match &self.command {
            GoalSubcommand::Add {
                title,
                start_date,
                duration,
                description,
                color,
            } => {
                if title.trim().is_empty() {
                    return Err("Goal title cannot be empty".into());
                }
                if *duration <= 0 {
                    return Err("Duration must be at least one day".into());
                }

                let start = start_date.unwrap_or_else(|| Local::now().date_naive());
                let mut goal = Goal::new(title.trim(), start, *duration);
                if let Some(description) = description {
                    goal = goal.with_description(description);
                }
                if let Some(color) = color {
                    goal = goal.with_color(color);
                }

                println!("Added goal:");
                println!("{}", goal);
                store.apply(StoreAction::AddGoal(goal));
                store.save(state_path)?;
                Ok(())
            }

            GoalSubcommand::List { format } => {
                let goals: Vec<_> = store.goals.iter().filter(|g| !g.deleted).collect();
                if goals.is_empty() {
                    println!("No goals yet. Add one with `daytrack goal add <title>`.");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&goals)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<10}  {:<30}  {:<12}  {:>5}  SYNC", "ID", "TITLE", "START", "DAYS");
                        println!("{}", "-".repeat(70));
                        for goal in &goals {
                            let id = goal.client_id.to_string();
                            let title = truncate_title(&goal.title);
                            println!(
                                "{:<10}  {:<30}  {:<12}  {:>5}  {}",
                                &id[..8],
                                title,
                                goal.start_date,
                                goal.duration_days,
                                if goal.pending { "pending" } else { "synced" }
                            );
                        }
                        println!("\nTotal: {} goal(s)", goals.len());
                    }
                }
                Ok(())
            }

            GoalSubcommand::Update {
                identifier,
                title,
                description,
                start_date,
                duration,
                color,
            } => {
                let mut goal = store
                    .find_goal(identifier)
                    .ok_or_else(|| format!("No goal matching '{}'", identifier))?
                    .clone();

                if let Some(title) = title {
                    goal.title = title.trim().to_string();
                }
                if let Some(description) = description {
                    goal.description = Some(description.clone());
                }
                if let Some(start_date) = start_date {
                    goal.start_date = *start_date;
                }
                if let Some(duration) = duration {
                    if *duration <= 0 {
                        return Err("Duration must be at least one day".into());
                    }
                    goal.duration_days = *duration;
                }
                if let Some(color) = color {
                    goal.color = color.clone();
                }

                println!("Updated goal:");
                println!("{}", goal);
                store.apply(StoreAction::UpdateGoal(goal));
                store.save(state_path)?;
                Ok(())
            }

            GoalSubcommand::Delete { identifier, force } => {
                let goal = store
                    .find_goal(identifier)
                    .ok_or_else(|| format!("No goal matching '{}'", identifier))?;
                let client_id = goal.client_id;
                let title = goal.title.clone();

                if !force {
                    print!("Delete goal '{}'? [y/N] ", title);
                    io::stdout().flush()?;
                    let mut answer = String::new();
                    io::stdin().read_line(&mut answer)?;
                    if !answer.trim().eq_ignore_ascii_case("y") {
                        println!("Aborted");
                        return Ok(());
                    }
                }

                store.apply(StoreAction::DeleteGoal(client_id));
                store.save(state_path)?;
                println!("Deleted '{}' (will be removed from the server on next sync)", title);
                Ok(())
            }
        }
    }
}

/// Title cell for the table, trimmed on a character boundary.
fn truncate_title(title: &str) -> String {
    if title.chars().count() > 30 {
        let short: String = title.chars().take(27).collect();
        format!("{}...", short)
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title_short_titles_pass_through() {
        assert_eq!(truncate_title("Read more"), "Read more");
        assert_eq!(truncate_title(&"x".repeat(30)), "x".repeat(30));
    }

    #[test]
    fn test_truncate_title_long_titles_get_ellipsis() {
        let long = "a".repeat(40);
        let shown = truncate_title(&long);
        assert_eq!(shown, format!("{}...", "a".repeat(27)));
    }

    #[test]
    fn test_truncate_title_handles_multibyte_titles() {
        // Each char is multiple bytes, so byte indexing would not land
        // on a char boundary.
        let long = "毎日三十分ランニングをして健康的な生活習慣を身につける目標を立てる".to_string();
        let shown = truncate_title(&long);
        assert_eq!(shown.chars().count(), 30);
        assert!(shown.ends_with("..."));
    }
}
