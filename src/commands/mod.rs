mod config_cmd;
mod goal;
mod log;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use goal::GoalCommand;
pub use log::LogCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
