use clap::{Args, Subcommand};
use std::path::PathBuf;

use daytrack::config::Config;

use crate::commands::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

const STARTER_CONFIG: &str = "\
# daytrack configuration
#
# state_path: /path/to/daytrack.json
#
# sync:
#   server_url: \"http://localhost:5000\"
#   api_key: \"your-api-key\"
#   interval_secs: 300
";

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        config_path: Option<&PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        let path = config_path
                            .cloned()
                            .unwrap_or_else(Config::default_config_path);
                        if path.exists() {
                            println!("Config file: {}", path.display());
                        } else {
                            println!("Config file: {} (not found)", path.display());
                        }
                        println!();

                        println!("state_path: {}", config.state_path.display());
                        println!();
                        println!(
                            "sync.server_url:    {}",
                            config.sync.server_url.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "sync.api_key:       {}",
                            if config.sync.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!("sync.interval_secs: {}", config.sync.interval_secs);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init { force } => {
                let path = config_path
                    .cloned()
                    .unwrap_or_else(Config::default_config_path);
                if path.exists() && !force {
                    return Err(format!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    )
                    .into());
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, STARTER_CONFIG)?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        }
    }
}
