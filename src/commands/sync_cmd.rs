//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};
use std::time::Duration;

use daytrack::config::Config;
use daytrack::store::LocalStore;
use daytrack::sync::{SyncClient, SyncClientError, SyncEngine, SyncOutcome};

/// Sync with remote server
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
    /// Keep syncing on an interval until interrupted
    Watch,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(config).await,
            Some(SyncSubcommand::Status) => self.status(config).await,
            Some(SyncSubcommand::Watch) => self.watch(config).await,
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let client = SyncClient::from_config(&config.sync)?;
        let mut engine = SyncEngine::new(client, config.state_path.clone());

        println!("Syncing with server...");
        match engine.sync_once().await? {
            SyncOutcome::Completed(summary) => {
                println!();
                println!("  ✓ {} change(s) acknowledged", summary.acknowledged);
                println!(
                    "  ✓ {} goal(s), {} log(s) merged from server",
                    summary.goals_merged, summary.logs_merged
                );
                if summary.conflicts > 0 {
                    println!("  ✗ {} conflict(s), see logs", summary.conflicts);
                }
                println!();
                println!("Sync complete.");
            }
            SyncOutcome::Skipped => println!("A sync is already running."),
        }
        Ok(())
    }

    async fn status(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let store = LocalStore::load(&config.state_path)?;
        println!("Pending changes: {}", store.pending_changes());
        match store.last_sync_at {
            Some(ts) => println!("Last sync:       {}", ts),
            None => println!("Last sync:       never"),
        }
        println!();

        let client = match SyncClient::from_config(&config.sync) {
            Ok(client) => client,
            Err(SyncClientError::NotConfigured) => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:5000\"");
                println!("    api_key: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  DAYTRACK_SERVER_URL");
                println!("  DAYTRACK_API_KEY");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let server_url = config.sync.server_url.as_deref().unwrap_or_default();
        let api_key = config.sync.api_key.as_deref().unwrap_or_default();
        println!("Server:  {}", server_url);
        println!("API Key: {}...", &api_key[..api_key.len().min(8)]);
        println!();

        print!("Server status: ");
        match client.status().await {
            Ok(status) => {
                println!("✓ connected");
                match status.last_sync_at {
                    Some(ts) => println!("Server watermark: {}", ts),
                    None => println!("Server watermark: never synced"),
                }
                println!("Server time:      {}", status.server_time);
            }
            Err(SyncClientError::Transport(_)) => println!("✗ unreachable"),
            Err(e) => println!("✗ error: {}", e),
        }

        Ok(())
    }

    async fn watch(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let client = SyncClient::from_config(&config.sync)?;
        let mut engine = SyncEngine::new(client, config.state_path.clone());
        let interval = Duration::from_secs(config.sync.interval_secs.max(1));

        println!(
            "Syncing every {}s, Ctrl-C to stop.",
            interval.as_secs()
        );
        if let Err(e) = engine.watch(interval).await {
            println!();
            println!("Sync stopped: {}", e);
            println!("Update the api_key in your config, then run `daytrack sync watch` again.");
            return Err(e.into());
        }
        Ok(())
    }
}
