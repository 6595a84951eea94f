//! Daytrack Sync Server
//!
//! Applies change batches from offline clients and serves incremental
//! deltas keyed on a per-user watermark.
//!
//! # Configuration
//!
//! Environment variables:
//! - `DAYTRACK_PORT`: Port to listen on (default: 5000)
//! - `DAYTRACK_DATABASE_PATH`: SQLite database file
//!   (default: ~/.local/share/daytrack-server/daytrack.db)
//! - `DAYTRACK_CONFIG`: Path to config file
//!   (default: ~/.config/daytrack-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     email: "erin@example.com"
//!     name: "Erin"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `POST /sync/sync`: Apply a change batch, answer with acks and delta
//! - `GET /sync/status`: Current watermark and server time
//! - `GET /goals`, `GET /goals/{id}`, `GET /daily-logs/goal/{goal_id}`:
//!   read-only views (auth required)

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daytrack::server::{build_router, init_db, ApiKeyStore, AppState};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// SQLite database file
    database_path: PathBuf,
    /// Path to config file
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("DAYTRACK_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5000);

        let database_path = std::env::var("DAYTRACK_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("daytrack-server")
                    .join("daytrack.db")
            });

        let config_path = std::env::var("DAYTRACK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("daytrack-server")
                    .join("config.yaml")
            });

        Self {
            port,
            database_path,
            config_path,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daytrack=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let pool = match init_db(config.database_path.clone()).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    // Load API keys, creating user rows as needed
    let api_keys = match ApiKeyStore::load(&config.config_path, &pool).await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!("Failed to load API keys: {}", e);
            std::process::exit(1);
        }
    };

    let app = build_router(AppState::new(pool, api_keys));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
