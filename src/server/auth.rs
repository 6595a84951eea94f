//! API key authentication.
//!
//! Keys live in a YAML config file:
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     email: "erin@example.com"
//!     name: "Erin"
//! ```
//!
//! Each entry is tied to a user row. At startup every configured email
//! is upserted into `users` so the key maps to a stable numeric user id.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;

use crate::protocol::ApiResponse;
use crate::server::db::format_ts;
use crate::server::routes::AppState;

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from config file, upserting each user row.
    pub async fn load(config_path: &Path, pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let entries = match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => config.api_keys,
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Vec::new()
            }
        };

        let mut keys = HashMap::new();
        for entry in entries {
            let id = upsert_user(pool, &entry.email, entry.name.as_deref()).await?;
            keys.insert(
                entry.key,
                AuthUser {
                    id,
                    email: entry.email,
                },
            );
        }
        tracing::info!("Loaded {} API key(s)", keys.len());

        Ok(Self { keys })
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

async fn upsert_user(
    pool: &SqlitePool,
    email: &str,
    name: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let now = format_ts(chrono::Utc::now());
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (email, name, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(email) DO UPDATE SET name = COALESCE(excluded.name, users.name)
        RETURNING id
        "#,
    )
    .bind(email)
    .bind(name)
    .bind(&now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::error(message)),
    )
        .into_response()
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        Some(_) => return unauthorized("Authorization header must use Bearer scheme"),
        None => return unauthorized("Authorization header required"),
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("Invalid API key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::db::init_db;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_upserts_users_and_validates_keys() {
        let dir = tempdir().unwrap();
        let pool = init_db(dir.path().join("test.db")).await.unwrap();

        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "api_keys:\n  - key: \"secret-a\"\n    email: \"a@example.com\"\n    name: \"A\"\n  - key: \"secret-b\"\n    email: \"b@example.com\"\n",
        )
        .unwrap();

        let store = ApiKeyStore::load(&config_path, &pool).await.unwrap();

        let user_a = store.validate("secret-a").unwrap();
        assert_eq!(user_a.email, "a@example.com");
        let user_b = store.validate("secret-b").unwrap();
        assert_ne!(user_a.id, user_b.id);
        assert!(store.validate("nope").is_none());

        // Loading again must reuse the same user rows.
        let store2 = ApiKeyStore::load(&config_path, &pool).await.unwrap();
        assert_eq!(store2.validate("secret-a").unwrap().id, user_a.id);
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_empty_store() {
        let dir = tempdir().unwrap();
        let pool = init_db(dir.path().join("test.db")).await.unwrap();

        let store = ApiKeyStore::load(&dir.path().join("absent.yaml"), &pool)
            .await
            .unwrap();
        assert!(store.validate("anything").is_none());
    }
}
