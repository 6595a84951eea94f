//! HTTP transport for talking to the sync server.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::SyncConfig;
use crate::protocol::{
    ApiResponse, ChangeRecord, SyncRequest, SyncResponse, SyncStatusData,
};

/// Errors that can occur during sync client operations.
#[derive(Debug)]
pub enum SyncClientError {
    /// Sync is not configured.
    NotConfigured,
    /// The request never completed: timeout, connection drop, DNS failure.
    /// The outcome on the server is unknown; pending flags must stay set.
    Transport(String),
    /// The server rejected our credentials.
    Unauthorized,
    /// The server answered with a failure envelope.
    Rejected(String),
    /// The response body could not be decoded.
    Decode(String),
}

impl std::fmt::Display for SyncClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncClientError::NotConfigured => write!(
                f,
                "Sync not configured. Add server_url and api_key to config."
            ),
            SyncClientError::Transport(e) => write!(f, "Transport error: {}", e),
            SyncClientError::Unauthorized => write!(f, "Authentication failed (401)"),
            SyncClientError::Rejected(msg) => write!(f, "Server rejected sync: {}", msg),
            SyncClientError::Decode(e) => write!(f, "Failed to decode server response: {}", e),
        }
    }
}

impl std::error::Error for SyncClientError {}

/// HTTP client for the sync endpoints.
pub struct SyncClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl SyncClient {
    /// Creates a client from config; errors if sync is not configured.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncClientError> {
        let server_url = config
            .server_url
            .clone()
            .ok_or(SyncClientError::NotConfigured)?;
        let api_key = config
            .api_key
            .clone()
            .ok_or(SyncClientError::NotConfigured)?;
        Ok(Self::new(server_url, api_key))
    }

    pub fn new(server_url: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        }
    }

    /// One full sync round trip: ship the batch, get acks plus the delta.
    pub async fn sync(
        &self,
        changes: Vec<ChangeRecord>,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> Result<SyncResponse, SyncClientError> {
        let request = SyncRequest {
            changes,
            last_sync_at,
        };

        let response = self
            .http
            .post(format!("{}/sync/sync", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncClientError::Transport(e.to_string()))?;

        Self::unwrap_envelope(response).await
    }

    /// Fetches the server's view of this user's watermark.
    pub async fn status(&self) -> Result<SyncStatusData, SyncClientError> {
        let response = self
            .http
            .get(format!("{}/sync/status", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SyncClientError::Transport(e.to_string()))?;

        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SyncClientError> {
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SyncClientError::Unauthorized);
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| SyncClientError::Decode(e.to_string()))?;

        if !envelope.success {
            return Err(SyncClientError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "no message".to_string()),
            ));
        }

        envelope
            .data
            .ok_or_else(|| SyncClientError::Decode("success envelope without data".to_string()))
    }
}
