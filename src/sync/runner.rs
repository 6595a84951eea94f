//! Drives sync rounds: one-shot and periodic background modes.

use std::path::PathBuf;
use std::time::Duration;

use crate::store::LocalStore;
use crate::sync::client::{SyncClient, SyncClientError};
use crate::sync::collector::collect_changes;
use crate::sync::reconciler::{apply_response, ReconcileSummary};

/// Outcome of a single sync attempt.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The round trip finished and the store was reconciled.
    Completed(ReconcileSummary),
    /// A round was already in flight, nothing was done.
    Skipped,
}

/// Owns the store file and a sync client, and runs rounds against them.
pub struct SyncEngine {
    client: SyncClient,
    store_path: PathBuf,
    in_flight: bool,
}

impl SyncEngine {
    pub fn new(client: SyncClient, store_path: PathBuf) -> Self {
        Self {
            client,
            store_path,
            in_flight: false,
        }
    }

    /// Runs one sync round: collect pending changes, ship them with the
    /// watermark, reconcile the response into the store, persist.
    ///
    /// On transport failure the store is left untouched so every pending
    /// record is retried on the next round.
    pub async fn sync_once(&mut self) -> Result<SyncOutcome, Box<dyn std::error::Error>> {
        if self.in_flight {
            tracing::debug!("sync already in flight, skipping");
            return Ok(SyncOutcome::Skipped);
        }
        self.in_flight = true;
        let result = self.run_round().await;
        self.in_flight = false;
        result.map(SyncOutcome::Completed)
    }

    async fn run_round(&mut self) -> Result<ReconcileSummary, Box<dyn std::error::Error>> {
        let mut store = LocalStore::load(&self.store_path)?;
        let changes = collect_changes(&store);
        tracing::info!(
            pending = changes.len(),
            watermark = ?store.last_sync_at,
            "starting sync round"
        );

        let response = self.client.sync(changes, store.last_sync_at).await?;
        let summary = apply_response(&mut store, &response);
        store.save(&self.store_path)?;

        tracing::info!(
            acknowledged = summary.acknowledged,
            goals_merged = summary.goals_merged,
            logs_merged = summary.logs_merged,
            conflicts = summary.conflicts,
            "sync round complete"
        );
        Ok(summary)
    }

    /// Periodic sync loop. Runs a round every `interval`, and when the
    /// server has been unreachable, probes for it coming back and syncs
    /// immediately on reconnect instead of waiting out a full interval.
    ///
    /// Returns when the server rejects the API key. The key is loaded once
    /// at startup, so retrying cannot succeed; the caller must restart
    /// with new credentials.
    pub async fn watch(&mut self, interval: Duration) -> Result<(), SyncClientError> {
        let mut offline = false;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if offline {
                match self.client.status().await {
                    Ok(_) => {
                        tracing::info!("server reachable again, syncing");
                        offline = false;
                    }
                    Err(_) => {
                        tracing::debug!("server still unreachable");
                        continue;
                    }
                }
            }

            match self.sync_once().await {
                Ok(SyncOutcome::Completed(_)) => {}
                Ok(SyncOutcome::Skipped) => {}
                Err(e) => match e.downcast_ref::<SyncClientError>() {
                    Some(SyncClientError::Transport(_)) => {
                        tracing::warn!("server unreachable: {}", e);
                        offline = true;
                    }
                    Some(SyncClientError::Unauthorized) => {
                        tracing::error!("server rejected the API key, suspending sync");
                        return Err(SyncClientError::Unauthorized);
                    }
                    _ => tracing::error!("sync failed: {}", e),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Goal;
    use crate::store::StoreAction;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_transport_failure_leaves_pending_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut store = LocalStore::default();
        let goal = Goal::new(
            "Run".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            30,
        );
        let client_id = goal.client_id;
        store.apply(StoreAction::AddGoal(goal));
        store.save(&path).unwrap();

        // Nothing is listening on this port.
        let client = SyncClient::new("http://127.0.0.1:1".to_string(), "key".to_string());
        let mut engine = SyncEngine::new(client, path.clone());
        assert!(engine.sync_once().await.is_err());

        let reloaded = LocalStore::load(&path).unwrap();
        let goal = reloaded.goal(client_id).unwrap();
        assert!(goal.pending);
        assert!(reloaded.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_watch_suspends_on_rejected_credentials() {
        use crate::protocol::ApiResponse;
        use axum::http::StatusCode;
        use axum::{Json, Router};

        // A server that rejects every request as unauthenticated.
        let app = Router::new().fallback(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error("Invalid API key")),
            )
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        LocalStore::default().save(&path).unwrap();

        let client = SyncClient::new(format!("http://{}", addr), "stale-key".to_string());
        let mut engine = SyncEngine::new(client, path);

        // The loop must return instead of retrying the same key forever.
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            engine.watch(Duration::from_millis(10)),
        )
        .await
        .expect("watch kept retrying after a 401");
        assert!(matches!(result, Err(SyncClientError::Unauthorized)));
    }
}
