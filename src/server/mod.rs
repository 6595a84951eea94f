//! Server-side modules for the daytrack sync server.

pub mod auth;
pub mod coordinator;
pub mod db;
pub mod entity_store;
pub mod routes;

pub use auth::{ApiKeyStore, AuthUser};
pub use coordinator::SyncCoordinator;
pub use db::init_db;
pub use entity_store::EntityStore;
pub use routes::{build_router, AppState};

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn test_app() -> (tempfile::TempDir, axum::Router) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().join("test.db")).await.unwrap();

        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "api_keys:\n  - key: \"good-key\"\n    email: \"user@example.com\"\n",
        )
        .unwrap();
        let api_keys = ApiKeyStore::load(&config_path, &pool).await.unwrap();

        let app = build_router(AppState::new(pool, api_keys));
        (dir, app)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (_dir, app) = test_app().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_and_invalid_keys_are_rejected() {
        let (_dir, app) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::get("/goals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);

        let response = app
            .oneshot(
                Request::get("/goals")
                    .header(header::AUTHORIZATION, "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_sync_body_is_rejected_whole() {
        let (_dir, app) = test_app().await;

        let response = app
            .oneshot(
                Request::post("/sync/sync")
                    .header(header::AUTHORIZATION, "Bearer good-key")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"changes": [{"entityType": "goal"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_sync_round_trip_over_http() {
        let (_dir, app) = test_app().await;

        let client_id = uuid::Uuid::new_v4();
        let body = serde_json::json!({
            "changes": [{
                "entityType": "goal",
                "operation": "create",
                "clientId": client_id,
                "data": {
                    "title": "Run",
                    "startDate": "2024-03-01",
                    "durationDays": 30,
                    "color": "#FF5733"
                }
            }],
            "lastSyncAt": null
        });

        let response = app
            .clone()
            .oneshot(
                Request::post("/sync/sync")
                    .header(header::AUTHORIZATION, "Bearer good-key")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["synced"]["goals"][0]["status"], "created");
        assert_eq!(json["data"]["serverChanges"]["goals"][0]["title"], "Run");

        // The goal shows up on the REST surface with derived progress.
        let response = app
            .oneshot(
                Request::get("/goals")
                    .header(header::AUTHORIZATION, "Bearer good-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"][0]["title"], "Run");
        assert_eq!(json["data"][0]["loggedDays"], 0);
    }
}
