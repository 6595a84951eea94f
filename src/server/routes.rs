//! HTTP surface of the sync server.
//!
//! `POST /sync/sync` is the one write path; everything else is read-only.
//! All bodies use the `{success, message?, data?}` envelope except
//! `/health`, which answers a bare status for load balancers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::protocol::{ApiResponse, ServerDailyLog, ServerGoal, SyncRequest, SyncStatusData};
use crate::server::auth::{auth_middleware, ApiKeyStore, AuthUser};
use crate::server::coordinator::SyncCoordinator;
use crate::server::entity_store::EntityStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub coordinator: Arc<SyncCoordinator>,
    pub entities: Arc<EntityStore>,
}

impl AppState {
    pub fn new(pool: SqlitePool, api_keys: ApiKeyStore) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            coordinator: Arc::new(SyncCoordinator::new(pool.clone())),
            entities: Arc::new(EntityStore::new(pool)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/sync/sync", post(sync))
        .route("/sync/status", get(sync_status))
        .route("/goals", get(list_goals))
        .route("/goals/{id}", get(get_goal))
        .route("/daily-logs/goal/{goal_id}", get(logs_for_goal))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn internal_error(e: sqlx::Error) -> (StatusCode, Json<ApiResponse<()>>) {
    tracing::error!("database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error("Internal server error")),
    )
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Applies one sync batch. A body that does not parse into the batch
/// shape rejects the whole request with 400 and nothing is applied.
async fn sync(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(format!(
                    "Invalid sync request: {}",
                    rejection.body_text()
                ))),
            )
                .into_response();
        }
    };

    match state.coordinator.sync(user.id, request).await {
        Ok(response) => Json(ApiResponse::ok(response)).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn sync_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    match state.entities.watermark(user.id).await {
        Ok(last_sync_at) => Json(ApiResponse::ok(SyncStatusData {
            last_sync_at,
            server_time: chrono::Utc::now(),
        }))
        .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// A goal plus progress fields derived from its logs.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalView {
    #[serde(flatten)]
    goal: ServerGoal,
    logged_days: i64,
    progress: f64,
}

async fn goal_view(
    entities: &EntityStore,
    user_id: i64,
    goal: ServerGoal,
) -> Result<GoalView, sqlx::Error> {
    let logged_days = entities.logged_days(user_id, goal.id).await?;
    let progress = if goal.duration_days > 0 {
        (logged_days as f64 / goal.duration_days as f64 * 100.0).min(100.0)
    } else {
        0.0
    };
    Ok(GoalView {
        goal,
        logged_days,
        progress,
    })
}

async fn list_goals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    let goals = match state.entities.list_goals(user.id).await {
        Ok(goals) => goals,
        Err(e) => return internal_error(e).into_response(),
    };

    let mut views = Vec::with_capacity(goals.len());
    for goal in goals {
        match goal_view(&state.entities, user.id, goal).await {
            Ok(view) => views.push(view),
            Err(e) => return internal_error(e).into_response(),
        }
    }
    Json(ApiResponse::ok(views)).into_response()
}

async fn get_goal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.entities.get_goal(user.id, id).await {
        Ok(Some(goal)) => match goal_view(&state.entities, user.id, goal).await {
            Ok(view) => Json(ApiResponse::ok(view)).into_response(),
            Err(e) => internal_error(e).into_response(),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("Goal not found")),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn logs_for_goal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(goal_id): Path<i64>,
) -> impl IntoResponse {
    match state.entities.get_goal(user.id, goal_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<()>::error("Goal not found")),
            )
                .into_response();
        }
        Err(e) => return internal_error(e).into_response(),
    }

    match state.entities.logs_for_goal(user.id, goal_id).await {
        Ok(logs) => Json(ApiResponse::<Vec<ServerDailyLog>>::ok(logs)).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
