use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use codeduel_judge::{CodeExecutor, ExecutionService, Judge};
use serde_json::json;
use std::sync::Arc;

type SharedJudge = Arc<Judge<ExecutionService>>;

pub fn router(judge: SharedJudge) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(judge)
}

/// 200 when the execution backend answers, 503 otherwise
async fn health(State(judge): State<SharedJudge>) -> impl IntoResponse {
    let backend = judge.executor().backend().to_string();

    if judge.executor().health_check().await {
        (StatusCode::OK, Json(json!({ "status": "ok", "backend": backend })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "backend": backend })),
        )
    }
}
