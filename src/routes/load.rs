use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tracing::info;

use crate::models::{AppState, LoadRequest};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(load))
        .route("/load", post(load))
        .with_state(state)
}

/// Runs one load. Debounced and failed loads answer `null` with a 200; the
/// outcome is in the logs.
pub async fn load(State(state): State<AppState>, body: Bytes) -> AppResult<Response> {
    let request = LoadRequest::from_body(&body);
    let outcome = state.orchestrator.run(&request).await?;
    info!(job_name = %outcome.job_name(), "Load request finished");

    Ok(match outcome.message() {
        Some(message) => Json(message).into_response(),
        None => Json(Value::Null).into_response(),
    })
}

#[cfg(test)]
mod tests {
    use crate::dispatch::InMemoryTaskQueue;
    use crate::routes::create_router;
    use crate::routes::test_support::test_app;
    use crate::state::JobState;
    use crate::warehouse::DryRunLoader;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post(app: axum::Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_load_success() {
        let app = test_app(DryRunLoader::new(), InMemoryTaskQueue::new(), &[]).await;

        let (status, body) = post(create_router(app.state.clone()), "/load", r#"{"job_name":"orders"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("Success for orders"));
        assert_eq!(app.loader.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_root_path_runs_load() {
        let app = test_app(DryRunLoader::new(), InMemoryTaskQueue::new(), &[]).await;
        let now = Utc::now();
        app.store
            .insert("orders", JobState {
                last_attempted_at: Some(now - Duration::hours(1)),
                last_watermark: Some(now - Duration::hours(1)),
            })
            .await;

        let (status, body) = post(create_router(app.state.clone()), "/", r#"{"job_name":"orders"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("There are no new blobs to load for orders"));
        assert!(app.loader.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_job_name_is_bad_request() {
        let app = test_app(DryRunLoader::new(), InMemoryTaskQueue::new(), &[]).await;

        for body in ["{}", "not json", r#"{"job_name":""}"#] {
            let (status, body) = post(create_router(app.state.clone()), "/load", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!("Please include job_name in request json."));
        }
        assert_eq!(app.store.reads(), 0);
        assert_eq!(app.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = test_app(DryRunLoader::new(), InMemoryTaskQueue::new(), &[]).await;

        let (status, body) = post(create_router(app.state.clone()), "/load", r#"{"job_name":"nope"}"#).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!("nope was not found in the config file."));
    }

    #[tokio::test]
    async fn test_invalid_disposition_is_bad_request() {
        let app = test_app(DryRunLoader::new(), InMemoryTaskQueue::new(), &[]).await;

        let (status, _) = post(create_router(app.state.clone()), "/load", r#"{"job_name":"broken"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_debounce_and_failure_answer_null() {
        let app = test_app(DryRunLoader::failing("boom"), InMemoryTaskQueue::new(), &[]).await;
        let now = Utc::now();
        let hour_ago = now - Duration::hours(1);
        app.store
            .insert("orders", JobState {
                last_attempted_at: Some(hour_ago),
                last_watermark: Some(hour_ago),
            })
            .await;
        app.objects.put("landing", "orders/new.json", "{}", now).await;

        let (status, body) = post(create_router(app.state.clone()), "/load", r#"{"job_name":"orders"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let (status, body) = post(create_router(app.state.clone()), "/load", r#"{"job_name":"orders"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        // the failed load consumed the window, so only one load was attempted
        assert_eq!(app.loader.calls().await.len(), 1);
        let state = app.store.snapshot("orders").await.unwrap();
        assert!(state.last_attempted_at > Some(hour_ago));
        assert_eq!(state.last_watermark, Some(hour_ago));
    }
}
