//! Webhook ingress
//!
//! Receives provider callbacks and hands them to the job engine. The
//! response is sent before any downstream work runs: processing is spawned
//! onto a task after the 200 ack, so the provider never observes
//! backpressure from slow chat-API calls. Malformed bodies are also acked
//! with 200 so the provider does not retry a payload we will never parse.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::jobs::{CallbackEvent, JobEngine};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Job callback handler. Always 200: the ack must not depend on whether we
/// can use the payload.
async fn job_callback(State(engine): State<Arc<JobEngine>>, body: Bytes) -> StatusCode {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring malformed callback body: {}", e);
            return StatusCode::OK;
        }
    };

    let event = CallbackEvent::from_payload(payload);
    tokio::spawn(async move {
        if let Err(e) = engine.handle_event(event).await {
            warn!("Callback handling failed: {:#}", e);
        }
    });

    StatusCode::OK
}

/// Build the ingress router.
pub fn webhook_router(engine: Arc<JobEngine>) -> Router {
    Router::new()
        .route("/webhooks/jobs", post(job_callback))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Serve the webhook ingress until the process exits.
pub async fn serve(addr: SocketAddr, engine: Arc<JobEngine>) -> Result<()> {
    let app = webhook_router(engine);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Webhook ingress listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStore;
    use crate::notify::{Notifier, NotifyError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send_text(&self, _: i64, _: &str) -> Result<i32, NotifyError> {
            Ok(1)
        }
        async fn send_photo(&self, _: i64, _: &str, _: &str) -> Result<i32, NotifyError> {
            Ok(1)
        }
        async fn send_video(&self, _: i64, _: &str, _: &str) -> Result<i32, NotifyError> {
            Ok(1)
        }
        async fn send_document(&self, _: i64, _: &str, _: &str) -> Result<i32, NotifyError> {
            Ok(1)
        }
        async fn send_voice(&self, _: i64, _: &str) -> Result<i32, NotifyError> {
            Ok(1)
        }
        async fn edit_text(&self, _: i64, _: i32, _: &str) -> Result<(), NotifyError> {
            Ok(())
        }
        async fn edit_caption(&self, _: i64, _: i32, _: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn test_router() -> Router {
        let engine = Arc::new(JobEngine::new(
            JobStore::open_in_memory().unwrap(),
            Arc::new(NullNotifier),
        ));
        webhook_router(engine)
    }

    #[tokio::test]
    async fn test_callback_acked() {
        let app = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"id":"pred-1","status":"starting"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_still_acked() {
        let app = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/jobs")
                    .body(Body::from("not json at all"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
