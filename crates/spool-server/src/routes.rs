use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State, rejection::BytesRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use spool_core::{Engine, Submission, SubmitError};
use tower::ServiceBuilder;
use tracing::debug;

use crate::dto::{EnqueueRequest, EnqueueResponse, MetricsView, TaskView};

/// Largest accepted `/enqueue` body.
pub const MAX_BODY_BYTES: usize = 1 << 20;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/enqueue", post(enqueue))
        .route("/status/:id", get(status))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(MAX_BODY_BYTES)))
        .with_state(engine)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn enqueue(
    State(engine): State<Arc<Engine>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if !engine.is_accepting() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable enqueue body");
            return bad_request("invalid JSON");
        }
    };
    let req: EnqueueRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "malformed enqueue body");
            return bad_request("invalid JSON");
        }
    };
    let Some(payload) = req.payload_bytes() else {
        return bad_request("payload required");
    };

    let submission = Submission {
        id: req.id,
        payload,
        max_retries: req.max_retries.unwrap_or(0),
    };
    match engine.submit(submission).await {
        Ok(ack) => (
            StatusCode::ACCEPTED,
            Json(EnqueueResponse {
                id: ack.id.to_string(),
                status: ack.status,
            }),
        )
            .into_response(),
        Err(err) => submit_error_to_response(err),
    }
}

async fn status(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Response {
    match engine.query(&id).await {
        Some(task) => Json(TaskView::from(task)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn metrics(State(engine): State<Arc<Engine>>) -> Json<MetricsView> {
    Json(MetricsView::from(engine.metrics().await))
}

fn submit_error_to_response(err: SubmitError) -> Response {
    match err {
        SubmitError::GateClosed | SubmitError::QueueFull => {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        SubmitError::DuplicateId(_) => bad_request("duplicate id"),
        SubmitError::InvalidInput(msg) => bad_request(msg),
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, message.into()).into_response()
}
