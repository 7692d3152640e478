//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use textclf_core::Error;
use tracing::{debug, error, warn};

use crate::state::AppState;

pub const WELCOME_MESSAGE: &str = "Welcome to the Sentiment & Emotion Classifier API!";

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub label: String,
    pub score: f32,
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": WELCOME_MESSAGE,
        "ui": "/ui/",
        "health": "/healthz",
        "predict": "/predict",
    }))
}

/// Liveness: answers as long as the process serves HTTP
pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Readiness: 200 once the model is loaded, 503 before
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.service.health();
    let status = if health.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let outcome = classify(&state, payload).await;

    let label = match &outcome {
        Ok(_) => "ok",
        Err(ApiError::Rejected(_)) => "bad_request",
        Err(ApiError::Service(e)) => e.kind(),
    };
    metrics::counter!("textclf_requests_total", "outcome" => label).increment(1);

    outcome
}

async fn classify(
    state: &AppState,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(body) = payload?;

    // Reject bad input here so it never reaches the model
    let request = state.service.request(body.text)?;
    let result = state.service.classify(request).await?;

    debug!(label = %result.label, score = result.score, "Prediction served");
    Ok(Json(PredictResponse {
        label: result.label,
        score: result.score,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        state.metrics.render(),
    )
}

pub async fn fallback() -> impl IntoResponse {
    error_response(StatusCode::NOT_FOUND, "not_found", "Not found")
}

/// Error returned from handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body missing, malformed or of the wrong shape
    #[error(transparent)]
    Rejected(#[from] JsonRejection),

    #[error(transparent)]
    Service(#[from] Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Rejected(rejection) => rejection.status(),
            Self::Service(err) => match err {
                Error::Validation(_) => StatusCode::BAD_REQUEST,
                Error::NotReady | Error::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
                Error::Inference(_)
                | Error::ModelLoad(_)
                | Error::Config(_)
                | Error::Io(_)
                | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Rejected(rejection) => {
                warn!(status = status.as_u16(), error = %rejection.body_text(), "Rejected request body");
                error_response(status, "invalid_request_error", &rejection.body_text())
            }
            Self::Service(err) => {
                if status.is_server_error() && !matches!(err, Error::NotReady | Error::Overloaded) {
                    error!(kind = err.kind(), error = %err, "Prediction failed");
                } else {
                    warn!(kind = err.kind(), error = %err, "Prediction rejected");
                }

                let mut response = error_response(status, err.kind(), &err.to_string());
                if matches!(err, Error::Overloaded) {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
                }
                response
            }
        }
    }
}

fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "type": kind,
            "message": message,
        }
    });

    (status, Json(body)).into_response()
}
