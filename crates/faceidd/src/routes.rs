use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use crate::models::{ApiResponse, ModelInfoResponse, RootResponse, StatusResponse, VerificationData};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use faceid_core::verify::round_to;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/model-info", get(model_info))
        .route("/api/verify-face", post(verify_face))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: state.config.app_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        status: "/status",
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let loaded = state.engine.is_loaded();
    Json(StatusResponse {
        status: if loaded { "healthy" } else { "unhealthy" },
        model_loaded: loaded,
        message: if loaded { "Service is running" } else { "Model not loaded" },
    })
}

async fn model_info(State(state): State<AppState>) -> Response {
    if !state.engine.is_loaded() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": "Model not loaded" })),
        )
            .into_response();
    }
    Json(ModelInfoResponse {
        model_name: state.config.model_name.clone(),
        detection_size: state.config.det_size,
        backend: state.engine.backend().to_string(),
    })
    .into_response()
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

async fn verify_face(State(state): State<AppState>, multipart: Result<Multipart, MultipartRejection>) -> Response {
    let started = Instant::now();

    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err((code, message)) => {
            tracing::warn!(%message, "rejected upload");
            return (code, Json(ApiResponse::error(message))).into_response();
        }
    };

    if !upload.filename.to_ascii_lowercase().ends_with(".pdf") {
        return Json(ApiResponse::error("Only PDF files are allowed")).into_response();
    }

    if upload.bytes.len() > state.config.max_file_size {
        return Json(ApiResponse::error(format!(
            "File size exceeds {} MB",
            format_megabytes(state.config.max_file_size)
        )))
        .into_response();
    }

    tracing::info!(filename = %upload.filename, bytes = upload.bytes.len(), "processing file");

    let outcome = state.engine.verify(upload.bytes, state.config.verify_timeout()).await;
    let elapsed = round_to(started.elapsed().as_secs_f64(), 2);

    let data = match outcome {
        Ok(verification) => VerificationData::from(verification),
        Err(err @ EngineError::Timeout(_)) => {
            tracing::error!(error = %err, "verification did not complete");
            return Json(ApiResponse::error(format!("Internal server error: {err}"))).into_response();
        }
        Err(err) => VerificationData::failed(err.to_string()),
    };

    tracing::info!(seconds = elapsed, "processing completed");
    Json(ApiResponse::success(data.with_processing_time(elapsed))).into_response()
}

/// Pull the `file` field out of the multipart body.
async fn read_upload(multipart: Result<Multipart, MultipartRejection>) -> Result<Upload, (StatusCode, String)> {
    let mut multipart = multipart.map_err(|rejection| (StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()))?;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|err| (err.status(), err.body_text()))?;
        let Some(field) = field else {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Missing form field `{UPLOAD_FIELD}`"),
            ));
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|err| (err.status(), err.body_text()))?;
        return Ok(Upload {
            filename,
            bytes: bytes.to_vec(),
        });
    }
}

/// Megabytes with at least one decimal place: `10485760` → `10.0`.
fn format_megabytes(bytes: usize) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb.fract() == 0.0 {
        format!("{mb:.1}")
    } else {
        format!("{mb}")
    }
}
