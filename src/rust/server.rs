//! HTTP surface: the upload form, the prediction endpoint and health checks.
//!
//! | route           | purpose                                       |
//! |-----------------|-----------------------------------------------|
//! | `GET /`         | static upload form                            |
//! | `POST /predict` | multipart upload → grade JSON                 |
//! | `GET /health`   | liveness, always 200                          |
//! | `GET /ready`    | 200 once the model is loaded, 503 otherwise   |

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Buf;
use futures_util::TryStreamExt;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::{Filter, Rejection, Reply};

use crate::grader::Grader;
use crate::state::{LoadState, ModelState};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Multipart field names accepted for the uploaded image
pub const FILE_FIELD_NAMES: [&str; 2] = ["file", "image"];

pub const MODEL_UNAVAILABLE: &str = "Model not loaded or failed to initialize.";
pub const PREDICTION_FAILED: &str = "An unexpected error occurred during prediction.";

// =============================================================================
// Request/Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Client-side problems with an upload; all map to 400.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file part in the request")]
    MissingFile,
    #[error("No selected file")]
    EmptyFilename,
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("Unsupported content type '{0}', expected an image")]
    UnsupportedContentType(String),
    #[error("Malformed multipart body: {0}")]
    Multipart(String),
}

#[derive(Debug)]
struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct ModelUnavailable;

impl warp::reject::Reject for ModelUnavailable {}

// =============================================================================
// Routes
// =============================================================================

/// Build the complete route tree, including rejection handling
pub fn routes(
    state: ModelState,
    max_upload_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(INDEX_HTML));

    let predict = warp::path("predict")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_grader(state.clone()))
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and_then(handle_predict);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
            }))
        });

    let ready = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_ready);

    index
        .or(predict)
        .or(health)
        .or(ready)
        .recover(handle_rejection)
}

// =============================================================================
// Filters
// =============================================================================

fn with_state(state: ModelState) -> impl Filter<Extract = (ModelState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Extracts the loaded grader, rejecting before the body is read when the
/// model is not ready
fn with_grader(state: ModelState) -> impl Filter<Extract = (Arc<Grader>,), Error = Rejection> + Clone {
    with_state(state).and_then(|state: ModelState| async move {
        match state.grader().await {
            Some(grader) => Ok(grader),
            None => {
                error!(
                    "Attempted prediction but model is {}",
                    state.snapshot().await.name()
                );
                Err(warp::reject::custom(ModelUnavailable))
            }
        }
    })
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_predict(
    grader: Arc<Grader>,
    form: FormData,
) -> Result<warp::reply::Response, Infallible> {
    let upload = match read_upload(form).await {
        Ok(upload) => upload,
        Err(e) => {
            warn!("Rejected upload: {}", e);
            return Ok(error_response(StatusCode::BAD_REQUEST, &e.to_string()));
        }
    };

    info!("Grading '{}' ({} bytes)", upload.filename, upload.bytes.len());
    let outcome = tokio::task::spawn_blocking(move || grader.predict(&upload.bytes)).await;

    match outcome {
        Ok(Ok(result)) => {
            info!("Predicted grade {} ({})", result.grade, result.description);
            Ok(warp::reply::json(&result).into_response())
        }
        Ok(Err(e)) => {
            error!("Prediction error: {}", e);
            Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, PREDICTION_FAILED))
        }
        Err(e) => {
            error!("Prediction task failed: {}", e);
            Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, PREDICTION_FAILED))
        }
    }
}

async fn handle_ready(state: ModelState) -> Result<warp::reply::Response, Infallible> {
    let (status, body) = match state.snapshot().await {
        LoadState::Ready(grader) => (
            StatusCode::OK,
            ReadyResponse {
                status: "ready".to_string(),
                model: Some(grader.info().model_name),
                reason: None,
            },
        ),
        LoadState::Failed(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ReadyResponse {
                status: "failed".to_string(),
                model: None,
                reason: Some(reason),
            },
        ),
        other => (
            StatusCode::SERVICE_UNAVAILABLE,
            ReadyResponse {
                status: other.name().to_string(),
                model: None,
                reason: None,
            },
        ),
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

async fn read_upload(mut form: FormData) -> Result<Upload, UploadError> {
    while let Some(part) = form
        .try_next()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        if FILE_FIELD_NAMES.contains(&part.name()) {
            return read_file_part(part).await;
        }
    }
    Err(UploadError::MissingFile)
}

async fn read_file_part(part: Part) -> Result<Upload, UploadError> {
    let filename = part.filename().unwrap_or_default().to_string();
    if filename.is_empty() {
        return Err(UploadError::EmptyFilename);
    }
    if let Some(content_type) = part.content_type() {
        if !is_image_content_type(content_type) {
            return Err(UploadError::UnsupportedContentType(content_type.to_string()));
        }
    }

    let bytes = part
        .stream()
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(chunk.chunk());
            Ok(acc)
        })
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?;

    if bytes.is_empty() {
        return Err(UploadError::EmptyFile);
    }
    Ok(Upload { filename, bytes })
}

fn is_image_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("image/") || essence == "application/octet-stream"
}

// =============================================================================
// Errors
// =============================================================================

fn error_response(status: StatusCode, message: &str) -> warp::reply::Response {
    let body = ApiError {
        error: message.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let (status, message) = if err.find::<ModelUnavailable>().is_some() {
        (StatusCode::SERVICE_UNAVAILABLE, MODEL_UNAVAILABLE.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request payload too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length header required".to_string())
    } else if err.find::<warp::reject::MissingHeader>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
    {
        (
            StatusCode::BAD_REQUEST,
            "Expected a multipart/form-data body".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };
    Ok(error_response(status, &message))
}
