//! HTTP service for report generation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness message |
//! | `GET`  | `/api/health` | Health check (returns version) |
//! | `POST` | `/api/analyze` | Upload a table (multipart field `file`) and get a report |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsupported_format", "message": "Unsupported file format: ..." } }
//! ```
//!
//! Error codes: `unsupported_format` (400), `parse_error` (400),
//! `bad_request` (400), `payload_too_large` (413), `internal` (500).
//!
//! # CORS
//!
//! Origins come from `[server].allowed_origins`; an empty list permits any
//! origin.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mdna_core::report::{ReportPayload, ReportPipeline};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::analyze::build_pipeline;
use crate::config::Config;
use crate::loader::{load_table, LoadError};

/// Name of the multipart field carrying the uploaded table.
const FILE_FIELD: &str = "file";

#[derive(Clone)]
struct AppState {
    pipeline: Arc<ReportPipeline>,
}

/// Starts the HTTP service on `[server].bind`.
///
/// Runs until the process is terminated; returns an error if the
/// configuration is invalid or binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let app = router(config, pipeline)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "report service listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router around an existing pipeline.
pub fn router(config: &Config, pipeline: ReportPipeline) -> anyhow::Result<Router> {
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    Ok(Router::new()
        .route("/", get(handle_root))
        .route("/api/health", get(handle_health))
        .route("/api/analyze", post(handle_analyze))
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
        .layer(cors_layer(&config.server.allowed_origins)?)
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let values = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| anyhow::anyhow!("server.allowed_origins: invalid origin '{}'", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(values)))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"parse_error"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<LoadError> for AppError {
    fn from(err: LoadError) -> Self {
        let code = match &err {
            LoadError::UnsupportedFormat(_) => "unsupported_format",
            LoadError::Parse { .. } => "parse_error",
            LoadError::Io { .. } => {
                return AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: err.to_string(),
                }
            }
        };
        AppError {
            status: StatusCode::BAD_REQUEST,
            code,
            message: err.to_string(),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        let status = err.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            AppError {
                status,
                code: "payload_too_large",
                message: err.body_text(),
            }
        } else {
            bad_request(err.body_text())
        }
    }
}

// ============ GET / and GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"healthy"` when the server is running.
    status: &'static str,
    version: &'static str,
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Financial Report API is running" }))
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /api/analyze ============

/// Handler for `POST /api/analyze`.
///
/// Reads the `file` field into memory, loads it by the uploaded file name's
/// extension and runs the pipeline. Capability failures never fail the
/// request; they only change how the report was produced.
async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ReportPayload>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| bad_request("upload has no file name"))?;
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| bad_request(format!("missing multipart field '{}'", FILE_FIELD)))?;

    let digest = format!("{:x}", Sha256::digest(&bytes));
    let request_id = uuid::Uuid::new_v4();
    info!(%request_id, file = %file_name, bytes = bytes.len(), sha256 = %digest, "analyze request");

    let table = load_table(&bytes, &file_name).map_err(|e| {
        warn!(%request_id, error = %e, "upload rejected");
        AppError::from(e)
    })?;

    let payload = state.pipeline.run(&table).await;
    Ok(Json(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_errors_map_to_codes() {
        let e = AppError::from(LoadError::UnsupportedFormat("x.pdf".to_string()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "unsupported_format");

        let e = AppError::from(LoadError::Parse {
            format: "CSV",
            message: "bad row".to_string(),
        });
        assert_eq!(e.code, "parse_error");
    }

    #[test]
    fn test_cors_rejects_invalid_origin() {
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
        assert!(cors_layer(&[]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }
}
