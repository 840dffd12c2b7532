//! HTTP façade over the classification core.
//!
//! Exposes the upload/feedback flow as a small JSON API consumed by the
//! upload widget. All classification and learning logic lives in the core
//! modules; handlers only translate between the wire and the domain.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Classify an uploaded product photo (multipart field `file`) |
//! | `GET`  | `/niches` | List all niches |
//! | `POST` | `/feedback` | Resolve a classification with user feedback |
//! | `GET`  | `/history` | Recent classification records |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "conflict", "message": "history record 7 is already resolved" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `label_provider` (502), `unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: the upload widget is
//! served from a different origin than this API.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::classify::{self, UNCLASSIFIED};
use crate::config::Config;
use crate::db;
use crate::error::Error;
use crate::feedback::{self, FeedbackOutcome};
use crate::history;
use crate::labels;
use crate::migrate;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Starts the HTTP server on the address configured in `[server].bind`.
///
/// Storage initialization runs here, explicitly, before the listener
/// binds: the schema is idempotent and applied on every startup.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/upload", post(handle_upload))
        .route("/niches", get(handle_niches))
        .route("/feedback", post(handle_feedback))
        .route("/history", get(handle_history))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::AlreadyResolved(_) => (StatusCode::CONFLICT, "conflict"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::LabelProvider(_) => (StatusCode::BAD_GATEWAY, "label_provider"),
            Error::Database(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            Error::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    history_id: i64,
    product_id: i64,
    labels: Vec<String>,
    classification: ClassificationBody,
}

#[derive(Serialize)]
struct ClassificationBody {
    niche: String,
    niche_id: Option<i64>,
    confidence: f64,
}

/// Handler for `POST /upload`.
///
/// Stores the image, detects labels via the configured provider, classifies
/// them against the current lexicon, and persists the audit record. The
/// provider call completes before any database transaction starts.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut image: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.to_string()))?
    {
        if field.name() == Some("file") {
            let ext = field
                .file_name()
                .and_then(|n| n.rsplit_once('.').map(|(_, e)| e.to_string()))
                .filter(|e| e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or_else(|| "bin".to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(e.to_string()))?;
            image = Some((bytes.to_vec(), ext));
        }
    }

    let (bytes, ext) = image.ok_or_else(|| AppError::bad_request("missing multipart field 'file'"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("uploaded file is empty"));
    }

    // Store the image under a fresh name
    let image_dir = &state.config.storage.image_dir;
    tokio::fs::create_dir_all(image_dir)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    let filename = format!("{}.{}", Uuid::new_v4(), ext);
    let image_path = image_dir.join(&filename);
    tokio::fs::write(&image_path, &bytes)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    // Detect, classify, persist
    let detected = labels::detect_labels(&state.config.labels, &bytes).await?;
    let outcome =
        classify::classify_and_record(&state.pool, &image_path.to_string_lossy(), detected).await?;

    info!(
        history_id = outcome.history_id,
        niche = outcome
            .classification
            .top()
            .map(|r| r.name.as_str())
            .unwrap_or(UNCLASSIFIED),
        confidence = outcome.classification.confidence(),
        "classified upload"
    );

    Ok(Json(UploadResponse {
        history_id: outcome.history_id,
        product_id: outcome.product_id,
        labels: outcome.labels.iter().map(|l| l.label.clone()).collect(),
        classification: match outcome.classification.top() {
            Some(top) => ClassificationBody {
                niche: top.name.clone(),
                niche_id: Some(top.niche_id),
                confidence: top.confidence,
            },
            None => ClassificationBody {
                niche: UNCLASSIFIED.to_string(),
                niche_id: None,
                confidence: 0.0,
            },
        },
    }))
}

// ============ GET /niches ============

#[derive(Serialize)]
struct NicheBody {
    id: i64,
    name: String,
    description: Option<String>,
}

async fn handle_niches(State(state): State<AppState>) -> Result<Json<Vec<NicheBody>>, AppError> {
    let rows = sqlx::query("SELECT id, name, description FROM niches ORDER BY name ASC")
        .fetch_all(&state.pool)
        .await
        .map_err(Error::from)?;

    Ok(Json(
        rows.iter()
            .map(|row| NicheBody {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
            })
            .collect(),
    ))
}

// ============ POST /feedback ============

#[derive(Deserialize)]
struct FeedbackRequest {
    history_id: i64,
    feedback: String,
    #[serde(default)]
    corrected_niche_id: Option<i64>,
}

#[derive(Serialize)]
struct FeedbackResponse {
    status: String,
}

/// Handler for `POST /feedback`.
///
/// Validation failures reject before any transaction starts; a repeat
/// submission returns 409 and leaves the lexicon untouched.
async fn handle_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let outcome = FeedbackOutcome::from_parts(&request.feedback, request.corrected_niche_id)?;

    feedback::apply_feedback(
        &state.pool,
        &state.config.classifier,
        request.history_id,
        outcome,
    )
    .await?;

    Ok(Json(FeedbackResponse {
        status: "ok".to_string(),
    }))
}

// ============ GET /history ============

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct HistoryEntry {
    id: i64,
    product_id: i64,
    niche_id: Option<i64>,
    confidence: f64,
    feedback: String,
    labels: Vec<String>,
    created_at: i64,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 200);
    let records = history::recent(&state.pool, limit).await?;

    Ok(Json(
        records
            .into_iter()
            .map(|r| HistoryEntry {
                id: r.id,
                product_id: r.product_id,
                niche_id: r.niche_id,
                confidence: r.confidence,
                feedback: r.feedback.as_str().to_string(),
                labels: r.labels.into_iter().map(|l| l.label).collect(),
                created_at: r.created_at,
            })
            .collect(),
    ))
}
