//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the render thread
//! runs on a plain `std::thread`. Communication is via `std::sync::mpsc`.
//! Pattern files are loaded and validated here, so a bad request is answered
//! with an error before the render thread ever sees it.

use crate::brightness::MaxBrightness;
use crate::engine::{PlaybackConfig, PlaybackState};
use crate::media::{self, PatternEntry};
use crate::pacer::FrameRate;
use crate::render::{self, DisplayStatus, RenderCommand};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Channel to send commands to the render thread
    pub command_tx: Sender<RenderCommand>,
    /// Shared display status (render thread writes, handlers read)
    pub status: Arc<Mutex<DisplayStatus>>,
    /// Root directory for pattern files
    pub media_dir: PathBuf,
    /// Display layout plus the brightness and rate used when a request omits them
    pub defaults: PlaybackConfig,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(get_status, get_patterns, post_play, post_stop, post_clear),
    components(schemas(
        DisplayStatus,
        PlaybackState,
        crate::DisplayGeometry,
        media::PatternEntry,
        PlayRequest,
    )),
    tags(
        (name = "playback", description = "Playback control endpoints"),
        (name = "media", description = "Pattern discovery endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Nightlight API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for playing patterns on a serpentine LED grid"
    )
)]
pub struct ApiDoc;

// ── Request types ────────────────────────────────────────────────────

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PlayRequest {
    /// Pattern file or directory of pattern files, relative to the media directory
    #[schema(example = "ocean")]
    path: String,
    /// Brightness ceiling in (0, 1]. Defaults to the server's `--max-brightness`.
    #[schema(example = 0.5)]
    max_brightness: Option<f64>,
    /// Frames per second. Defaults to the server's `--frame-rate`.
    #[schema(example = 30)]
    frame_rate: Option<f64>,
}

type ApiError = (StatusCode, String);

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/patterns", get(get_patterns))
        .route("/api/v1/play", post(post_play))
        .route("/api/v1/stop", post(post_stop))
        .route("/api/v1/clear", post(post_clear))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status: return current playback state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current playback status", body = DisplayStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    let status = render::lock(&state.status).clone();
    Json(status)
}

/// GET /api/v1/patterns: list pattern files under the media directory
#[utoipa::path(
    get,
    path = "/api/v1/patterns",
    tag = "media",
    responses(
        (status = 200, description = "List of available patterns", body = Vec<PatternEntry>)
    )
)]
async fn get_patterns(State(state): State<AppState>) -> Json<Vec<PatternEntry>> {
    Json(media::list_patterns(&state.media_dir))
}

/// POST /api/v1/play: play a pattern file or directory, replacing current playback
#[utoipa::path(
    post,
    path = "/api/v1/play",
    tag = "playback",
    request_body = PlayRequest,
    responses(
        (status = 200, description = "Playback started"),
        (status = 400, description = "Invalid path, brightness or frame rate"),
        (status = 404, description = "Pattern not found"),
        (status = 422, description = "No pattern at the path fits the display")
    )
)]
async fn post_play(
    State(state): State<AppState>,
    Json(req): Json<PlayRequest>,
) -> Result<StatusCode, ApiError> {
    let max_brightness = match req.max_brightness {
        Some(value) => MaxBrightness::new(value).map_err(bad_request)?,
        None => state.defaults.max_brightness,
    };
    let frame_rate = match req.frame_rate {
        Some(fps) => FrameRate::new(fps).map_err(bad_request)?,
        None => state.defaults.frame_rate,
    };

    let full_path = validate_media_path(&state.media_dir, &req.path)?;
    let geometry = state.defaults.geometry();
    // Parsing a directory of patterns is slow file I/O; keep it off the runtime thread.
    let patterns = tokio::task::spawn_blocking(move || {
        media::load_patterns(&full_path).map(|loaded| media::retain_geometry(loaded, geometry))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Pattern loader failed: {e}")))?
    .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    if patterns.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("No pattern at {} is sized {}", req.path, geometry),
        ));
    }

    send(
        &state,
        RenderCommand::Play {
            label: req.path,
            patterns: patterns.into(),
            max_brightness,
            frame_rate,
        },
    )
}

/// POST /api/v1/stop: stop playback, leaving the last frame lit
#[utoipa::path(
    post,
    path = "/api/v1/stop",
    tag = "playback",
    responses(
        (status = 200, description = "Playback stopped"),
    )
)]
async fn post_stop(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, RenderCommand::Stop)
}

/// POST /api/v1/clear: stop playback and blank the display
#[utoipa::path(
    post,
    path = "/api/v1/clear",
    tag = "playback",
    responses(
        (status = 200, description = "Display cleared"),
    )
)]
async fn post_clear(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, RenderCommand::Clear)
}

fn send(state: &AppState, cmd: RenderCommand) -> Result<StatusCode, ApiError> {
    state.command_tx.send(cmd).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Render thread gone".to_string(),
        )
    })?;

    Ok(StatusCode::OK)
}

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

// ── Path validation ──────────────────────────────────────────────────

/// Validate that a requested path is within the media directory.
///
/// Both paths are canonicalized, so `..` components and symlinks that leave
/// the media directory are rejected.
fn validate_media_path(media_dir: &Path, relative_path: &str) -> Result<PathBuf, ApiError> {
    let full_path = media_dir.join(relative_path);

    let canonical = full_path.canonicalize().map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            format!("Path not found: {relative_path}"),
        )
    })?;

    let canonical_media = media_dir.canonicalize().map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Media directory not found".to_string(),
        )
    })?;

    if !canonical.starts_with(&canonical_media) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Path is outside the media directory".to_string(),
        ));
    }

    Ok(canonical)
}
