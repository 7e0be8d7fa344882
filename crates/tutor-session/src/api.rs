//! HTTP API for driving tutoring sessions.
//!
//! # Endpoints
//!
//! - `POST /api/sessions` - Start a session from interview answers
//! - `GET /api/sessions` - List stored sessions
//! - `GET /api/sessions/:id` - Get a session's full state
//! - `POST /api/sessions/:id/present` - Present the next checkpoint
//! - `POST /api/sessions/:id/submissions` - Submit an answer for evaluation
//! - `POST /api/sessions/:id/complete-stage` - Finish a stage without checkpoints
//! - `GET /ws` - Stream session events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tutor_session::{create_router, AppState, Config, MemorySessionStore};
//!
//! # async fn example() {
//! let state = AppState::new(Config::default(), Arc::new(MemorySessionStore::new()));
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::collaborators::{SessionStore, Submission};
use crate::config::Config;
use crate::error::TutorError;
use crate::events::ws_handler;
use crate::profile::{InterviewAnswers, ProfileUpdate};
use crate::runner::{PresentedCheckpoint, SessionRunner, SubmissionOutcome};
use crate::session::{SessionId, SessionPhase, SessionState};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the submission endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// The learner's answer.
    pub submission: Submission,
    /// Optional profile change to apply alongside the evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_update: Option<ProfileUpdate>,
}

/// One row of the session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session identifier.
    pub id: SessionId,
    /// Current phase.
    pub phase: SessionPhase,
    /// Index of the current stage.
    pub current_stage: usize,
    /// Number of stages in the roadmap.
    pub stage_count: usize,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            id: state.id,
            phase: state.phase,
            current_stage: state.current_stage,
            stage_count: state.stages.len(),
            updated_at: state.updated_at,
        }
    }
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// The runner driving every session.
    pub runner: Arc<SessionRunner>,
}

impl AppState {
    /// Creates state with a runner built from `config` over `store`.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Self {
        let runner = Arc::new(SessionRunner::from_config(&config, store));
        Self { config, runner }
    }

    /// Creates state around an existing runner.
    #[must_use]
    pub const fn with_runner(config: Config, runner: Arc<SessionRunner>) -> Self {
        Self { config, runner }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Maps session errors onto HTTP responses.
#[derive(Debug)]
struct ApiError(TutorError);

impl From<TutorError> for ApiError {
    fn from(error: TutorError) -> Self {
        Self(error)
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match &self.0 {
            TutorError::IncompleteProfile { .. }
            | TutorError::InvalidRoadmap { .. }
            | TutorError::InvalidScore { .. }
            | TutorError::EmptyResearch => StatusCode::UNPROCESSABLE_ENTITY,
            TutorError::StateMismatch { .. }
            | TutorError::AlreadyEvaluated { .. }
            | TutorError::NotInProgress { .. }
            | TutorError::SessionLocked { .. } => StatusCode::CONFLICT,
            TutorError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            TutorError::Collaborator { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (self.status(), body).into_response()
    }
}

/// Parses a path segment, treating a malformed id as an unknown session.
fn parse_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(TutorError::session_not_found(raw)))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All session routes under `/api`
/// - The event stream at `/ws`
/// - CORS middleware for development
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS for development (allow all origins)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", post(handle_create).get(handle_list))
        .route("/sessions/:id", get(handle_get))
        .route("/sessions/:id/present", post(handle_present))
        .route("/sessions/:id/submissions", post(handle_submit))
        .route("/sessions/:id/complete-stage", post(handle_complete_stage));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/sessions`.
async fn handle_create(
    State(state): State<Arc<AppState>>,
    Json(answers): Json<InterviewAnswers>,
) -> Result<(StatusCode, Json<SessionState>), ApiError> {
    let session = state.runner.start_with_answers(answers).await?;
    info!(session_id = %session.id, phase = %session.phase, "Session created via API");
    Ok((StatusCode::CREATED, Json(session)))
}

/// Handler for `GET /api/sessions`.
async fn handle_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let sessions = state.runner.list().await?;
    Ok(Json(sessions.iter().map(SessionSummary::from).collect()))
}

/// Handler for `GET /api/sessions/:id`.
async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionState>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.runner.load(&id).await?))
}

/// Handler for `POST /api/sessions/:id/present`.
async fn handle_present(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PresentedCheckpoint>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.runner.present_next(&id).await?))
}

/// Handler for `POST /api/sessions/:id/submissions`.
async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let id = parse_id(&id)?;
    let outcome = state
        .runner
        .submit(&id, &request.submission, request.profile_update.as_ref())
        .await?;
    Ok(Json(outcome))
}

/// Handler for `POST /api/sessions/:id/complete-stage`.
async fn handle_complete_stage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionState>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.runner.finish_stage(&id).await?))
}

// ============================================================================
// Tests
// ============================================================================
