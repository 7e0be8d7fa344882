//! Adaptive Tutoring Session Engine
//!
//! Drives a learner through profiling, research, roadmap planning and
//! checkpoint evaluation, adapting the roadmap after every result. Exposes
//! the session over an HTTP API with a WebSocket event stream.

pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod policy;
pub mod profile;
pub mod providers;
pub mod roadmap;
pub mod runner;
pub mod session;
pub mod store;

pub use api::{create_router, AppState, ErrorResponse, SessionSummary, SubmitRequest};
pub use collaborators::{
    ContentArtifact, ContentService, Evaluation, EvaluationService, InterviewService, MediaAsset,
    MediaKind, ResearchService, RoadmapPlanner, SessionStore, Submission,
};
pub use config::{AdaptationConfig, Config, EventsConfig, ResearchConfig};
pub use error::{Result, TutorError};
pub use events::{EventBroadcaster, SessionEvent};
pub use policy::{AdaptationContext, AdaptationPolicy, Recommendation, ScoreBand, ThresholdPolicy};
pub use profile::{
    ExperienceLevel, InterviewAnswers, LearnerProfile, Modality, Pace, ProfileUpdate,
};
pub use providers::{
    ScriptedEvaluator, ScriptedInterview, TemplateContentService, TemplateEvaluator,
    TemplateResearch, TemplateRoadmapPlanner,
};
pub use roadmap::{
    Checkpoint, CheckpointKind, EvaluationResult, ResearchFindings, RoadmapStage, MAX_SCORE,
};
pub use runner::{
    average_score, Collaborators, PresentedCheckpoint, SessionRunner, SubmissionOutcome,
};
pub use session::{
    AdaptationDecision, AdaptationEvent, AdaptationTrigger, CheckpointPosition, RoadmapSnapshot,
    SessionId, SessionPhase, SessionState,
};
pub use store::{FileSessionStore, MemorySessionStore, SessionLock, STATE_VERSION};
