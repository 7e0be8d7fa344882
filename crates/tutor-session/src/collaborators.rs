//! Collaborator contracts.
//!
//! The session core never talks to a model, a search engine or a disk
//! directly. It goes through these traits, so deployments can swap the
//! offline template implementations in [`crate::providers`] for real
//! services without touching the state machine.
//!
//! Implementations report failures as `TutorError::Collaborator`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::{InterviewAnswers, LearnerProfile};
use crate::roadmap::{Checkpoint, ResearchFindings, RoadmapStage};
use crate::session::{SessionId, SessionState};
use crate::store::SessionLock;

// ============================================================================
// Content and submissions
// ============================================================================

/// Kind of media carried by an artifact or a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Plain or markdown text.
    Text,
    /// An image.
    Image,
    /// An audio recording.
    Audio,
    /// A video.
    Video,
}

/// A media attachment referenced by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    /// What the URI points at.
    pub kind: MediaKind,
    /// Where to fetch it.
    pub uri: String,
    /// Short description for accessibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Learning material resolved from a content reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentArtifact {
    /// The reference this artifact was resolved from.
    pub reference: String,
    /// Lesson title.
    pub title: String,
    /// Lesson body, in markdown.
    pub text: String,
    /// Supporting media.
    #[serde(default)]
    pub media: Vec<MediaAsset>,
}

/// A learner's answer to a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Medium of the answer.
    pub kind: MediaKind,
    /// Inline text, or a URI for media answers.
    pub body: String,
}

impl Submission {
    /// Creates a text submission.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Text,
            body: body.into(),
        }
    }
}

/// Score and feedback returned by the evaluation collaborator.
///
/// The score is not range-checked here; the state machine rejects anything
/// above 100 when it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Raw score.
    pub score: u32,
    /// Free-text feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

// ============================================================================
// Service traits
// ============================================================================

/// Conducts the intake interview.
#[async_trait]
pub trait InterviewService: Send + Sync {
    /// Interviews the learner about `topic`.
    async fn conduct(&self, topic: &str) -> Result<InterviewAnswers>;
}

/// Gathers background material for a learner.
#[async_trait]
pub trait ResearchService: Send + Sync {
    /// Researches the learner's subject.
    async fn research(&self, profile: &LearnerProfile) -> Result<ResearchFindings>;
}

/// Turns a profile and research into a roadmap.
#[async_trait]
pub trait RoadmapPlanner: Send + Sync {
    /// Plans the stages of a roadmap.
    async fn plan(
        &self,
        profile: &LearnerProfile,
        findings: &ResearchFindings,
    ) -> Result<Vec<RoadmapStage>>;
}

/// Resolves content references into learning material.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Resolves `reference`, tailored to `profile`.
    async fn resolve(&self, reference: &str, profile: &LearnerProfile) -> Result<ContentArtifact>;
}

/// Scores learner submissions.
#[async_trait]
pub trait EvaluationService: Send + Sync {
    /// Evaluates `submission` against `checkpoint`.
    async fn evaluate(&self, checkpoint: &Checkpoint, submission: &Submission) -> Result<Evaluation>;
}

/// Persists session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Saves (creates or overwrites) a session.
    async fn save(&self, state: &SessionState) -> Result<()>;

    /// Loads a session, returning `None` if it does not exist.
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>>;

    /// Lists the identifiers of all stored sessions.
    async fn list(&self) -> Result<Vec<SessionId>>;

    /// Deletes a session, returning `true` if it existed.
    async fn delete(&self, id: &SessionId) -> Result<bool>;

    /// Takes the cross-process lock for a session, held until the guard is
    /// dropped. Stores that live inside one process return `None`.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionLocked` while another process holds it.
    fn acquire_lock(&self, _id: &SessionId) -> Result<Option<SessionLock>> {
        Ok(None)
    }
}
