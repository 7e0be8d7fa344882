//! Roadmap types: stages, checkpoints and evaluation results.
//!
//! A roadmap is an ordered list of [`RoadmapStage`]s. Each stage owns an
//! ordered list of [`Checkpoint`]s that are evaluated strictly in declared
//! order. A checkpoint's result is written exactly once and never removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// Highest score an evaluation may report.
pub const MAX_SCORE: u8 = 100;

// ============================================================================
// CheckpointKind
// ============================================================================

/// The form an assessment takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Written questions answered in text.
    TextQuiz,
    /// Questions answered with images, audio or video.
    MultimediaQuiz,
    /// A hands-on deliverable.
    Project,
}

impl std::fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextQuiz => write!(f, "text quiz"),
            Self::MultimediaQuiz => write!(f, "multimedia quiz"),
            Self::Project => write!(f, "project"),
        }
    }
}

// ============================================================================
// EvaluationResult
// ============================================================================

/// The recorded outcome of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Score between 0 and 100.
    pub score: u8,

    /// Whether the score met the checkpoint threshold.
    pub passed: bool,

    /// Evaluator feedback, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    /// When the result was recorded.
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// Checkpoint
// ============================================================================

/// An evaluation point within a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Assessment form.
    pub kind: CheckpointKind,

    /// Minimum score required to pass (0-100).
    pub threshold: u8,

    /// Result, absent until evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
}

impl Checkpoint {
    /// Creates an unevaluated checkpoint.
    #[must_use]
    pub const fn new(kind: CheckpointKind, threshold: u8) -> Self {
        Self {
            kind,
            threshold,
            result: None,
        }
    }

    /// Returns `true` once a result has been recorded.
    #[must_use]
    pub const fn is_evaluated(&self) -> bool {
        self.result.is_some()
    }

    /// Returns the recorded score, if any.
    #[must_use]
    pub fn score(&self) -> Option<u8> {
        self.result.as_ref().map(|r| r.score)
    }

    /// Returns an unevaluated copy with the same kind and threshold.
    #[must_use]
    pub const fn fresh_copy(&self) -> Self {
        Self::new(self.kind, self.threshold)
    }
}

// ============================================================================
// RoadmapStage
// ============================================================================

/// One ordered step of the curriculum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapStage {
    /// Stage title shown to the learner.
    pub title: String,

    /// Opaque content identifiers, resolved lazily by the content service.
    #[serde(default)]
    pub content_refs: Vec<String>,

    /// Checkpoints in evaluation order.
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

impl RoadmapStage {
    /// Creates a stage with no content and no checkpoints.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content_refs: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Adds a content reference.
    #[must_use]
    pub fn with_content(mut self, reference: impl Into<String>) -> Self {
        self.content_refs.push(reference.into());
        self
    }

    /// Adds a checkpoint.
    #[must_use]
    pub fn with_checkpoint(mut self, kind: CheckpointKind, threshold: u8) -> Self {
        self.checkpoints.push(Checkpoint::new(kind, threshold));
        self
    }

    /// Returns `true` when every checkpoint has a result.
    ///
    /// A stage with no checkpoints is trivially fully evaluated.
    #[must_use]
    pub fn is_fully_evaluated(&self) -> bool {
        self.checkpoints.iter().all(Checkpoint::is_evaluated)
    }

    /// Index of the first checkpoint without a result.
    #[must_use]
    pub fn next_unevaluated(&self) -> Option<usize> {
        self.checkpoints.iter().position(|c| !c.is_evaluated())
    }

    /// Number of checkpoints whose result passed.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checkpoints
            .iter()
            .filter(|c| c.result.as_ref().is_some_and(|r| r.passed))
            .count()
    }
}

// ============================================================================
// ResearchFindings
// ============================================================================

/// Curated knowledge context produced by the research collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchFindings {
    /// Key findings, one per entry.
    pub findings: Vec<String>,

    /// Supporting resources (titles or URLs).
    #[serde(default)]
    pub resources: Vec<String>,
}

impl ResearchFindings {
    /// Creates findings from a list of entries.
    #[must_use]
    pub fn new<S: Into<String>>(findings: impl IntoIterator<Item = S>) -> Self {
        Self {
            findings: findings.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
        }
    }

    /// Returns `true` if no finding carries any text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.iter().all(|f| f.trim().is_empty())
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Checks the roadmap rules for a complete stage list.
///
/// - the roadmap must contain at least one stage
/// - every stage except the last must declare at least one checkpoint
/// - every threshold must be within `0..=100`
///
/// # Errors
///
/// Returns `TutorError::InvalidRoadmap` describing the first violation.
pub fn validate_stages(stages: &[RoadmapStage]) -> Result<()> {
    if stages.is_empty() {
        return Err(TutorError::invalid_roadmap(
            "a roadmap needs at least one stage",
        ));
    }

    let last = stages.len() - 1;
    for (index, stage) in stages.iter().enumerate() {
        if index < last && stage.checkpoints.is_empty() {
            return Err(TutorError::invalid_roadmap(format!(
                "stage {index} ('{}') is not the final stage and has no checkpoints",
                stage.title
            )));
        }
        if let Some(checkpoint) = stage.checkpoints.iter().find(|c| c.threshold > MAX_SCORE) {
            return Err(TutorError::invalid_roadmap(format!(
                "stage {index} ('{}') has a threshold of {} (maximum is {MAX_SCORE})",
                stage.title, checkpoint.threshold
            )));
        }
    }

    Ok(())
}

/// Checks that freshly planned stages carry no recorded results.
///
/// # Errors
///
/// Returns `TutorError::InvalidRoadmap` if any checkpoint is pre-evaluated.
pub fn ensure_unevaluated(stages: &[RoadmapStage]) -> Result<()> {
    if let Some((index, stage)) = stages
        .iter()
        .enumerate()
        .find(|(_, s)| s.checkpoints.iter().any(Checkpoint::is_evaluated))
    {
        return Err(TutorError::invalid_roadmap(format!(
            "new stage {index} ('{}') already contains evaluation results",
            stage.title
        )));
    }
    Ok(())
}
