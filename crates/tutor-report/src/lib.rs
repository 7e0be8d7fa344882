//! Tutoring Session Reports
//!
//! Turns a finished (or in-flight) tutoring session into a [`Report`] that can
//! be serialized to JSON or rendered to Markdown.
//!
//! # Types
//!
//! - [`ReportInput`] - Session data handed over by the caller
//! - [`ReportGenerator`] - Builds a [`Report`] from a [`ReportInput`]
//! - [`Report`] - Learner details, summary, stage results, adaptations,
//!   timeline and recommendations
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use tutor_report::{LearnerInput, ReportGenerator, ReportInput, ReportStatus};
//! use tutor_report::json::JsonGenerator;
//!
//! let input = ReportInput {
//!     session_id: "3f1c".to_string(),
//!     learner: LearnerInput {
//!         topic: "Rust".to_string(),
//!         experience_level: "beginner".to_string(),
//!         goal: "Build a CLI tool".to_string(),
//!         modality: "mixed".to_string(),
//!     },
//!     status: ReportStatus::InProgress,
//!     current_stage: 0,
//!     started_at: Utc::now(),
//!     ended_at: Utc::now(),
//!     stages: vec![],
//!     adaptations: vec![],
//!     guidance: None,
//! };
//!
//! let report = ReportGenerator::new(input).generate();
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("\"learner\""));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Report Status
// ============================================================================

/// Where the session stood when the report was generated.
///
/// A coarse local view of the session phase, so this crate does not depend
/// on the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Learner profile not yet captured.
    #[default]
    Profiling,
    /// Background research running.
    Researching,
    /// Roadmap being planned.
    RoadmapBuilding,
    /// Learner is working through the roadmap.
    InProgress,
    /// Every stage finished.
    Completed,
}

impl ReportStatus {
    /// Returns `true` if the roadmap was finished.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns a human-readable description of the status.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Profiling => "Profiling the learner",
            Self::Researching => "Researching the subject",
            Self::RoadmapBuilding => "Building the roadmap",
            Self::InProgress => "Learning in progress",
            Self::Completed => "Roadmap completed",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// Session data a report is generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInput {
    /// Session identifier.
    pub session_id: String,
    /// Who is learning what.
    pub learner: LearnerInput,
    /// Session status.
    pub status: ReportStatus,
    /// Index of the current stage (equals the stage count once completed).
    pub current_stage: usize,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// When the session was last updated.
    pub ended_at: DateTime<Utc>,
    /// Roadmap stages, in order.
    pub stages: Vec<StageInput>,
    /// Adaptation log, in order.
    pub adaptations: Vec<AdaptationInput>,
    /// Advice computed by the caller from the learner's score band.
    pub guidance: Option<GuidanceInput>,
}

/// Learner profile fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnerInput {
    /// Subject being learned.
    pub topic: String,
    /// Experience level label.
    pub experience_level: String,
    /// Learning goal.
    pub goal: String,
    /// Preferred modality label.
    pub modality: String,
}

/// One roadmap stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInput {
    /// Stage title.
    pub title: String,
    /// Checkpoints in order.
    pub checkpoints: Vec<CheckpointInput>,
}

/// One checkpoint and its result, if evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInput {
    /// Assessment form label (e.g. "text quiz").
    pub kind: String,
    /// Pass threshold.
    pub threshold: u8,
    /// Recorded result.
    pub result: Option<ResultInput>,
}

/// A recorded checkpoint result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultInput {
    /// Score out of 100.
    pub score: u8,
    /// Whether the threshold was met.
    pub passed: bool,
    /// Evaluator feedback.
    pub feedback: Option<String>,
    /// When the result was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// One adaptation log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationInput {
    /// When the decision was applied.
    pub timestamp: DateTime<Utc>,
    /// Stage of the triggering checkpoint.
    pub stage: usize,
    /// Index of the triggering checkpoint.
    pub checkpoint: usize,
    /// Score that triggered the decision.
    pub score: u8,
    /// Decision name (e.g. `replace_remaining_stages`).
    pub decision: String,
    /// Whether the learner profile changed alongside the decision.
    pub profile_changed: bool,
}

/// Band-based advice for the learner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuidanceInput {
    /// What to do next.
    pub next_steps: String,
    /// Areas to concentrate on.
    pub focus_areas: Vec<String>,
    /// Suggested material.
    pub resources: Vec<String>,
}

// ============================================================================
// Report
// ============================================================================

/// Complete session report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    /// Session identifier.
    pub session_id: String,

    /// Who is learning what.
    pub learner: LearnerInput,

    /// Headline numbers.
    pub summary: ReportSummary,

    /// Per-stage checkpoint results.
    pub stages: Vec<StageResult>,

    /// Roadmap changes, in order.
    pub adaptations: Vec<AdaptationRecord>,

    /// Chronological timeline of events.
    pub timeline: Vec<TimelineEntry>,

    /// Prioritized advice.
    pub recommendations: Vec<Recommendation>,
}

impl Report {
    /// Serializes the report to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Checkpoints that were evaluated but not passed.
    pub fn failed_checkpoints(&self) -> impl Iterator<Item = (&StageResult, &CheckpointResult)> {
        self.stages.iter().flat_map(|stage| {
            stage
                .checkpoints
                .iter()
                .filter(|c| c.passed == Some(false))
                .map(move |c| (stage, c))
        })
    }
}

/// Headline numbers for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Session status.
    pub status: ReportStatus,
    /// Stages fully finished.
    pub stages_completed: usize,
    /// Stages in the roadmap.
    pub stage_count: usize,
    /// Checkpoints with a recorded result.
    pub checkpoints_evaluated: usize,
    /// Checkpoints that met their threshold.
    pub checkpoints_passed: usize,
    /// Mean of all recorded scores.
    pub average_score: Option<f64>,
    /// Review stages inserted after low scores.
    pub remediations: usize,
    /// Wall-clock duration in seconds.
    pub duration_seconds: u64,
}

/// Results for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Zero-based position in the roadmap.
    pub index: usize,
    /// Stage title.
    pub title: String,
    /// Whether every checkpoint has a result.
    pub completed: bool,
    /// Checkpoint results.
    pub checkpoints: Vec<CheckpointResult>,
}

/// Result for one checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointResult {
    /// Assessment form label.
    pub kind: String,
    /// Pass threshold.
    pub threshold: u8,
    /// Score, if evaluated.
    pub score: Option<u8>,
    /// Pass flag, if evaluated.
    pub passed: Option<bool>,
    /// Evaluator feedback.
    pub feedback: Option<String>,
}

/// An applied adaptation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRecord {
    /// When it was applied.
    pub timestamp: DateTime<Utc>,
    /// Human-readable trigger, e.g. "Stage 1, checkpoint 1 (40/100)".
    pub trigger: String,
    /// Decision name.
    pub decision: String,
    /// Whether the profile changed too.
    pub profile_changed: bool,
}

/// A timestamped event in the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Short description of the event.
    pub event: String,
    /// Optional additional details.
    pub details: Option<String>,
}

impl TimelineEntry {
    /// Creates an entry with no details.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, event: impl Into<String>) -> Self {
        Self {
            timestamp,
            event: event.into(),
            details: None,
        }
    }

    /// Creates an entry with details.
    #[must_use]
    pub fn with_details(
        timestamp: DateTime<Utc>,
        event: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            event: event.into(),
            details: Some(details.into()),
        }
    }
}

/// A prioritized piece of advice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Priority (1 = highest).
    pub priority: u32,

    /// Category, e.g. "next steps", "review", "focus" or "resource".
    pub category: String,

    /// The advice.
    pub description: String,
}

impl Recommendation {
    /// Creates a new recommendation.
    #[must_use]
    pub fn new(priority: u32, category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            priority,
            category: category.into(),
            description: description.into(),
        }
    }
}

// ============================================================================
// ReportGenerator
// ============================================================================

/// Builds a [`Report`] from session data.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    input: ReportInput,
}

impl ReportGenerator {
    /// Creates a generator for `input`.
    #[must_use]
    pub const fn new(input: ReportInput) -> Self {
        Self { input }
    }

    /// Generates the report.
    #[must_use]
    pub fn generate(self) -> Report {
        let stages = self.stage_results();
        let summary = self.summary(&stages);
        let adaptations = self.adaptation_records();
        let timeline = self.timeline();
        let recommendations = self.recommendations(&stages);

        Report {
            session_id: self.input.session_id,
            learner: self.input.learner,
            summary,
            stages,
            adaptations,
            timeline,
            recommendations,
        }
    }

    fn stage_results(&self) -> Vec<StageResult> {
        self.input
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| StageResult {
                index,
                title: stage.title.clone(),
                completed: stage.checkpoints.iter().all(|c| c.result.is_some()),
                checkpoints: stage
                    .checkpoints
                    .iter()
                    .map(|c| CheckpointResult {
                        kind: c.kind.clone(),
                        threshold: c.threshold,
                        score: c.result.as_ref().map(|r| r.score),
                        passed: c.result.as_ref().map(|r| r.passed),
                        feedback: c.result.as_ref().and_then(|r| r.feedback.clone()),
                    })
                    .collect(),
            })
            .collect()
    }

    fn summary(&self, stages: &[StageResult]) -> ReportSummary {
        let scores: Vec<u8> = stages
            .iter()
            .flat_map(|s| &s.checkpoints)
            .filter_map(|c| c.score)
            .collect();
        let passed = stages
            .iter()
            .flat_map(|s| &s.checkpoints)
            .filter(|c| c.passed == Some(true))
            .count();

        // Stages before the current index are finished by construction
        let stages_completed = self.input.current_stage.min(stages.len());

        let average_score = if scores.is_empty() {
            None
        } else {
            let total: u32 = scores.iter().map(|s| u32::from(*s)).sum();
            #[allow(clippy::cast_precision_loss)]
            let count = scores.len() as f64;
            Some(f64::from(total) / count)
        };

        let duration = self.input.ended_at - self.input.started_at;

        ReportSummary {
            status: self.input.status,
            stages_completed,
            stage_count: stages.len(),
            checkpoints_evaluated: scores.len(),
            checkpoints_passed: passed,
            average_score,
            remediations: self
                .input
                .adaptations
                .iter()
                .filter(|a| a.decision == "replace_remaining_stages")
                .count(),
            duration_seconds: u64::try_from(duration.num_seconds()).unwrap_or(0),
        }
    }

    fn adaptation_records(&self) -> Vec<AdaptationRecord> {
        self.input
            .adaptations
            .iter()
            .map(|a| AdaptationRecord {
                timestamp: a.timestamp,
                trigger: format!(
                    "Stage {}, checkpoint {} ({}/100)",
                    a.stage + 1,
                    a.checkpoint + 1,
                    a.score
                ),
                decision: a.decision.clone(),
                profile_changed: a.profile_changed,
            })
            .collect()
    }

    fn timeline(&self) -> Vec<TimelineEntry> {
        let mut timeline = vec![TimelineEntry::with_details(
            self.input.started_at,
            "Session started",
            format!(
                "{} ({})",
                self.input.learner.topic, self.input.learner.experience_level
            ),
        )];

        for stage in &self.input.stages {
            for checkpoint in &stage.checkpoints {
                if let Some(result) = &checkpoint.result {
                    let verdict = if result.passed { "passed" } else { "not passed" };
                    timeline.push(TimelineEntry::with_details(
                        result.recorded_at,
                        "Checkpoint evaluated",
                        format!(
                            "{}: {} scored {}/100, {verdict}",
                            stage.title, checkpoint.kind, result.score
                        ),
                    ));
                }
            }
        }

        for adaptation in &self.input.adaptations {
            timeline.push(TimelineEntry::with_details(
                adaptation.timestamp,
                "Roadmap adapted",
                adaptation.decision.clone(),
            ));
        }

        if self.input.status.is_success() {
            timeline.push(TimelineEntry::new(self.input.ended_at, "Roadmap completed"));
        }

        timeline.sort_by_key(|e| e.timestamp);
        timeline
    }

    fn recommendations(&self, stages: &[StageResult]) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if let Some(guidance) = &self.input.guidance {
            recommendations.push(Recommendation::new(1, "next steps", &guidance.next_steps));
        }

        for stage in stages {
            for checkpoint in stage.checkpoints.iter().filter(|c| c.passed == Some(false)) {
                recommendations.push(Recommendation::new(
                    2,
                    "review",
                    format!(
                        "Revisit {}: the {} scored {}/100 against a threshold of {}",
                        stage.title,
                        checkpoint.kind,
                        checkpoint.score.unwrap_or_default(),
                        checkpoint.threshold
                    ),
                ));
            }
        }

        if let Some(guidance) = &self.input.guidance {
            for area in &guidance.focus_areas {
                recommendations.push(Recommendation::new(3, "focus", area));
            }
            for resource in &guidance.resources {
                recommendations.push(Recommendation::new(4, "resource", resource));
            }
        }

        recommendations
    }
}

/// Formats a duration in seconds as e.g. "1h 1m 1s".
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

// ============================================================================
// Tests
// ============================================================================
