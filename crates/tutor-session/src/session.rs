//! Session state machine.
//!
//! [`SessionState`] is the aggregate root of a tutoring session. Every
//! transition is a synchronous method that validates first and mutates only
//! once validation has passed, so a failed call leaves the state untouched.
//!
//! The phases move as follows:
//! - `Profiling` -> `Researching` -> `RoadmapBuilding` -> `InStage(i)`
//! - `InStage(i)` -> `AwaitingEvaluation(i, k)` -> `Adapting(i, k)`
//! - From `Adapting(i, k)`:
//!   - `InStage(i)` (checkpoints remain in stage `i`)
//!   - `InStage(i + 1)` (stage `i` fully evaluated)
//!   - `Completed` (last stage fully evaluated)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TutorError};
use crate::profile::{InterviewAnswers, LearnerProfile, ProfileUpdate};
use crate::roadmap::{
    ensure_unevaluated, validate_stages, Checkpoint, EvaluationResult, ResearchFindings,
    RoadmapStage, MAX_SCORE,
};

// ============================================================================
// SessionId
// ============================================================================

/// Unique identifier of a tutoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// ============================================================================
// SessionPhase
// ============================================================================

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for interview answers.
    #[default]
    Profiling,
    /// Waiting for research findings.
    Researching,
    /// Waiting for the initial roadmap.
    RoadmapBuilding,
    /// Working through a stage.
    InStage {
        /// Index of the current stage.
        stage: usize,
    },
    /// A checkpoint has been presented and awaits its result.
    AwaitingEvaluation {
        /// Index of the current stage.
        stage: usize,
        /// Index of the presented checkpoint.
        checkpoint: usize,
    },
    /// A result has been recorded and an adaptation decision is pending.
    Adapting {
        /// Index of the current stage.
        stage: usize,
        /// Index of the checkpoint that triggered the adaptation.
        checkpoint: usize,
    },
    /// Every stage has been completed.
    Completed,
}

impl SessionPhase {
    /// Returns `true` once the session has completed.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_session::SessionPhase;
    ///
    /// assert!(SessionPhase::Completed.is_terminal());
    /// assert!(!SessionPhase::InStage { stage: 0 }.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Stage index carried by the phase, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<usize> {
        match self {
            Self::InStage { stage }
            | Self::AwaitingEvaluation { stage, .. }
            | Self::Adapting { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Snake-case tag used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Profiling => "profiling",
            Self::Researching => "researching",
            Self::RoadmapBuilding => "roadmap_building",
            Self::InStage { .. } => "in_stage",
            Self::AwaitingEvaluation { .. } => "awaiting_evaluation",
            Self::Adapting { .. } => "adapting",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profiling => write!(f, "profiling"),
            Self::Researching => write!(f, "researching"),
            Self::RoadmapBuilding => write!(f, "building the roadmap"),
            Self::InStage { stage } => write!(f, "in stage {stage}"),
            Self::AwaitingEvaluation { stage, checkpoint } => {
                write!(f, "awaiting evaluation of checkpoint {checkpoint} in stage {stage}")
            }
            Self::Adapting { stage, checkpoint } => {
                write!(f, "adapting after checkpoint {checkpoint} in stage {stage}")
            }
            Self::Completed => write!(f, "completed"),
        }
    }
}

// ============================================================================
// Adaptation
// ============================================================================

/// How the roadmap should change after an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdaptationDecision {
    /// Leave the roadmap as it is.
    KeepRoadmap,
    /// Replace every stage after the current one.
    ReplaceRemainingStages {
        /// The new stages, spliced in after the current stage.
        stages: Vec<RoadmapStage>,
    },
    /// Move on from a fully evaluated stage.
    AdvanceStage,
}

impl AdaptationDecision {
    /// Snake-case name of the decision.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::KeepRoadmap => "keep_roadmap",
            Self::ReplaceRemainingStages { .. } => "replace_remaining_stages",
            Self::AdvanceStage => "advance_stage",
        }
    }

    /// Returns `true` if the decision rewrites the roadmap.
    #[must_use]
    pub const fn is_replacement(&self) -> bool {
        matches!(self, Self::ReplaceRemainingStages { .. })
    }
}

/// Position of a checkpoint within the roadmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointPosition {
    /// Stage index.
    pub stage: usize,
    /// Checkpoint index within the stage.
    pub checkpoint: usize,
}

/// The evaluation that triggered an adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptationTrigger {
    /// Stage index.
    pub stage: usize,
    /// Checkpoint index within the stage.
    pub checkpoint: usize,
    /// The recorded score.
    pub score: u8,
}

/// A roadmap as it was just before a replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapSnapshot {
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Current stage index at the time.
    pub current_stage: usize,
    /// The stages before the replacement.
    pub stages: Vec<RoadmapStage>,
}

/// One entry of the append-only adaptation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptationEvent {
    /// When the adaptation was applied.
    pub timestamp: DateTime<Utc>,

    /// The evaluation that led to it.
    pub trigger: AdaptationTrigger,

    /// What was decided.
    pub decision: AdaptationDecision,

    /// Index into [`SessionState::snapshots`] of the prior roadmap, present
    /// only when the roadmap changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_snapshot: Option<usize>,

    /// The profile as it was before an update made during this adaptation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_profile: Option<LearnerProfile>,
}

// ============================================================================
// SessionState
// ============================================================================

/// Complete state of one tutoring session.
///
/// This state is persisted after every mutation and can be serialized to
/// JSON for the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session identifier.
    pub id: SessionId,

    /// Current phase.
    #[serde(flatten)]
    pub phase: SessionPhase,

    /// Learner profile, set when the session starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<LearnerProfile>,

    /// Research findings, set when research completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research: Option<ResearchFindings>,

    /// Index of the current stage. Equal to `stages.len()` once completed.
    pub current_stage: usize,

    /// The roadmap.
    #[serde(default)]
    pub stages: Vec<RoadmapStage>,

    /// Adaptation log, oldest first.
    #[serde(default)]
    pub adaptations: Vec<AdaptationEvent>,

    /// Roadmaps replaced by adaptations, referenced from the log.
    #[serde(default)]
    pub snapshots: Vec<RoadmapSnapshot>,

    /// Profile prior to an update that has not been logged yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_prior_profile: Option<LearnerProfile>,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the state was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Creates a new session in the `Profiling` phase.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_session::{SessionPhase, SessionState};
    ///
    /// let state = SessionState::new();
    /// assert_eq!(state.phase, SessionPhase::Profiling);
    /// assert!(state.stages.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    /// Creates a new session with a known identifier.
    #[must_use]
    pub fn with_id(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            phase: SessionPhase::Profiling,
            profile: None,
            research: None,
            current_stage: 0,
            stages: Vec::new(),
            adaptations: Vec::new(),
            snapshots: Vec::new(),
            pending_prior_profile: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` once every stage has been completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Duration since the session was created.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.updated_at - self.created_at
    }

    /// Looks up a checkpoint by position.
    #[must_use]
    pub fn checkpoint(&self, position: CheckpointPosition) -> Option<&Checkpoint> {
        self.stages
            .get(position.stage)
            .and_then(|s| s.checkpoints.get(position.checkpoint))
    }

    /// Number of remediation replacements applied so far.
    #[must_use]
    pub fn remediation_count(&self) -> usize {
        self.adaptations
            .iter()
            .filter(|a| a.decision.is_replacement())
            .count()
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Builds the learner profile from interview answers.
    ///
    /// Moves `Profiling -> Researching`.
    ///
    /// # Errors
    ///
    /// - `StateMismatch` if the session is past profiling
    /// - `IncompleteProfile` if experience level or goal is missing
    pub fn start_session(&mut self, answers: InterviewAnswers) -> Result<()> {
        if self.phase != SessionPhase::Profiling {
            return Err(TutorError::state_mismatch("start the session", self.phase));
        }

        self.profile = Some(answers.into_profile()?);
        self.phase = SessionPhase::Researching;
        self.touch();
        Ok(())
    }

    /// Attaches research findings.
    ///
    /// Moves `Researching -> RoadmapBuilding`.
    ///
    /// # Errors
    ///
    /// - `StateMismatch` if the session is not researching
    /// - `EmptyResearch` if no finding carries any text
    pub fn complete_research(&mut self, findings: ResearchFindings) -> Result<()> {
        if self.phase != SessionPhase::Researching {
            return Err(TutorError::state_mismatch("complete research", self.phase));
        }
        if findings.is_empty() {
            return Err(TutorError::EmptyResearch);
        }

        self.research = Some(findings);
        self.phase = SessionPhase::RoadmapBuilding;
        self.touch();
        Ok(())
    }

    /// Installs the initial roadmap.
    ///
    /// Moves `RoadmapBuilding -> InStage(0)`.
    ///
    /// # Errors
    ///
    /// - `StateMismatch` if the session is not building its roadmap
    /// - `InvalidRoadmap` if the stages break the roadmap rules
    pub fn build_roadmap(&mut self, stages: Vec<RoadmapStage>) -> Result<()> {
        if self.phase != SessionPhase::RoadmapBuilding {
            return Err(TutorError::state_mismatch("build the roadmap", self.phase));
        }
        validate_stages(&stages)?;
        ensure_unevaluated(&stages)?;

        self.stages = stages;
        self.current_stage = 0;
        self.phase = SessionPhase::InStage { stage: 0 };
        self.touch();
        Ok(())
    }

    /// Presents the next checkpoint of the current stage.
    ///
    /// Moves `InStage(i) -> AwaitingEvaluation(i, k)`.
    ///
    /// # Errors
    ///
    /// Returns `StateMismatch` unless the session is in `stage`, and
    /// `checkpoint` is that stage's first unevaluated checkpoint.
    pub fn present_checkpoint(&mut self, stage: usize, checkpoint: usize) -> Result<()> {
        let operation = || format!("present checkpoint {checkpoint} of stage {stage}");

        let SessionPhase::InStage { stage: current } = self.phase else {
            return Err(TutorError::state_mismatch(operation(), self.phase));
        };
        if stage != current {
            return Err(TutorError::state_mismatch(operation(), self.phase));
        }
        let next = self.stages.get(stage).and_then(RoadmapStage::next_unevaluated);
        if next != Some(checkpoint) {
            return Err(TutorError::state_mismatch(operation(), self.phase));
        }

        self.phase = SessionPhase::AwaitingEvaluation { stage, checkpoint };
        self.touch();
        Ok(())
    }

    /// Records the result of the presented checkpoint.
    ///
    /// Moves `AwaitingEvaluation(i, k) -> Adapting(i, k)`.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// - `StateMismatch` if the position does not exist
    /// - `AlreadyEvaluated` if the checkpoint already has a result
    /// - `StateMismatch` if the checkpoint is not the one awaiting evaluation
    /// - `InvalidScore` if `score` exceeds 100
    pub fn record_evaluation(
        &mut self,
        stage: usize,
        checkpoint: usize,
        score: u32,
    ) -> Result<&EvaluationResult> {
        self.record_evaluation_with_feedback(stage, checkpoint, score, None)
    }

    /// Records the result of the presented checkpoint along with evaluator
    /// feedback. See [`SessionState::record_evaluation`].
    pub fn record_evaluation_with_feedback(
        &mut self,
        stage: usize,
        checkpoint: usize,
        score: u32,
        feedback: Option<String>,
    ) -> Result<&EvaluationResult> {
        let operation = || format!("record evaluation for checkpoint {checkpoint} of stage {stage}");
        let position = CheckpointPosition { stage, checkpoint };

        let Some(target) = self.checkpoint(position) else {
            return Err(TutorError::state_mismatch(operation(), self.phase));
        };
        if let Some(existing) = &target.result {
            return Err(TutorError::AlreadyEvaluated {
                stage,
                checkpoint,
                score: existing.score,
            });
        }
        if self.phase != (SessionPhase::AwaitingEvaluation { stage, checkpoint }) {
            return Err(TutorError::state_mismatch(operation(), self.phase));
        }
        let score = u8::try_from(score)
            .ok()
            .filter(|s| *s <= MAX_SCORE)
            .ok_or(TutorError::InvalidScore { score })?;

        let threshold = target.threshold;
        self.phase = SessionPhase::Adapting { stage, checkpoint };
        self.touch();

        let slot = &mut self.stages[stage].checkpoints[checkpoint].result;
        Ok(slot.insert(EvaluationResult {
            score,
            passed: score >= threshold,
            feedback,
            recorded_at: Utc::now(),
        }))
    }

    /// Replaces parts of the learner profile while adapting.
    ///
    /// The profile as it was before the first update is recorded in the next
    /// adaptation log entry.
    ///
    /// # Errors
    ///
    /// - `StateMismatch` unless the session is adapting
    /// - `IncompleteProfile` if the update blanks the goal
    pub fn update_profile(&mut self, update: &ProfileUpdate) -> Result<()> {
        let adapting = matches!(self.phase, SessionPhase::Adapting { .. });
        let Some(current) = self.profile.as_ref().filter(|_| adapting) else {
            return Err(TutorError::state_mismatch(
                "update the learner profile",
                self.phase,
            ));
        };

        let next = current.updated(update)?;
        let prior = std::mem::replace(&mut self.profile, Some(next));
        if self.pending_prior_profile.is_none() {
            self.pending_prior_profile = prior;
        }
        self.touch();
        Ok(())
    }

    /// Applies an adaptation decision and settles the next phase.
    ///
    /// After the decision is logged, the session stays in the current stage
    /// while checkpoints remain, moves to the next stage once the current one
    /// is fully evaluated, or completes after the last stage.
    ///
    /// # Errors
    ///
    /// - `StateMismatch` unless the session is adapting
    /// - `StateMismatch` for `AdvanceStage` while checkpoints remain
    /// - `InvalidRoadmap` if a replacement breaks the roadmap rules
    pub fn apply_adaptation(&mut self, decision: AdaptationDecision) -> Result<()> {
        let SessionPhase::Adapting { stage, checkpoint } = self.phase else {
            return Err(TutorError::state_mismatch(
                format!("apply {}", decision.name()),
                self.phase,
            ));
        };
        let Some(score) = self
            .checkpoint(CheckpointPosition { stage, checkpoint })
            .and_then(Checkpoint::score)
        else {
            return Err(TutorError::state_mismatch(
                format!("apply {}", decision.name()),
                self.phase,
            ));
        };

        let replacement = match &decision {
            AdaptationDecision::KeepRoadmap => None,
            AdaptationDecision::AdvanceStage => {
                if !self.stages[stage].is_fully_evaluated() {
                    return Err(TutorError::state_mismatch(
                        format!("advance past stage {stage} with checkpoints remaining"),
                        self.phase,
                    ));
                }
                None
            }
            AdaptationDecision::ReplaceRemainingStages { stages } => {
                ensure_unevaluated(stages)?;
                let mut next = self.stages[..=stage].to_vec();
                next.extend(stages.iter().cloned());
                validate_stages(&next)?;
                Some(next)
            }
        };

        let now = Utc::now();
        let prior_snapshot = replacement.map(|next| {
            self.snapshots.push(RoadmapSnapshot {
                taken_at: now,
                current_stage: stage,
                stages: std::mem::replace(&mut self.stages, next),
            });
            self.snapshots.len() - 1
        });
        self.adaptations.push(AdaptationEvent {
            timestamp: now,
            trigger: AdaptationTrigger {
                stage,
                checkpoint,
                score,
            },
            decision,
            prior_snapshot,
            prior_profile: self.pending_prior_profile.take(),
        });

        self.settle(stage);
        self.touch();
        Ok(())
    }

    /// Finishes a current stage that declares no checkpoints.
    ///
    /// # Errors
    ///
    /// Returns `StateMismatch` unless the session is in a stage with no
    /// unevaluated checkpoints.
    pub fn complete_stage(&mut self) -> Result<()> {
        let SessionPhase::InStage { stage } = self.phase else {
            return Err(TutorError::state_mismatch("complete the current stage", self.phase));
        };
        if !self.stages.get(stage).is_some_and(RoadmapStage::is_fully_evaluated) {
            return Err(TutorError::state_mismatch(
                format!("complete stage {stage} with checkpoints remaining"),
                self.phase,
            ));
        }

        self.settle(stage);
        self.touch();
        Ok(())
    }

    /// Moves past `stage` if it is fully evaluated.
    fn settle(&mut self, stage: usize) {
        let fully_evaluated = self
            .stages
            .get(stage)
            .map_or(true, RoadmapStage::is_fully_evaluated);

        if !fully_evaluated {
            self.current_stage = stage;
            self.phase = SessionPhase::InStage { stage };
        } else if stage + 1 < self.stages.len() {
            self.current_stage = stage + 1;
            self.phase = SessionPhase::InStage { stage: stage + 1 };
        } else {
            self.current_stage = self.stages.len();
            self.phase = SessionPhase::Completed;
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// The stage the learner is working on.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress` before the roadmap exists or after completion.
    pub fn current_stage(&self) -> Result<&RoadmapStage> {
        self.phase
            .stage()
            .and_then(|index| self.stages.get(index))
            .ok_or_else(|| TutorError::not_in_progress(self.phase))
    }

    /// The checkpoint awaiting evaluation, or else the next unevaluated
    /// checkpoint of the current stage.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress` before the roadmap exists or after completion.
    pub fn current_checkpoint(&self) -> Result<Option<CheckpointPosition>> {
        if let SessionPhase::AwaitingEvaluation { stage, checkpoint } = self.phase {
            return Ok(Some(CheckpointPosition { stage, checkpoint }));
        }
        let stage = self.current_stage()?;
        Ok(stage.next_unevaluated().map(|checkpoint| CheckpointPosition {
            stage: self.current_stage,
            checkpoint,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::profile::{ExperienceLevel, Modality};
    use crate::roadmap::CheckpointKind;

    fn answers() -> InterviewAnswers {
        InterviewAnswers {
            topic: Some("Linear algebra".to_string()),
            experience_level: Some(ExperienceLevel::Beginner),
            goal: Some("Understand eigenvectors".to_string()),
            modality: Some(Modality::Visual),
        }
    }

    fn stage(title: &str, checkpoints: usize) -> RoadmapStage {
        (0..checkpoints).fold(RoadmapStage::new(title), |s, _| {
            s.with_checkpoint(CheckpointKind::TextQuiz, 70)
        })
    }

    fn session_with(stages: Vec<RoadmapStage>) -> SessionState {
        let mut state = SessionState::new();
        state.start_session(answers()).unwrap();
        state
            .complete_research(ResearchFindings::new(["Core concepts in linear algebra"]))
            .unwrap();
        state.build_roadmap(stages).unwrap();
        state
    }

    fn evaluate(state: &mut SessionState, stage: usize, checkpoint: usize, score: u32) {
        state.present_checkpoint(stage, checkpoint).unwrap();
        state.record_evaluation(stage, checkpoint, score).unwrap();
    }

    // ------------------------------------------------------------------------
    // Phase tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::InStage { stage: 0 }).unwrap(),
            r#"{"phase":"in_stage","stage":0}"#
        );
        assert_eq!(
            serde_json::to_string(&SessionPhase::RoadmapBuilding).unwrap(),
            r#"{"phase":"roadmap_building"}"#
        );

        let phase: SessionPhase =
            serde_json::from_str(r#"{"phase":"adapting","stage":2,"checkpoint":1}"#).unwrap();
        assert_eq!(phase, SessionPhase::Adapting { stage: 2, checkpoint: 1 });
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    // ------------------------------------------------------------------------
    // Setup transitions
    // ------------------------------------------------------------------------

    #[test]
    fn test_start_session_requires_level_and_goal() {
        let mut state = SessionState::new();
        let err = state
            .start_session(InterviewAnswers {
                goal: Some("Learn".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, TutorError::IncompleteProfile { .. }));
        assert_eq!(state.phase, SessionPhase::Profiling);
        assert!(state.profile.is_none());
    }

    #[test]
    fn test_start_session_twice_is_rejected() {
        let mut state = SessionState::new();
        state.start_session(answers()).unwrap();
        let err = state.start_session(answers()).unwrap_err();
        assert!(matches!(err, TutorError::StateMismatch { .. }));
    }

    #[test]
    fn test_complete_research_rejects_empty_findings() {
        let mut state = SessionState::new();
        state.start_session(answers()).unwrap();

        let err = state.complete_research(ResearchFindings::default()).unwrap_err();
        assert!(matches!(err, TutorError::EmptyResearch));
        assert_eq!(state.phase, SessionPhase::Researching);
    }

    #[test]
    fn test_single_terminal_stage_without_checkpoints() {
        let mut state = session_with(vec![stage("Overview", 0)]);
        assert_eq!(state.phase, SessionPhase::InStage { stage: 0 });
        assert_eq!(state.current_checkpoint().unwrap(), None);

        state.complete_stage().unwrap();
        assert_eq!(state.phase, SessionPhase::Completed);
        assert_eq!(state.current_stage, 1);
    }

    #[test]
    fn test_non_terminal_stage_without_checkpoints_rejected() {
        let mut state = SessionState::new();
        state.start_session(answers()).unwrap();
        state.complete_research(ResearchFindings::new(["x"])).unwrap();

        let err = state
            .build_roadmap(vec![stage("Intro", 0), stage("Practice", 1)])
            .unwrap_err();
        assert!(matches!(err, TutorError::InvalidRoadmap { .. }));
        assert_eq!(state.phase, SessionPhase::RoadmapBuilding);
        assert!(state.stages.is_empty());
    }

    // ------------------------------------------------------------------------
    // Checkpoint sequencing
    // ------------------------------------------------------------------------

    #[test]
    fn test_present_checkpoint_in_future_stage_rejected() {
        let mut state = session_with(vec![stage("One", 1), stage("Two", 1)]);
        let err = state.present_checkpoint(1, 0).unwrap_err();
        assert!(matches!(err, TutorError::StateMismatch { .. }));
        assert_eq!(state.phase, SessionPhase::InStage { stage: 0 });
    }

    #[test]
    fn test_present_checkpoint_out_of_order_rejected() {
        let mut state = session_with(vec![stage("One", 2)]);
        assert!(state.present_checkpoint(0, 1).is_err());
        assert!(state.present_checkpoint(0, 0).is_ok());
        assert!(state.present_checkpoint(0, 0).is_err());
    }

    #[test]
    fn test_record_evaluation_requires_presentation() {
        let mut state = session_with(vec![stage("One", 1)]);
        let err = state.record_evaluation(0, 0, 80).unwrap_err();
        assert!(matches!(err, TutorError::StateMismatch { .. }));

        let err = state.record_evaluation(3, 0, 80).unwrap_err();
        assert!(matches!(err, TutorError::StateMismatch { .. }));
    }

    #[test]
    fn test_record_evaluation_rejects_out_of_range_score() {
        let mut state = session_with(vec![stage("One", 1)]);
        state.present_checkpoint(0, 0).unwrap();

        let err = state.record_evaluation(0, 0, 101).unwrap_err();
        assert!(matches!(err, TutorError::InvalidScore { score: 101 }));
        assert_eq!(
            state.phase,
            SessionPhase::AwaitingEvaluation { stage: 0, checkpoint: 0 }
        );
        assert!(!state.stages[0].checkpoints[0].is_evaluated());
    }

    #[test]
    fn test_record_evaluation_sets_pass_flag_and_feedback() {
        let mut state = session_with(vec![stage("One", 1)]);
        state.present_checkpoint(0, 0).unwrap();
        let result = state
            .record_evaluation_with_feedback(0, 0, 70, Some("Solid".to_string()))
            .unwrap();
        assert_eq!(result.score, 70);
        assert!(result.passed);
        assert_eq!(result.feedback.as_deref(), Some("Solid"));
        assert_eq!(state.phase, SessionPhase::Adapting { stage: 0, checkpoint: 0 });
    }

    #[test]
    fn test_repeated_evaluation_always_already_evaluated() {
        let mut state = session_with(vec![stage("One", 2)]);
        evaluate(&mut state, 0, 0, 55);

        for score in [55, 90, 0] {
            let err = state.record_evaluation(0, 0, score).unwrap_err();
            assert!(matches!(
                err,
                TutorError::AlreadyEvaluated { stage: 0, checkpoint: 0, score: 55 }
            ));
        }

        state.apply_adaptation(AdaptationDecision::KeepRoadmap).unwrap();
        let err = state.record_evaluation(0, 0, 99).unwrap_err();
        assert!(matches!(err, TutorError::AlreadyEvaluated { score: 55, .. }));
        assert_eq!(state.stages[0].checkpoints[0].score(), Some(55));
    }

    // ------------------------------------------------------------------------
    // Adaptation
    // ------------------------------------------------------------------------

    #[test]
    fn test_replace_remaining_after_low_score() {
        let mut state = session_with(vec![stage("S0", 1), stage("S1", 1), stage("S2", 1)]);
        evaluate(&mut state, 0, 0, 40);

        state
            .apply_adaptation(AdaptationDecision::ReplaceRemainingStages {
                stages: vec![stage("New1", 1), stage("New2", 1)],
            })
            .unwrap();

        let titles: Vec<_> = state.stages.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["S0", "New1", "New2"]);
        assert_eq!(state.stages[0].checkpoints[0].score(), Some(40));
        assert_eq!(state.current_stage, 1);
        assert_eq!(state.phase, SessionPhase::InStage { stage: 1 });

        let event = &state.adaptations[0];
        assert_eq!(event.trigger.score, 40);
        assert_eq!(event.prior_snapshot, Some(0));
        assert_eq!(state.snapshots[0].stages.len(), 3);
        assert_eq!(state.remediation_count(), 1);
    }

    #[test]
    fn test_keep_roadmap_stays_in_stage_while_checkpoints_remain() {
        let mut state = session_with(vec![stage("S0", 2), stage("S1", 1)]);
        evaluate(&mut state, 0, 0, 80);
        state.apply_adaptation(AdaptationDecision::KeepRoadmap).unwrap();

        assert_eq!(state.phase, SessionPhase::InStage { stage: 0 });
        assert_eq!(
            state.current_checkpoint().unwrap(),
            Some(CheckpointPosition { stage: 0, checkpoint: 1 })
        );
        assert_eq!(state.adaptations[0].prior_snapshot, None);
    }

    #[test]
    fn test_advance_with_checkpoints_remaining_rejected() {
        let mut state = session_with(vec![stage("S0", 2), stage("S1", 1)]);
        evaluate(&mut state, 0, 0, 95);

        let err = state.apply_adaptation(AdaptationDecision::AdvanceStage).unwrap_err();
        assert!(matches!(err, TutorError::StateMismatch { .. }));
        assert_eq!(state.phase, SessionPhase::Adapting { stage: 0, checkpoint: 0 });
        assert!(state.adaptations.is_empty());
    }

    #[test]
    fn test_invalid_replacement_leaves_state_unchanged() {
        let mut state = session_with(vec![stage("S0", 1), stage("S1", 1)]);
        evaluate(&mut state, 0, 0, 30);
        let before = state.clone();

        let err = state
            .apply_adaptation(AdaptationDecision::ReplaceRemainingStages {
                stages: vec![stage("Empty", 0), stage("Tail", 1)],
            })
            .unwrap_err();
        assert!(matches!(err, TutorError::InvalidRoadmap { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_apply_adaptation_outside_adapting_rejected() {
        let mut state = session_with(vec![stage("S0", 1)]);
        let err = state.apply_adaptation(AdaptationDecision::KeepRoadmap).unwrap_err();
        assert!(matches!(err, TutorError::StateMismatch { .. }));
    }

    #[test]
    fn test_update_profile_only_while_adapting() {
        let mut state = session_with(vec![stage("S0", 1), stage("S1", 1)]);
        let update = ProfileUpdate {
            modality: Some(Modality::Text),
            ..Default::default()
        };
        assert!(state.update_profile(&update).is_err());

        evaluate(&mut state, 0, 0, 60);
        state.update_profile(&update).unwrap();
        state
            .update_profile(&ProfileUpdate {
                experience_level: Some(ExperienceLevel::Intermediate),
                ..Default::default()
            })
            .unwrap();
        state.apply_adaptation(AdaptationDecision::AdvanceStage).unwrap();

        let profile = state.profile.as_ref().unwrap();
        assert_eq!(profile.modality, Modality::Text);
        assert_eq!(profile.experience_level, ExperienceLevel::Intermediate);

        let prior = state.adaptations[0].prior_profile.as_ref().unwrap();
        assert_eq!(prior.modality, Modality::Visual);
        assert_eq!(prior.experience_level, ExperienceLevel::Beginner);
    }

    // ------------------------------------------------------------------------
    // Full path
    // ------------------------------------------------------------------------

    #[test]
    fn test_happy_path_to_completion() {
        let mut state = session_with(vec![stage("S0", 1), stage("S1", 1)]);

        evaluate(&mut state, 0, 0, 85);
        state.apply_adaptation(AdaptationDecision::AdvanceStage).unwrap();
        assert_eq!(state.phase, SessionPhase::InStage { stage: 1 });
        assert_eq!(state.current_stage().unwrap().title, "S1");

        evaluate(&mut state, 1, 0, 92);
        state.apply_adaptation(AdaptationDecision::AdvanceStage).unwrap();
        assert_eq!(state.phase, SessionPhase::Completed);
        assert_eq!(state.current_stage, state.stages.len());
        assert!(state.is_completed());

        assert!(matches!(
            state.current_stage(),
            Err(TutorError::NotInProgress { .. })
        ));
        assert!(matches!(
            state.current_checkpoint(),
            Err(TutorError::NotInProgress { .. })
        ));
        assert!(state.present_checkpoint(1, 0).is_err());
    }

    #[test]
    fn test_accessors_before_roadmap() {
        let state = SessionState::new();
        assert!(matches!(
            state.current_stage(),
            Err(TutorError::NotInProgress { .. })
        ));
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut state = session_with(vec![stage("S0", 1), stage("S1", 1)]);
        evaluate(&mut state, 0, 0, 45);
        state
            .apply_adaptation(AdaptationDecision::ReplaceRemainingStages {
                stages: vec![stage("Review", 1)],
            })
            .unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let restored: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
