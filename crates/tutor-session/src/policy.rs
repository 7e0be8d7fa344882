//! Adaptation policy.
//!
//! After every recorded evaluation the runner asks an [`AdaptationPolicy`]
//! what to do with the roadmap. The default [`ThresholdPolicy`] inserts a
//! review stage after low scores and otherwise advances through the roadmap.

use serde::{Deserialize, Serialize};

use crate::config::AdaptationConfig;
use crate::error::{Result, TutorError};
use crate::roadmap::{Checkpoint, RoadmapStage};
use crate::session::{AdaptationDecision, CheckpointPosition, SessionPhase, SessionState};

const REVIEW_PREFIX: &str = "Review: ";

// ============================================================================
// AdaptationContext
// ============================================================================

/// What a policy gets to see when deciding.
#[derive(Debug, Clone, Copy)]
pub struct AdaptationContext<'a> {
    /// Index of the current stage.
    pub stage_index: usize,
    /// The current stage, including the just-recorded result.
    pub stage: &'a RoadmapStage,
    /// Index of the evaluated checkpoint.
    pub checkpoint: usize,
    /// The recorded score.
    pub score: u8,
    /// The checkpoint's pass threshold.
    pub threshold: u8,
    /// Stages after the current one.
    pub remaining: &'a [RoadmapStage],
    /// Replacements applied earlier in the session.
    pub remediations: usize,
}

impl<'a> AdaptationContext<'a> {
    /// Builds the context for a session that is adapting.
    ///
    /// # Errors
    ///
    /// Returns `StateMismatch` unless the session is in the `Adapting` phase.
    pub fn from_session(state: &'a SessionState) -> Result<Self> {
        let mismatch = || TutorError::state_mismatch("decide an adaptation", state.phase);

        let SessionPhase::Adapting { stage, checkpoint } = state.phase else {
            return Err(mismatch());
        };
        let current = state.stages.get(stage).ok_or_else(mismatch)?;
        let evaluated = state
            .checkpoint(CheckpointPosition { stage, checkpoint })
            .ok_or_else(mismatch)?;
        let score = evaluated.score().ok_or_else(mismatch)?;

        Ok(Self {
            stage_index: stage,
            stage: current,
            checkpoint,
            score,
            threshold: evaluated.threshold,
            remaining: state.stages.get(stage + 1..).unwrap_or_default(),
            remediations: state.remediation_count(),
        })
    }

    /// Returns `true` when the current stage has no checkpoints left.
    #[must_use]
    pub fn stage_fully_evaluated(&self) -> bool {
        self.stage.is_fully_evaluated()
    }

    /// Returns `true` if the score met the checkpoint threshold.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.score >= self.threshold
    }
}

// ============================================================================
// AdaptationPolicy
// ============================================================================

/// Decides how the roadmap changes after an evaluation.
pub trait AdaptationPolicy: Send + Sync {
    /// Returns the decision for the given context.
    fn decide(&self, context: &AdaptationContext<'_>) -> AdaptationDecision;
}

// ============================================================================
// ThresholdPolicy
// ============================================================================

/// Score-band policy.
///
/// - below `remediation_below` (and under the remediation cap): insert a
///   review of the current stage ahead of the remaining stages
/// - otherwise, with the stage fully evaluated: advance
/// - otherwise: keep the roadmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    /// Scores below this trigger a review stage.
    pub remediation_below: u8,
    /// Scores at or above this earn the "advanced" recommendation.
    pub accelerate_above: u8,
    /// Upper bound on review stages per session.
    pub max_remediations: usize,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::from(&AdaptationConfig::default())
    }
}

impl From<&AdaptationConfig> for ThresholdPolicy {
    fn from(config: &AdaptationConfig) -> Self {
        Self {
            remediation_below: config.remediation_below,
            accelerate_above: config.accelerate_above,
            max_remediations: config.max_remediations,
        }
    }
}

impl ThresholdPolicy {
    /// Places a score in its band.
    #[must_use]
    pub const fn band(&self, score: u8) -> ScoreBand {
        if score >= self.accelerate_above {
            ScoreBand::Advanced
        } else if score >= self.remediation_below {
            ScoreBand::Proficient
        } else {
            ScoreBand::NeedsReview
        }
    }

    /// Advice for a learner who scored `score` on `topic`.
    #[must_use]
    pub fn recommendation(&self, score: u8, topic: &str) -> Recommendation {
        let band = self.band(score);
        let (next_steps, focus_areas, resources) = match band {
            ScoreBand::Advanced => (
                format!("Excellent! Ready for advanced {topic} concepts"),
                vec!["advanced applications", "optimization techniques"],
                vec![
                    format!("Advanced {topic} tutorials"),
                    format!("{topic} case studies"),
                    format!("Expert {topic} techniques"),
                ],
            ),
            ScoreBand::Proficient => (
                format!("Good progress! Continue with intermediate {topic} topics"),
                vec!["practical applications", "problem-solving"],
                vec![
                    format!("Intermediate {topic} tutorials"),
                    format!("{topic} practice exercises"),
                ],
            ),
            ScoreBand::NeedsReview => (
                format!("Let's review the basics of {topic} before moving forward"),
                vec!["fundamental concepts", "basic applications"],
                vec![
                    format!("Beginner {topic} tutorials"),
                    format!("{topic} fundamentals review"),
                ],
            ),
        };

        Recommendation {
            band,
            next_steps,
            focus_areas: focus_areas.into_iter().map(String::from).collect(),
            resources,
        }
    }

    fn review_of(stage: &RoadmapStage) -> RoadmapStage {
        let subject = stage
            .title
            .strip_prefix(REVIEW_PREFIX)
            .unwrap_or(&stage.title);
        RoadmapStage {
            title: format!("{REVIEW_PREFIX}{subject}"),
            content_refs: stage.content_refs.clone(),
            checkpoints: stage.checkpoints.iter().map(Checkpoint::fresh_copy).collect(),
        }
    }
}

impl AdaptationPolicy for ThresholdPolicy {
    fn decide(&self, context: &AdaptationContext<'_>) -> AdaptationDecision {
        let remediate = context.score < self.remediation_below
            && context.remediations < self.max_remediations
            && !context.stage.checkpoints.is_empty();

        if remediate {
            let mut stages = Vec::with_capacity(context.remaining.len() + 1);
            stages.push(Self::review_of(context.stage));
            stages.extend(context.remaining.iter().cloned());
            AdaptationDecision::ReplaceRemainingStages { stages }
        } else if context.stage_fully_evaluated() {
            AdaptationDecision::AdvanceStage
        } else {
            AdaptationDecision::KeepRoadmap
        }
    }
}

// ============================================================================
// Recommendations
// ============================================================================

/// Performance band of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// Ready for advanced material.
    Advanced,
    /// On track.
    Proficient,
    /// Should revisit the fundamentals.
    NeedsReview,
}

/// Next-step advice derived from a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Band the score falls in.
    pub band: ScoreBand,
    /// One-line advice.
    pub next_steps: String,
    /// Areas to focus on.
    pub focus_areas: Vec<String>,
    /// Suggested resources.
    pub resources: Vec<String>,
}
