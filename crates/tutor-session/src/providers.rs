//! Offline collaborator implementations.
//!
//! Deterministic template-driven stand-ins for the interview, research,
//! planning, content and evaluation services. The CLI uses them to run a
//! full session without any external service, and the tests use them as
//! fixtures.

use std::collections::VecDeque;
use std::fmt::Write;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;

use crate::collaborators::{
    ContentArtifact, ContentService, Evaluation, EvaluationService, InterviewService, MediaAsset,
    MediaKind, ResearchService, RoadmapPlanner, Submission,
};
use crate::error::{Result, TutorError};
use crate::profile::{ExperienceLevel, InterviewAnswers, LearnerProfile, Modality};
use crate::roadmap::{Checkpoint, CheckpointKind, ResearchFindings, RoadmapStage};

/// Runs of characters that are not allowed in a URI slug.
static NON_SLUG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").ok());

fn slug(text: &str) -> String {
    let lower = text.to_lowercase();
    let replaced = NON_SLUG
        .as_ref()
        .map_or_else(|| lower.clone(), |re| re.replace_all(&lower, "-").into_owned());
    replaced.trim_matches('-').to_string()
}

// ============================================================================
// Interview
// ============================================================================

/// Interview that returns a fixed set of answers.
#[derive(Debug, Clone)]
pub struct ScriptedInterview {
    answers: InterviewAnswers,
}

impl ScriptedInterview {
    /// Creates an interview that always answers with `answers`.
    #[must_use]
    pub const fn new(answers: InterviewAnswers) -> Self {
        Self { answers }
    }
}

#[async_trait]
impl InterviewService for ScriptedInterview {
    async fn conduct(&self, topic: &str) -> Result<InterviewAnswers> {
        let mut answers = self.answers.clone();
        if answers.topic.is_none() && !topic.trim().is_empty() {
            answers.topic = Some(topic.trim().to_string());
        }
        Ok(answers)
    }
}

// ============================================================================
// Research
// ============================================================================

/// Research that produces templated findings for the learner's subject.
#[derive(Debug, Clone, Copy)]
pub struct TemplateResearch {
    max_findings: usize,
}

impl TemplateResearch {
    /// Creates a research service that keeps at most `max_findings` entries.
    #[must_use]
    pub const fn new(max_findings: usize) -> Self {
        Self { max_findings }
    }
}

#[async_trait]
impl ResearchService for TemplateResearch {
    async fn research(&self, profile: &LearnerProfile) -> Result<ResearchFindings> {
        let topic = profile.subject();
        let findings = [
            format!("Core concepts in {topic}"),
            format!("Latest developments in {topic}"),
            format!("Best practices for {topic}"),
            format!("Common pitfalls when learning {topic}"),
            format!("Real-world applications of {topic}"),
        ];

        Ok(ResearchFindings {
            findings: findings.into_iter().take(self.max_findings).collect(),
            resources: vec![
                format!("Official documentation for {topic}"),
                format!("Community resources for {topic}"),
                format!("Expert tutorials on {topic}"),
            ],
        })
    }
}

// ============================================================================
// Roadmap
// ============================================================================

/// Planner that lays out the classic three-phase roadmap.
#[derive(Debug, Clone, Copy)]
pub struct TemplateRoadmapPlanner {
    pass_threshold: u8,
}

impl TemplateRoadmapPlanner {
    /// Creates a planner whose checkpoints use `pass_threshold`.
    #[must_use]
    pub const fn new(pass_threshold: u8) -> Self {
        Self { pass_threshold }
    }
}

#[async_trait]
impl RoadmapPlanner for TemplateRoadmapPlanner {
    async fn plan(
        &self,
        profile: &LearnerProfile,
        findings: &ResearchFindings,
    ) -> Result<Vec<RoadmapStage>> {
        let topic = profile.subject();
        let threshold = self.pass_threshold;

        let mut foundation = RoadmapStage::new("Foundation")
            .with_content(format!("Understand basic {topic} concepts"))
            .with_content(format!("Set up a {topic} environment"));
        if let Some(first) = findings.findings.iter().find(|f| !f.trim().is_empty()) {
            foundation = foundation.with_content(first.clone());
        }

        Ok(vec![
            foundation
                .with_checkpoint(CheckpointKind::TextQuiz, threshold)
                .with_checkpoint(CheckpointKind::Project, threshold),
            RoadmapStage::new("Core Learning")
                .with_content(format!("Master core {topic} skills"))
                .with_content("Build practical projects")
                .with_checkpoint(CheckpointKind::TextQuiz, threshold)
                .with_checkpoint(CheckpointKind::Project, threshold),
            RoadmapStage::new("Advanced Application")
                .with_content(format!("Apply {topic} to real problems"))
                .with_content("Create a portfolio project")
                .with_checkpoint(CheckpointKind::MultimediaQuiz, threshold)
                .with_checkpoint(CheckpointKind::Project, threshold),
        ])
    }
}

// ============================================================================
// Content
// ============================================================================

/// Content service that renders lessons from templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateContentService;

impl TemplateContentService {
    fn sections(topic: &str, level: ExperienceLevel) -> [String; 4] {
        match level {
            ExperienceLevel::Beginner => [
                format!("Introduction to {topic}"),
                format!("Basic concepts of {topic}"),
                format!("Getting started with {topic}"),
                format!("Simple examples of {topic}"),
            ],
            ExperienceLevel::Intermediate => [
                format!("Advanced concepts in {topic}"),
                format!("Practical applications of {topic}"),
                format!("Best practices for {topic}"),
                format!("Common challenges in {topic}"),
            ],
            ExperienceLevel::Advanced | ExperienceLevel::Expert => [
                format!("Expert-level {topic} techniques"),
                format!("Advanced applications of {topic}"),
                format!("Optimization strategies for {topic}"),
                format!("Future trends in {topic}"),
            ],
        }
    }

    const fn adaptation(modality: Modality) -> &'static str {
        match modality {
            Modality::Visual => {
                "This section includes diagrams and visual examples to help you understand the concepts."
            }
            Modality::Auditory => {
                "This section focuses on explanations and verbal descriptions of the concepts."
            }
            Modality::Text => "This section provides written explanations with worked examples.",
            Modality::Mixed => {
                "This section combines written explanations, diagrams and narrated walkthroughs."
            }
        }
    }

    fn media(modality: Modality, reference_slug: &str) -> Vec<MediaAsset> {
        let kinds: &[MediaKind] = match modality {
            Modality::Text => &[],
            Modality::Visual => &[MediaKind::Image],
            Modality::Auditory => &[MediaKind::Audio],
            Modality::Mixed => &[MediaKind::Image, MediaKind::Audio, MediaKind::Video],
        };

        kinds
            .iter()
            .map(|kind| {
                let (segment, caption) = match kind {
                    MediaKind::Image => ("image", "Diagram"),
                    MediaKind::Audio => ("audio", "Narrated lesson"),
                    MediaKind::Video => ("video", "Video walkthrough"),
                    MediaKind::Text => ("text", "Lesson text"),
                };
                MediaAsset {
                    kind: *kind,
                    uri: format!("content://{segment}/{reference_slug}"),
                    caption: Some(caption.to_string()),
                }
            })
            .collect()
    }
}

#[async_trait]
impl ContentService for TemplateContentService {
    async fn resolve(&self, reference: &str, profile: &LearnerProfile) -> Result<ContentArtifact> {
        if reference.trim().is_empty() {
            return Err(TutorError::collaborator(
                "content",
                "cannot resolve an empty content reference",
            ));
        }

        let level = profile.assessed_level();
        let adaptation = Self::adaptation(profile.modality);

        let mut text = format!("# {reference} ({level} level)\n\n");
        for (number, section) in Self::sections(profile.subject(), level).iter().enumerate() {
            let _ = write!(text, "## {}. {section}\n\n{adaptation}\n\n", number + 1);
        }

        Ok(ContentArtifact {
            reference: reference.to_string(),
            title: reference.to_string(),
            text,
            media: Self::media(profile.modality, &slug(reference)),
        })
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluator that awards a fixed score per checkpoint kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEvaluator;

impl TemplateEvaluator {
    /// Score awarded for a non-empty submission of the given kind.
    #[must_use]
    pub const fn score_for(kind: CheckpointKind) -> u32 {
        match kind {
            CheckpointKind::TextQuiz => 75,
            CheckpointKind::Project => 80,
            CheckpointKind::MultimediaQuiz => 85,
        }
    }
}

#[async_trait]
impl EvaluationService for TemplateEvaluator {
    async fn evaluate(&self, checkpoint: &Checkpoint, submission: &Submission) -> Result<Evaluation> {
        if submission.body.trim().is_empty() {
            return Ok(Evaluation {
                score: 0,
                feedback: Some("No answer was submitted.".to_string()),
            });
        }

        Ok(Evaluation {
            score: Self::score_for(checkpoint.kind),
            feedback: Some(format!(
                "Basic understanding demonstrated in this {}.",
                checkpoint.kind
            )),
        })
    }
}

/// Evaluator that replays a queue of scores, one per submission.
#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    scores: Mutex<VecDeque<u32>>,
}

impl ScriptedEvaluator {
    /// Creates an evaluator that returns `scores` in order.
    #[must_use]
    pub fn new(scores: impl IntoIterator<Item = u32>) -> Self {
        Self {
            scores: Mutex::new(scores.into_iter().collect()),
        }
    }

    /// Number of scores not yet handed out.
    pub async fn remaining(&self) -> usize {
        self.scores.lock().await.len()
    }
}

#[async_trait]
impl EvaluationService for ScriptedEvaluator {
    async fn evaluate(&self, _checkpoint: &Checkpoint, _submission: &Submission) -> Result<Evaluation> {
        let score = self
            .scores
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| TutorError::collaborator("evaluation", "no scripted scores left"))?;

        Ok(Evaluation {
            score,
            feedback: None,
        })
    }
}
