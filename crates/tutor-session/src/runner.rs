//! Session runner.
//!
//! [`SessionRunner`] drives sessions end to end: it calls the collaborators,
//! feeds their results into the state machine, asks the adaptation policy
//! for decisions, persists every mutation and broadcasts events.
//!
//! Each operation works on a copy of the stored state and only saves it once
//! every step has succeeded. A failing collaborator therefore leaves the
//! stored session exactly as it was.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::collaborators::{
    ContentArtifact, ContentService, EvaluationService, InterviewService, ResearchService,
    RoadmapPlanner, SessionStore, Submission,
};
use crate::config::Config;
use crate::error::{Result, TutorError};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::policy::{AdaptationContext, AdaptationPolicy, ThresholdPolicy};
use crate::profile::{InterviewAnswers, ProfileUpdate};
use crate::providers::{
    ScriptedInterview, TemplateContentService, TemplateEvaluator, TemplateResearch,
    TemplateRoadmapPlanner,
};
use crate::roadmap::{CheckpointKind, EvaluationResult};
use crate::session::{CheckpointPosition, SessionId, SessionPhase, SessionState};
use crate::store::SessionLock;

// ============================================================================
// Outcomes
// ============================================================================

/// A checkpoint ready for the learner, with its stage's material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentedCheckpoint {
    /// The session.
    pub session_id: SessionId,
    /// Stage index.
    pub stage: usize,
    /// Checkpoint index within the stage.
    pub checkpoint: usize,
    /// Title of the stage.
    pub stage_title: String,
    /// Assessment form.
    pub kind: CheckpointKind,
    /// Pass threshold.
    pub threshold: u8,
    /// Resolved learning material for the stage.
    pub content: Vec<ContentArtifact>,
}

/// What happened to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// The recorded result.
    pub result: EvaluationResult,
    /// Name of the adaptation decision that was applied.
    pub decision: String,
    /// The session after the adaptation.
    pub session: SessionState,
}

// ============================================================================
// Collaborators
// ============================================================================

/// The set of services a runner calls out to.
#[derive(Clone)]
pub struct Collaborators {
    /// Intake interview.
    pub interview: Arc<dyn InterviewService>,
    /// Background research.
    pub research: Arc<dyn ResearchService>,
    /// Roadmap planning.
    pub planner: Arc<dyn RoadmapPlanner>,
    /// Content resolution.
    pub content: Arc<dyn ContentService>,
    /// Submission scoring.
    pub evaluator: Arc<dyn EvaluationService>,
}

impl Collaborators {
    /// Offline template collaborators configured from `config`.
    ///
    /// The interview answers nothing until replaced with
    /// [`SessionRunner::with_interview`].
    #[must_use]
    pub fn templates(config: &Config) -> Self {
        Self {
            interview: Arc::new(ScriptedInterview::new(InterviewAnswers::default())),
            research: Arc::new(TemplateResearch::new(config.research.max_findings)),
            planner: Arc::new(TemplateRoadmapPlanner::new(config.default_pass_threshold)),
            content: Arc::new(TemplateContentService),
            evaluator: Arc::new(TemplateEvaluator),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// ============================================================================
// SessionRunner
// ============================================================================

/// Drives sessions through their collaborators.
pub struct SessionRunner {
    collaborators: Collaborators,
    policy: Arc<dyn AdaptationPolicy>,
    store: Arc<dyn SessionStore>,
    events: EventBroadcaster,
    locks: std::sync::Mutex<HashMap<SessionId, Weak<Mutex<()>>>>,
}

impl std::fmt::Debug for SessionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRunner")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl SessionRunner {
    /// Creates a runner from explicit parts.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        policy: Arc<dyn AdaptationPolicy>,
        store: Arc<dyn SessionStore>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            collaborators,
            policy,
            store,
            events,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Creates a runner with template collaborators and the threshold
    /// policy, both tuned by `config`.
    #[must_use]
    pub fn from_config(config: &Config, store: Arc<dyn SessionStore>) -> Self {
        Self::new(
            Collaborators::templates(config),
            Arc::new(ThresholdPolicy::from(&config.adaptation)),
            store,
            EventBroadcaster::new(config.events.capacity),
        )
    }

    /// Replaces the interview collaborator.
    #[must_use]
    pub fn with_interview(mut self, interview: Arc<dyn InterviewService>) -> Self {
        self.collaborators.interview = interview;
        self
    }

    /// Replaces the evaluation collaborator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn EvaluationService>) -> Self {
        self.collaborators.evaluator = evaluator;
        self
    }

    /// Replaces the adaptation policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn AdaptationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// The event broadcaster.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// The session store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Interviews the learner about `topic` and prepares a new session.
    ///
    /// # Errors
    ///
    /// Returns collaborator, protocol or persistence errors.
    pub async fn start(&self, topic: &str) -> Result<SessionState> {
        info!(topic = %topic, "Starting interview");
        let answers = self
            .collaborators
            .interview
            .conduct(topic)
            .await
            .map_err(|e| self.report(None, e))?;
        self.start_with_answers(answers).await
    }

    /// Creates a session from interview answers, then researches and plans it.
    ///
    /// The session is saved as soon as the profile exists. If research or
    /// planning fails, the saved session can be picked up with
    /// [`SessionRunner::prepare`].
    ///
    /// # Errors
    ///
    /// Returns collaborator, protocol or persistence errors.
    pub async fn start_with_answers(&self, answers: InterviewAnswers) -> Result<SessionState> {
        let mut state = SessionState::new();
        state
            .start_session(answers)
            .map_err(|e| self.report(None, e))?;

        let id = state.id;
        let _exclusive = self
            .exclusive(id)
            .await
            .map_err(|e| self.report(Some(id), e))?;

        self.store.save(&state).await.map_err(|e| self.report(Some(id), e))?;
        info!(session_id = %id, "Session started");
        if let Some(profile) = &state.profile {
            self.events
                .send(SessionEvent::session_started(id, profile.clone()));
        }
        self.events.send(SessionEvent::phase_changed(
            id,
            SessionPhase::Profiling,
            state.phase,
        ));

        self.prepare_locked(state).await.map_err(|e| self.report(Some(id), e))
    }

    /// Runs any outstanding research and roadmap planning for a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, collaborator, protocol or persistence errors.
    pub async fn prepare(&self, id: &SessionId) -> Result<SessionState> {
        let _exclusive = self
            .exclusive(*id)
            .await
            .map_err(|e| self.report(Some(*id), e))?;

        let result = match self.load_required(id).await {
            Ok(state) => self.prepare_locked(state).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.report(Some(*id), e))
    }

    async fn prepare_locked(&self, mut state: SessionState) -> Result<SessionState> {
        if state.phase == SessionPhase::Researching {
            let profile = state
                .profile
                .clone()
                .ok_or_else(|| TutorError::state_mismatch("research", state.phase))?;
            let findings = self.collaborators.research.research(&profile).await?;
            debug!(session_id = %state.id, findings = findings.findings.len(), "Research complete");

            let mut next = state.clone();
            next.complete_research(findings)?;
            self.commit(&state, &next).await?;
            state = next;
        }

        if state.phase == SessionPhase::RoadmapBuilding {
            let (Some(profile), Some(findings)) = (&state.profile, &state.research) else {
                return Err(TutorError::state_mismatch("plan the roadmap", state.phase));
            };
            let stages = self.collaborators.planner.plan(profile, findings).await?;
            debug!(session_id = %state.id, stages = stages.len(), "Roadmap planned");

            let mut next = state.clone();
            next.build_roadmap(stages)?;
            self.commit(&state, &next).await?;
            state = next;
        }

        Ok(state)
    }

    /// Presents the next checkpoint of the current stage.
    ///
    /// Presenting again while a checkpoint already awaits evaluation returns
    /// that checkpoint without changing the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `NotInProgress`, `StateMismatch` (no
    /// checkpoint left or an adaptation pending), collaborator or
    /// persistence errors.
    pub async fn present_next(&self, id: &SessionId) -> Result<PresentedCheckpoint> {
        let _exclusive = self
            .exclusive(*id)
            .await
            .map_err(|e| self.report(Some(*id), e))?;

        self.present_locked(id)
            .await
            .map_err(|e| self.report(Some(*id), e))
    }

    async fn present_locked(&self, id: &SessionId) -> Result<PresentedCheckpoint> {
        let state = self.load_required(id).await?;
        let position = state
            .current_checkpoint()?
            .ok_or_else(|| TutorError::state_mismatch("present a checkpoint", state.phase))?;

        let mut next = state.clone();
        let already_presented = matches!(state.phase, SessionPhase::AwaitingEvaluation { .. });
        if !already_presented {
            next.present_checkpoint(position.stage, position.checkpoint)?;
        }

        let (Some(stage), Some(checkpoint), Some(profile)) = (
            next.stages.get(position.stage),
            next.checkpoint(position),
            next.profile.as_ref(),
        ) else {
            return Err(TutorError::state_mismatch("present a checkpoint", state.phase));
        };

        let mut content = Vec::with_capacity(stage.content_refs.len());
        for reference in &stage.content_refs {
            content.push(self.collaborators.content.resolve(reference, profile).await?);
        }

        let presented = PresentedCheckpoint {
            session_id: *id,
            stage: position.stage,
            checkpoint: position.checkpoint,
            stage_title: stage.title.clone(),
            kind: checkpoint.kind,
            threshold: checkpoint.threshold,
            content,
        };

        if !already_presented {
            self.commit(&state, &next).await?;
            self.events.send(SessionEvent::checkpoint_presented(
                *id,
                presented.stage,
                presented.checkpoint,
                presented.kind,
            ));
        }
        info!(
            session_id = %id,
            stage = presented.stage,
            checkpoint = presented.checkpoint,
            "Checkpoint presented"
        );
        Ok(presented)
    }

    /// Evaluates a submission for the presented checkpoint and adapts.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `StateMismatch` (nothing presented),
    /// `InvalidScore`, collaborator or persistence errors.
    pub async fn submit(
        &self,
        id: &SessionId,
        submission: &Submission,
        update: Option<&ProfileUpdate>,
    ) -> Result<SubmissionOutcome> {
        let _exclusive = self
            .exclusive(*id)
            .await
            .map_err(|e| self.report(Some(*id), e))?;

        self.submit_locked(id, submission, update)
            .await
            .map_err(|e| self.report(Some(*id), e))
    }

    async fn submit_locked(
        &self,
        id: &SessionId,
        submission: &Submission,
        update: Option<&ProfileUpdate>,
    ) -> Result<SubmissionOutcome> {
        let state = self.load_required(id).await?;
        let SessionPhase::AwaitingEvaluation { stage, checkpoint } = state.phase else {
            return Err(TutorError::state_mismatch("submit an answer", state.phase));
        };
        let target = state
            .checkpoint(CheckpointPosition { stage, checkpoint })
            .ok_or_else(|| TutorError::state_mismatch("submit an answer", state.phase))?;

        let evaluation = self
            .collaborators
            .evaluator
            .evaluate(target, submission)
            .await?;

        let mut next = state.clone();
        let result = next
            .record_evaluation_with_feedback(stage, checkpoint, evaluation.score, evaluation.feedback)?
            .clone();
        if let Some(update) = update {
            next.update_profile(update)?;
        }

        let decision = self.policy.decide(&AdaptationContext::from_session(&next)?);
        let decision_name = decision.name().to_string();
        next.apply_adaptation(decision)?;

        self.commit(&state, &next).await?;

        info!(
            session_id = %id,
            stage,
            checkpoint,
            score = result.score,
            decision = %decision_name,
            "Evaluation recorded"
        );
        self.events.send(SessionEvent::evaluation_recorded(
            *id,
            stage,
            checkpoint,
            result.score,
            result.passed,
        ));
        self.events.send(SessionEvent::roadmap_adapted(
            *id,
            decision_name.clone(),
            next.stages.len(),
        ));

        Ok(SubmissionOutcome {
            result,
            decision: decision_name,
            session: next,
        })
    }

    /// Finishes a current stage that has no checkpoints.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `StateMismatch` or persistence errors.
    pub async fn finish_stage(&self, id: &SessionId) -> Result<SessionState> {
        let _exclusive = self
            .exclusive(*id)
            .await
            .map_err(|e| self.report(Some(*id), e))?;

        self.finish_locked(id)
            .await
            .map_err(|e| self.report(Some(*id), e))
    }

    async fn finish_locked(&self, id: &SessionId) -> Result<SessionState> {
        let state = self.load_required(id).await?;
        let mut next = state.clone();
        next.complete_stage()?;
        self.commit(&state, &next).await?;
        Ok(next)
    }

    /// Loads a stored session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if no such session is stored.
    pub async fn load(&self, id: &SessionId) -> Result<SessionState> {
        self.load_required(id).await
    }

    /// Loads every stored session.
    ///
    /// # Errors
    ///
    /// Returns persistence errors.
    pub async fn list(&self) -> Result<Vec<SessionState>> {
        let mut sessions = Vec::new();
        for id in self.store.list().await? {
            if let Some(state) = self.store.load(&id).await? {
                sessions.push(state);
            }
        }
        Ok(sessions)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Serialises operations on `id` within this process, then takes the
    /// store's cross-process lock.
    async fn exclusive(&self, id: SessionId) -> Result<Exclusive> {
        let guard = self.session_mutex(id).lock_owned().await;
        let file = self.store.acquire_lock(&id)?;
        Ok(Exclusive {
            _file: file,
            _guard: guard,
        })
    }

    /// The in-process mutex for `id`. Entries whose mutex nobody holds are
    /// dropped from the registry.
    fn session_mutex(&self, id: SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, weak| weak.strong_count() > 0);

        if let Some(mutex) = locks.get(&id).and_then(Weak::upgrade) {
            return mutex;
        }
        let mutex = Arc::new(Mutex::new(()));
        locks.insert(id, Arc::downgrade(&mutex));
        mutex
    }

    #[cfg(test)]
    fn registered_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    async fn load_required(&self, id: &SessionId) -> Result<SessionState> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| TutorError::session_not_found(id))
    }

    /// Saves `next` and announces what changed since `prev`.
    async fn commit(&self, prev: &SessionState, next: &SessionState) -> Result<()> {
        self.store.save(next).await?;

        if prev.phase != next.phase {
            debug!(session_id = %next.id, from = %prev.phase, to = %next.phase, "Phase changed");
            self.events
                .send(SessionEvent::phase_changed(next.id, prev.phase, next.phase));
        }
        if next.is_completed() && !prev.is_completed() {
            info!(session_id = %next.id, stages = next.stages.len(), "Session completed");
            self.events.send(SessionEvent::session_completed(
                next.id,
                next.stages.len(),
                average_score(next),
            ));
        }
        Ok(())
    }

    /// Logs and broadcasts a failed operation, handing the error back.
    fn report(&self, id: Option<SessionId>, error: TutorError) -> TutorError {
        if error.is_protocol_violation() {
            debug!(session_id = ?id, error = %error, "Operation rejected");
        } else {
            warn!(session_id = ?id, error = %error, "Operation failed");
        }
        self.events.send(SessionEvent::error(id, error.to_string()));
        error
    }
}

/// Held for the duration of one operation. The file lock is released
/// before the in-process mutex.
struct Exclusive {
    _file: Option<SessionLock>,
    _guard: OwnedMutexGuard<()>,
}

/// Mean of every recorded score in the session.
#[must_use]
pub fn average_score(state: &SessionState) -> Option<f64> {
    let scores: Vec<f64> = state
        .stages
        .iter()
        .flat_map(|s| &s.checkpoints)
        .filter_map(|c| c.score())
        .map(f64::from)
        .collect();

    if scores.is_empty() {
        None
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = scores.len() as f64;
        Some(scores.iter().sum::<f64>() / count)
    }
}
