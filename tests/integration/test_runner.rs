//! Integration tests for `SessionRunner` with file-backed persistence.
//!
//! These tests drive complete sessions through the offline template
//! collaborators and feed the finished sessions into the report generator.

use std::sync::Arc;

use async_trait::async_trait;
use tutor_report::{
    json::JsonGenerator, AdaptationInput, CheckpointInput, LearnerInput, MarkdownGenerator,
    ReportGenerator, ReportInput, ReportStatus, ResultInput, StageInput,
};
use tutor_session::{
    average_score, Collaborators, Config, EventBroadcaster, ExperienceLevel, FileSessionStore,
    InterviewAnswers, LearnerProfile, ResearchFindings, ResearchService, ScriptedEvaluator,
    ScriptedInterview, SessionEvent, SessionId, SessionPhase, SessionRunner, SessionState,
    SessionStore, Submission, ThresholdPolicy, TutorError,
};

fn answers() -> InterviewAnswers {
    InterviewAnswers {
        topic: Some("Rust".to_string()),
        experience_level: Some(ExperienceLevel::Beginner),
        goal: Some("Build a command-line tool".to_string()),
        modality: None,
    }
}

fn file_runner(dir: &std::path::Path) -> SessionRunner {
    SessionRunner::from_config(&Config::default(), Arc::new(FileSessionStore::new(dir)))
        .with_interview(Arc::new(ScriptedInterview::new(answers())))
}

/// Presents and answers checkpoints until the session completes.
async fn run_to_completion(runner: &SessionRunner, id: &SessionId) -> Vec<String> {
    let mut decisions = Vec::new();
    for _ in 0..100 {
        let state = runner.load(id).await.expect("load");
        if state.is_completed() {
            return decisions;
        }
        if state.current_checkpoint().expect("in progress").is_some() {
            runner.present_next(id).await.expect("present");
            let outcome = runner
                .submit(id, &Submission::text("my answer"), None)
                .await
                .expect("submit");
            decisions.push(outcome.decision);
        } else {
            runner.finish_stage(id).await.expect("finish stage");
        }
    }
    panic!("session {id} did not complete");
}

fn report_input(state: &SessionState) -> ReportInput {
    let learner = state
        .profile
        .as_ref()
        .map_or_else(LearnerInput::default, |p| LearnerInput {
            topic: p.subject().to_string(),
            experience_level: p.experience_level.to_string(),
            goal: p.goal.clone(),
            modality: p.modality.to_string(),
        });

    ReportInput {
        session_id: state.id.to_string(),
        learner,
        status: if state.is_completed() {
            ReportStatus::Completed
        } else {
            ReportStatus::InProgress
        },
        current_stage: state.current_stage,
        started_at: state.created_at,
        ended_at: state.updated_at,
        stages: state
            .stages
            .iter()
            .map(|stage| StageInput {
                title: stage.title.clone(),
                checkpoints: stage
                    .checkpoints
                    .iter()
                    .map(|c| CheckpointInput {
                        kind: c.kind.to_string(),
                        threshold: c.threshold,
                        result: c.result.as_ref().map(|r| ResultInput {
                            score: r.score,
                            passed: r.passed,
                            feedback: r.feedback.clone(),
                            recorded_at: r.recorded_at,
                        }),
                    })
                    .collect(),
            })
            .collect(),
        adaptations: state
            .adaptations
            .iter()
            .map(|a| AdaptationInput {
                timestamp: a.timestamp,
                stage: a.trigger.stage,
                checkpoint: a.trigger.checkpoint,
                score: a.trigger.score,
                decision: a.decision.name().to_string(),
                profile_changed: a.prior_profile.is_some(),
            })
            .collect(),
        guidance: None,
    }
}

// ============================================================================
// Full runs
// ============================================================================

#[tokio::test]
async fn test_offline_session_runs_to_completion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = file_runner(dir.path());
    let mut events = runner.events().subscribe();

    let state = runner.start("Rust").await.expect("start");
    assert_eq!(state.phase, SessionPhase::InStage { stage: 0 });
    assert_eq!(state.stages.len(), 3);

    let decisions = run_to_completion(&runner, &state.id).await;
    assert_eq!(
        decisions,
        [
            "keep_roadmap",
            "advance_stage",
            "keep_roadmap",
            "advance_stage",
            "keep_roadmap",
            "advance_stage",
        ]
    );

    let finished = runner.load(&state.id).await.expect("load");
    assert!(finished.is_completed());
    assert_eq!(finished.current_stage, 3);
    let average = average_score(&finished).expect("scores recorded");
    assert!((average - 475.0 / 6.0).abs() < 1e-9);

    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::SessionCompleted(payload) = event {
            assert_eq!(payload.stages, 3);
            completed += 1;
        }
    }
    assert_eq!(completed, 1);

    // The state file on disk matches what the runner reports
    let reloaded = FileSessionStore::new(dir.path())
        .load(&state.id)
        .await
        .expect("load")
        .expect("stored");
    assert_eq!(reloaded, finished);
}

#[tokio::test]
async fn test_low_score_adds_review_stage_and_report_reflects_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = file_runner(dir.path()).with_evaluator(Arc::new(ScriptedEvaluator::new(
        std::iter::once(40).chain(std::iter::repeat(80).take(7)),
    )));

    let state = runner.start("Rust").await.expect("start");
    let decisions = run_to_completion(&runner, &state.id).await;
    assert_eq!(decisions[0], "replace_remaining_stages");
    assert_eq!(decisions.len(), 8);

    let finished = runner.load(&state.id).await.expect("load");
    assert_eq!(finished.stages.len(), 4);
    assert!(finished.stages[1].title.starts_with("Review: "));
    assert_eq!(finished.remediation_count(), 1);
    assert_eq!(finished.snapshots.len(), 1);

    let report = ReportGenerator::new(report_input(&finished)).generate();
    assert_eq!(report.summary.status, ReportStatus::Completed);
    assert_eq!(report.summary.stages_completed, 4);
    assert_eq!(report.summary.checkpoints_evaluated, 8);
    assert_eq!(report.summary.checkpoints_passed, 7);
    assert_eq!(report.summary.remediations, 1);
    assert_eq!(report.failed_checkpoints().count(), 1);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.category == "review" && r.description.contains("40/100")));

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("| Review Stages | 1 |"));
    assert!(markdown.contains("replace\\_remaining\\_stages"));

    let path = dir.path().join("tutor-report.json");
    JsonGenerator::new(&report)
        .write_to_file(&path, true)
        .expect("write json");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("parse");
    assert_eq!(json["summary"]["remediations"], 1);
}

// ============================================================================
// Resumption
// ============================================================================

struct OfflineResearch;

#[async_trait]
impl ResearchService for OfflineResearch {
    async fn research(&self, _profile: &LearnerProfile) -> tutor_session::Result<ResearchFindings> {
        Err(TutorError::collaborator("research", "network unreachable"))
    }
}

#[tokio::test]
async fn test_session_resumes_with_new_runner_after_research_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::default();

    let failing = SessionRunner::new(
        Collaborators {
            research: Arc::new(OfflineResearch),
            ..Collaborators::templates(&config)
        },
        Arc::new(ThresholdPolicy::from(&config.adaptation)),
        Arc::new(FileSessionStore::new(dir.path())),
        EventBroadcaster::new(config.events.capacity),
    );
    let err = failing
        .start_with_answers(answers())
        .await
        .expect_err("research fails");
    assert!(matches!(err, TutorError::Collaborator { .. }));

    let stored = failing.list().await.expect("list");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].phase, SessionPhase::Researching);
    let id = stored[0].id;
    drop(failing);

    // A fresh runner, as after a process restart
    let runner = file_runner(dir.path());
    let prepared = runner.prepare(&id).await.expect("prepare");
    assert_eq!(prepared.phase, SessionPhase::InStage { stage: 0 });
    assert!(prepared.research.is_some());

    run_to_completion(&runner, &id).await;
    assert!(runner.load(&id).await.expect("load").is_completed());
}

#[tokio::test]
async fn test_presented_checkpoint_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = file_runner(dir.path());
    let state = first.start("Rust").await.expect("start");
    let presented = first.present_next(&state.id).await.expect("present");
    drop(first);

    let second = file_runner(dir.path());
    let again = second.present_next(&state.id).await.expect("present again");
    assert_eq!(
        (again.stage, again.checkpoint),
        (presented.stage, presented.checkpoint)
    );

    let outcome = second
        .submit(&state.id, &Submission::text("answer"), None)
        .await
        .expect("submit");
    assert_eq!(outcome.result.score, 75);
}
