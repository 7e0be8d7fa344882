//! Integration tests for the session state machine and its persistence.
//!
//! These drive sessions through the public API, saving and reloading from
//! disk between steps, and check that the invariants hold across many score
//! sequences.

use tutor_session::{
    AdaptationContext, AdaptationDecision, AdaptationPolicy, CheckpointKind, ExperienceLevel,
    FileSessionStore, InterviewAnswers, ResearchFindings, RoadmapStage, SessionPhase,
    SessionState, SessionStore, ThresholdPolicy, TutorError,
};

fn answers() -> InterviewAnswers {
    InterviewAnswers {
        topic: Some("Linear algebra".to_string()),
        experience_level: Some(ExperienceLevel::Intermediate),
        goal: Some("Understand eigenvectors".to_string()),
        modality: None,
    }
}

fn stage(title: &str, checkpoints: usize) -> RoadmapStage {
    (0..checkpoints).fold(RoadmapStage::new(title), |stage, _| {
        stage.with_checkpoint(CheckpointKind::TextQuiz, 70)
    })
}

fn planned(stages: Vec<RoadmapStage>) -> SessionState {
    let mut state = SessionState::new();
    state.start_session(answers()).expect("start");
    state
        .complete_research(ResearchFindings::new(["Vectors", "Matrices"]))
        .expect("research");
    state.build_roadmap(stages).expect("roadmap");
    state
}

async fn reload(store: &FileSessionStore, state: &SessionState) -> SessionState {
    store.save(state).await.expect("save");
    store
        .load(&state.id)
        .await
        .expect("load")
        .expect("session present")
}

// ============================================================================
// Scenarios
// ============================================================================

/// A low first score replaces the remaining stages, persisted across reloads.
#[tokio::test]
async fn test_replacement_survives_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileSessionStore::new(dir.path());

    let mut state = planned(vec![stage("A", 1), stage("B", 1), stage("C", 1)]);
    state = reload(&store, &state).await;

    state.present_checkpoint(0, 0).expect("present");
    state.record_evaluation(0, 0, 40).expect("record");
    state = reload(&store, &state).await;

    state
        .apply_adaptation(AdaptationDecision::ReplaceRemainingStages {
            stages: vec![stage("New 1", 1), stage("New 2", 1)],
        })
        .expect("replace");
    state = reload(&store, &state).await;

    let titles: Vec<_> = state.stages.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["A", "New 1", "New 2"]);
    assert_eq!(state.current_stage, 1);
    assert_eq!(state.phase, SessionPhase::InStage { stage: 1 });
    assert_eq!(state.stages[0].checkpoints[0].score(), Some(40));

    assert_eq!(state.snapshots.len(), 1);
    assert_eq!(state.snapshots[0].stages.len(), 3);
    assert_eq!(state.adaptations[0].prior_snapshot, Some(0));
}

/// Two single-checkpoint stages run to completion.
#[tokio::test]
async fn test_happy_path_with_reloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileSessionStore::new(dir.path());
    let mut state = planned(vec![stage("A", 1), stage("B", 1)]);

    for index in 0..2 {
        state.present_checkpoint(index, 0).expect("present");
        state = reload(&store, &state).await;
        state.record_evaluation(index, 0, 85).expect("record");
        state
            .apply_adaptation(AdaptationDecision::AdvanceStage)
            .expect("advance");
        state = reload(&store, &state).await;
    }

    assert_eq!(state.phase, SessionPhase::Completed);
    assert_eq!(state.current_stage, 2);
    assert!(matches!(
        state.current_stage(),
        Err(TutorError::NotInProgress { .. })
    ));
    assert_eq!(store.list().await.expect("list"), vec![state.id]);
}

/// Rejected operations never reach the store.
#[tokio::test]
async fn test_rejected_operation_leaves_stored_state_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileSessionStore::new(dir.path());
    let state = reload(&store, &planned(vec![stage("A", 1), stage("B", 1)])).await;

    let mut attempt = state.clone();
    assert!(matches!(
        attempt.present_checkpoint(1, 0),
        Err(TutorError::StateMismatch { .. })
    ));
    assert_eq!(attempt, state);

    let stored = store.load(&state.id).await.expect("load").expect("present");
    assert_eq!(stored, state);
}

// ============================================================================
// Invariants
// ============================================================================

/// Drives a session with `scores` using the default policy, checking the
/// invariants after every step.
fn drive(scores: &[u32]) -> SessionState {
    let policy = ThresholdPolicy::default();
    let mut state = planned(vec![stage("A", 2), stage("B", 1), stage("C", 2)]);

    for &score in scores.iter().cycle().take(64) {
        if state.is_completed() {
            break;
        }
        let position = state
            .current_checkpoint()
            .expect("in progress")
            .expect("checkpoint left");
        state
            .present_checkpoint(position.stage, position.checkpoint)
            .expect("present");
        state
            .record_evaluation(position.stage, position.checkpoint, score)
            .expect("record");

        let recorded = state.stages[position.stage].checkpoints[position.checkpoint].score();
        let decision = policy.decide(&AdaptationContext::from_session(&state).expect("adapting"));
        state.apply_adaptation(decision).expect("apply");

        assert!(state.current_stage <= state.stages.len());
        assert_eq!(
            state.stages[position.stage].checkpoints[position.checkpoint].score(),
            recorded,
            "recorded results never change"
        );
        match state.phase {
            SessionPhase::InStage { stage } => assert_eq!(stage, state.current_stage),
            SessionPhase::Completed => assert_eq!(state.current_stage, state.stages.len()),
            other => panic!("unexpected phase after adaptation: {other}"),
        }
        for stage in &state.stages[..state.current_stage] {
            assert!(stage.is_fully_evaluated(), "stage {} left behind", stage.title);
        }
    }
    state
}

#[test]
fn test_invariants_hold_across_score_sequences() {
    let sequences: [&[u32]; 6] = [
        &[100],
        &[0],
        &[40, 85],
        &[69, 70, 71],
        &[90, 10, 55, 100],
        &[30, 30, 30, 30, 95],
    ];

    for scores in sequences {
        let state = drive(scores);
        assert!(state.is_completed(), "sequence {scores:?} did not finish");
        assert!(state.remediation_count() <= 3);
        assert_eq!(
            state.adaptations.len(),
            state
                .stages
                .iter()
                .map(|s| s.checkpoints.len())
                .sum::<usize>()
        );
    }
}

#[test]
fn test_persistent_low_scores_hit_remediation_cap() {
    let state = drive(&[10]);

    assert_eq!(state.remediation_count(), 3);
    let reviews = state
        .stages
        .iter()
        .filter(|s| s.title.starts_with("Review: "))
        .count();
    assert_eq!(reviews, 3);
    assert!(state
        .stages
        .iter()
        .all(|s| !s.title.starts_with("Review: Review: ")));
}
