//! Tutor CLI
//!
//! Runs offline tutoring sessions, serves the session API and writes
//! progress reports.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tutor_report::{
    json::JsonGenerator, AdaptationInput, CheckpointInput, GuidanceInput, LearnerInput,
    MarkdownGenerator, ReportGenerator, ReportInput, ReportStatus, ResultInput, StageInput,
};
use tutor_session::{
    average_score, create_router, AppState, Checkpoint, Config, Evaluation, EvaluationService,
    ExperienceLevel, FileSessionStore, InterviewAnswers, Modality, ScriptedEvaluator,
    ScriptedInterview, SessionId, SessionPhase, SessionRunner, SessionState, SessionStore,
    Submission, TemplateEvaluator, ThresholdPolicy,
};

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Adaptive tutoring engine
///
/// Profiles a learner, plans a staged roadmap, evaluates checkpoints and
/// adapts the roadmap to each result.
#[derive(Parser, Debug)]
#[command(name = "tutor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: tutor.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding session state files
    #[arg(long, value_name = "DIR", global = true)]
    state_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a complete session offline with template collaborators
    Run {
        /// Subject to learn
        #[arg(long)]
        topic: String,

        /// Experience level (beginner, intermediate, advanced, expert)
        #[arg(long)]
        level: String,

        /// Learning goal
        #[arg(long)]
        goal: String,

        /// Preferred modality (text, visual, auditory, mixed)
        #[arg(long)]
        modality: Option<String>,

        /// Scores to hand out in order before falling back to template scoring
        #[arg(long, value_delimiter = ',')]
        scores: Vec<u32>,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<String>,
    },

    /// Serve the HTTP API and WebSocket event stream
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Show where a stored session stands
    Status {
        /// Session id
        id: String,

        /// Print the full session state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write reports for a stored session
    Report {
        /// Session id
        id: String,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?cli.config, state_dir = ?cli.state_dir, "Starting tutor");

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    match cli.command {
        Command::Run {
            topic,
            level,
            goal,
            modality,
            scores,
            output_dir,
        } => {
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }
            config.validate()?;
            let answers = InterviewAnswers {
                topic: Some(topic),
                experience_level: Some(parse_level(&level)?),
                goal: Some(goal),
                modality: modality.as_deref().map(parse_modality).transpose()?,
            };
            run_session(&config, answers, scores).await
        }
        Command::Serve { port } => {
            config.validate()?;
            serve(config, port).await
        }
        Command::Status { id, json } => {
            config.validate()?;
            let state = load_session(&config, &id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_status(&state);
            }
            Ok(())
        }
        Command::Report { id, output_dir } => {
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }
            config.validate()?;
            let state = load_session(&config, &id).await?;
            generate_reports(&state, &config)
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Drives one session from interview to completion.
async fn run_session(
    config: &Config,
    answers: InterviewAnswers,
    scores: Vec<u32>,
) -> anyhow::Result<()> {
    let topic = answers.topic.clone().unwrap_or_default();
    let store = Arc::new(FileSessionStore::new(&config.state_dir));
    let runner = SessionRunner::from_config(config, store)
        .with_interview(Arc::new(ScriptedInterview::new(answers)))
        .with_evaluator(Arc::new(ScriptedThenTemplate::new(scores)));

    println!("Interviewing learner about {topic}...");
    let mut state = runner.start(&topic).await?;
    let id = state.id;

    println!("Session {id} planned with {} stages", state.stages.len());
    for (index, stage) in state.stages.iter().enumerate() {
        println!("  {}. {}", index + 1, stage.title);
    }
    println!();

    while !state.is_completed() {
        if state.current_checkpoint()?.is_none() {
            state = runner.finish_stage(&id).await?;
            continue;
        }

        let presented = runner.present_next(&id).await?;
        println!(
            "Stage {} ({}): {} - {} lesson(s), pass at {}",
            presented.stage + 1,
            presented.stage_title,
            presented.kind,
            presented.content.len(),
            presented.threshold
        );

        let submission = Submission::text(format!(
            "Response to the {} for {}",
            presented.kind, presented.stage_title
        ));
        let outcome = runner.submit(&id, &submission, None).await?;
        println!(
            "  Scored {}/100 ({}), {}",
            outcome.result.score,
            if outcome.result.passed { "passed" } else { "not passed" },
            outcome.decision.replace('_', " ")
        );
        if outcome.session.stages.len() != state.stages.len() {
            println!(
                "  Roadmap now has {} stages",
                outcome.session.stages.len()
            );
        }
        state = outcome.session;
    }

    println!();
    print_status(&state);
    generate_reports(&state, config)
}

/// Serves the API until Ctrl+C.
async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let store = Arc::new(FileSessionStore::new(&config.state_dir));
    let router = create_router(AppState::new(config, store));

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("Tutor API running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

async fn load_session(config: &Config, raw_id: &str) -> anyhow::Result<SessionState> {
    let id: SessionId = raw_id.parse().map_err(|_| {
        anyhow::anyhow!("Invalid session id: '{raw_id}'\n\nSuggestion: Session ids are UUIDs")
    })?;
    let store = FileSessionStore::new(&config.state_dir);
    store
        .load(&id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{}", tutor_session::TutorError::session_not_found(id)))
}

fn parse_level(raw: &str) -> anyhow::Result<ExperienceLevel> {
    ExperienceLevel::from_str_case_insensitive(raw).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown experience level: '{raw}'\n\nSuggestion: Use beginner, intermediate, advanced or expert"
        )
    })
}

fn parse_modality(raw: &str) -> anyhow::Result<Modality> {
    Modality::from_str_case_insensitive(raw).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown modality: '{raw}'\n\nSuggestion: Use text, visual, auditory or mixed"
        )
    })
}

/// Prints phase, progress and adaptations for a session.
fn print_status(state: &SessionState) {
    println!("=== Session {} ===", state.id);
    if let Some(profile) = &state.profile {
        println!(
            "Learner: {} ({}, prefers {})",
            profile.subject(),
            profile.experience_level,
            profile.modality
        );
        println!("Goal: {}", profile.goal);
    }
    println!("Phase: {}", state.phase);
    println!(
        "Progress: stage {} of {}",
        (state.current_stage + 1).min(state.stages.len()),
        state.stages.len()
    );
    if let Some(avg) = average_score(state) {
        println!("Average score: {avg:.1}");
    }
    println!("Adaptations: {}", state.adaptations.len());
    for event in &state.adaptations {
        println!(
            "  stage {} checkpoint {} scored {} -> {}",
            event.trigger.stage + 1,
            event.trigger.checkpoint + 1,
            event.trigger.score,
            event.decision.name()
        );
    }

    let elapsed = state.elapsed();
    println!(
        "Duration: {}m {}s",
        elapsed.num_minutes(),
        elapsed.num_seconds() % 60
    );
}

/// Writes `tutor-report.md` and `tutor-report.json` to the output directory.
fn generate_reports(state: &SessionState, config: &Config) -> anyhow::Result<()> {
    println!();
    println!("Generating reports...");

    let policy = ThresholdPolicy::from(&config.adaptation);
    let report = ReportGenerator::new(create_report_input(state, &policy)).generate();

    let output_dir = PathBuf::from(&config.output_dir);
    std::fs::create_dir_all(&output_dir)?;

    let md_path = output_dir.join("tutor-report.md");
    std::fs::write(&md_path, MarkdownGenerator::new(&report).generate())?;
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join("tutor-report.json");
    JsonGenerator::new(&report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());

    Ok(())
}

/// Converts session state into the report crate's input.
fn create_report_input(state: &SessionState, policy: &ThresholdPolicy) -> ReportInput {
    let learner = state.profile.as_ref().map_or_else(LearnerInput::default, |p| LearnerInput {
        topic: p.subject().to_string(),
        experience_level: p.experience_level.to_string(),
        goal: p.goal.clone(),
        modality: p.modality.to_string(),
    });

    let guidance = average_score(state).map(|avg| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = avg.round().clamp(0.0, 100.0) as u8;
        let advice = policy.recommendation(score, &learner.topic);
        GuidanceInput {
            next_steps: advice.next_steps,
            focus_areas: advice.focus_areas,
            resources: advice.resources,
        }
    });

    ReportInput {
        session_id: state.id.to_string(),
        status: convert_phase(state.phase),
        current_stage: state.current_stage,
        started_at: state.created_at,
        ended_at: state.updated_at,
        stages: state
            .stages
            .iter()
            .map(|stage| StageInput {
                title: stage.title.clone(),
                checkpoints: stage.checkpoints.iter().map(convert_checkpoint).collect(),
            })
            .collect(),
        adaptations: state
            .adaptations
            .iter()
            .map(|event| AdaptationInput {
                timestamp: event.timestamp,
                stage: event.trigger.stage,
                checkpoint: event.trigger.checkpoint,
                score: event.trigger.score,
                decision: event.decision.name().to_string(),
                profile_changed: event.prior_profile.is_some(),
            })
            .collect(),
        learner,
        guidance,
    }
}

fn convert_checkpoint(checkpoint: &Checkpoint) -> CheckpointInput {
    CheckpointInput {
        kind: checkpoint.kind.to_string(),
        threshold: checkpoint.threshold,
        result: checkpoint.result.as_ref().map(|r| ResultInput {
            score: r.score,
            passed: r.passed,
            feedback: r.feedback.clone(),
            recorded_at: r.recorded_at,
        }),
    }
}

const fn convert_phase(phase: SessionPhase) -> ReportStatus {
    match phase {
        SessionPhase::Profiling => ReportStatus::Profiling,
        SessionPhase::Researching => ReportStatus::Researching,
        SessionPhase::RoadmapBuilding => ReportStatus::RoadmapBuilding,
        SessionPhase::InStage { .. }
        | SessionPhase::AwaitingEvaluation { .. }
        | SessionPhase::Adapting { .. } => ReportStatus::InProgress,
        SessionPhase::Completed => ReportStatus::Completed,
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Hands out scripted scores first, then scores like the template evaluator.
struct ScriptedThenTemplate {
    scripted: ScriptedEvaluator,
}

impl ScriptedThenTemplate {
    fn new(scores: Vec<u32>) -> Self {
        Self {
            scripted: ScriptedEvaluator::new(scores),
        }
    }
}

#[async_trait]
impl EvaluationService for ScriptedThenTemplate {
    async fn evaluate(
        &self,
        checkpoint: &Checkpoint,
        submission: &Submission,
    ) -> tutor_session::Result<Evaluation> {
        if self.scripted.remaining().await > 0 {
            self.scripted.evaluate(checkpoint, submission).await
        } else {
            TemplateEvaluator.evaluate(checkpoint, submission).await
        }
    }
}
