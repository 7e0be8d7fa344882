//! Session events and WebSocket streaming.
//!
//! Every state change driven by the runner is broadcast as a
//! [`SessionEvent`] to all connected WebSocket clients. Events are
//! serialized as `{"event": "<name>", "payload": {...}}`.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, lists known sessions
//! - `session_started` - A learner profile was captured
//! - `phase_changed` - A session moved to a new phase
//! - `checkpoint_presented` - A checkpoint is waiting for a submission
//! - `evaluation_recorded` - A checkpoint result was recorded
//! - `roadmap_adapted` - An adaptation decision was applied
//! - `session_completed` - The last stage was finished
//! - `error` - An operation failed
//!
//! # Example
//!
//! ```no_run
//! use tutor_session::events::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::error(None, "research service offline"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::profile::LearnerProfile;
use crate::roadmap::CheckpointKind;
use crate::session::{SessionId, SessionPhase};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Identifiers of every stored session.
    pub sessions: Vec<SessionId>,
}

/// Payload for the `session_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartedPayload {
    /// The new session.
    pub session_id: SessionId,
    /// The captured profile.
    pub profile: LearnerProfile,
}

/// Payload for the `phase_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseChangedPayload {
    /// The session that changed.
    pub session_id: SessionId,
    /// Phase before the change.
    pub from: SessionPhase,
    /// Phase after the change.
    pub to: SessionPhase,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `checkpoint_presented` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPresentedPayload {
    /// The session.
    pub session_id: SessionId,
    /// Stage index.
    pub stage: usize,
    /// Checkpoint index within the stage.
    pub checkpoint: usize,
    /// Assessment form.
    pub kind: CheckpointKind,
}

/// Payload for the `evaluation_recorded` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecordedPayload {
    /// The session.
    pub session_id: SessionId,
    /// Stage index.
    pub stage: usize,
    /// Checkpoint index within the stage.
    pub checkpoint: usize,
    /// Recorded score.
    pub score: u8,
    /// Whether the threshold was met.
    pub passed: bool,
}

/// Payload for the `roadmap_adapted` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapAdaptedPayload {
    /// The session.
    pub session_id: SessionId,
    /// Name of the applied decision.
    pub decision: String,
    /// Number of stages after the adaptation.
    pub stage_count: usize,
}

/// Payload for the `session_completed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCompletedPayload {
    /// The session.
    pub session_id: SessionId,
    /// Number of stages completed.
    pub stages: usize,
    /// Mean of all recorded scores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// The session the error relates to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events emitted while sessions progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// A session captured its learner profile.
    SessionStarted(SessionStartedPayload),
    /// A session changed phase.
    PhaseChanged(PhaseChangedPayload),
    /// A checkpoint was presented.
    CheckpointPresented(CheckpointPresentedPayload),
    /// A checkpoint result was recorded.
    EvaluationRecorded(EvaluationRecordedPayload),
    /// An adaptation was applied.
    RoadmapAdapted(RoadmapAdaptedPayload),
    /// A session finished its last stage.
    SessionCompleted(SessionCompletedPayload),
    /// An operation failed.
    Error(ErrorPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(sessions: Vec<SessionId>) -> Self {
        Self::Connected(ConnectedPayload { sessions })
    }

    /// Creates a `SessionStarted` event.
    #[must_use]
    pub const fn session_started(session_id: SessionId, profile: LearnerProfile) -> Self {
        Self::SessionStarted(SessionStartedPayload {
            session_id,
            profile,
        })
    }

    /// Creates a `PhaseChanged` event stamped with the current time.
    #[must_use]
    pub fn phase_changed(session_id: SessionId, from: SessionPhase, to: SessionPhase) -> Self {
        Self::PhaseChanged(PhaseChangedPayload {
            session_id,
            from,
            to,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `CheckpointPresented` event.
    #[must_use]
    pub const fn checkpoint_presented(
        session_id: SessionId,
        stage: usize,
        checkpoint: usize,
        kind: CheckpointKind,
    ) -> Self {
        Self::CheckpointPresented(CheckpointPresentedPayload {
            session_id,
            stage,
            checkpoint,
            kind,
        })
    }

    /// Creates an `EvaluationRecorded` event.
    #[must_use]
    pub const fn evaluation_recorded(
        session_id: SessionId,
        stage: usize,
        checkpoint: usize,
        score: u8,
        passed: bool,
    ) -> Self {
        Self::EvaluationRecorded(EvaluationRecordedPayload {
            session_id,
            stage,
            checkpoint,
            score,
            passed,
        })
    }

    /// Creates a `RoadmapAdapted` event.
    #[must_use]
    pub fn roadmap_adapted(
        session_id: SessionId,
        decision: impl Into<String>,
        stage_count: usize,
    ) -> Self {
        Self::RoadmapAdapted(RoadmapAdaptedPayload {
            session_id,
            decision: decision.into(),
            stage_count,
        })
    }

    /// Creates a `SessionCompleted` event.
    #[must_use]
    pub const fn session_completed(
        session_id: SessionId,
        stages: usize,
        average_score: Option<f64>,
    ) -> Self {
        Self::SessionCompleted(SessionCompletedPayload {
            session_id,
            stages,
            average_score,
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            session_id,
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::SessionStarted(_) => "session_started",
            Self::PhaseChanged(_) => "phase_changed",
            Self::CheckpointPresented(_) => "checkpoint_presented",
            Self::EvaluationRecorded(_) => "evaluation_recorded",
            Self::RoadmapAdapted(_) => "roadmap_adapted",
            Self::SessionCompleted(_) => "session_completed",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster whose subscribers each buffer `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// the overwritten events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning how many subscribers will receive it.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives one WebSocket connection.
///
/// - Sends a `connected` event listing stored sessions
/// - Forwards every broadcast event to the client
/// - Pings every 30 seconds and closes after 3 missed pongs
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the session list so nothing is missed in between
    let mut event_receiver = state.runner.events().subscribe();

    let sessions = match state.runner.store().list().await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Failed to list sessions for new client");
            Vec::new()
        }
    };

    let connected_json = match serde_json::to_string(&SessionEvent::connected(sessions)) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(session_event) => {
                        let json = match serde_json::to_string(&session_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
