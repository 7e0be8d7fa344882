//! Integration tests for the HTTP API and WebSocket event stream.
//!
//! These tests run a real server on a local port, drive sessions over HTTP
//! with `reqwest`, and watch the resulting events over WebSocket.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;
use tutor_session::{
    create_router, AppState, Config, ErrorResponse, ExperienceLevel, InterviewAnswers,
    MemorySessionStore, SessionEvent, SessionPhase, SessionState, SessionSummary,
};

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Addresses of a running test server.
struct TestServer {
    http: String,
    ws: String,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawns the test server on a free port.
async fn spawn_test_server(state: AppState) -> TestServer {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        http: format!("http://{addr}/api"),
        ws: format!("ws://{addr}/ws"),
        _handle: handle,
    }
}

fn default_state() -> AppState {
    AppState::new(Config::default(), Arc::new(MemorySessionStore::new()))
}

/// Connects a WebSocket client to the given URL.
async fn connect_client(url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message from the WebSocket and parses it as a
/// `SessionEvent`. Answers ping frames with pong.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Connects and consumes the initial `connected` event.
async fn connect_and_skip_greeting(url: &str) -> WsClient {
    let mut client = connect_client(url).await;
    let event = receive_event(&mut client).await;
    assert!(
        matches!(event, SessionEvent::Connected(_)),
        "Expected Connected event, got: {event:?}"
    );
    client
}

fn answers_body() -> Value {
    json!({
        "topic": "Rust",
        "experienceLevel": "intermediate",
        "goal": "Write a web service"
    })
}

async fn create_session(http: &reqwest::Client, server: &TestServer) -> SessionState {
    let response = http
        .post(format!("{}/sessions", server.http))
        .json(&answers_body())
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.expect("session body")
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_connected_event_lists_stored_sessions() {
    let state = default_state();
    let existing = state
        .runner
        .start_with_answers(InterviewAnswers {
            topic: Some("Go".to_string()),
            experience_level: Some(ExperienceLevel::Advanced),
            goal: Some("Learn generics".to_string()),
            modality: None,
        })
        .await
        .expect("start");
    let server = spawn_test_server(state).await;

    let mut client = connect_client(&server.ws).await;
    let event = receive_event(&mut client).await;

    if let SessionEvent::Connected(payload) = event {
        assert_eq!(payload.sessions, vec![existing.id]);
    } else {
        panic!("Expected Connected event, got: {event:?}");
    }
}

// ============================================================================
// Session Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_create_session_streams_start_events() {
    let server = spawn_test_server(default_state()).await;
    let mut client = connect_and_skip_greeting(&server.ws).await;

    let session = create_session(&reqwest::Client::new(), &server).await;
    assert_eq!(session.phase, SessionPhase::InStage { stage: 0 });

    match receive_event(&mut client).await {
        SessionEvent::SessionStarted(payload) => {
            assert_eq!(payload.session_id, session.id);
            assert_eq!(payload.profile.goal, "Write a web service");
        }
        other => panic!("Expected SessionStarted, got: {other:?}"),
    }

    let mut transitions = Vec::new();
    for _ in 0..3 {
        match receive_event(&mut client).await {
            SessionEvent::PhaseChanged(payload) => {
                assert_eq!(payload.session_id, session.id);
                transitions.push((payload.from, payload.to));
            }
            other => panic!("Expected PhaseChanged, got: {other:?}"),
        }
    }
    assert_eq!(
        transitions,
        [
            (SessionPhase::Profiling, SessionPhase::Researching),
            (SessionPhase::Researching, SessionPhase::RoadmapBuilding),
            (SessionPhase::RoadmapBuilding, SessionPhase::InStage { stage: 0 }),
        ]
    );
}

#[tokio::test]
async fn test_present_and_submit_over_http() {
    let server = spawn_test_server(default_state()).await;
    let http = reqwest::Client::new();
    let session = create_session(&http, &server).await;
    let mut client = connect_and_skip_greeting(&server.ws).await;

    let presented: Value = http
        .post(format!("{}/sessions/{}/present", server.http, session.id))
        .send()
        .await
        .expect("present")
        .json()
        .await
        .expect("presented body");
    assert_eq!(presented["stage"], 0);
    assert_eq!(presented["checkpoint"], 0);
    assert_eq!(presented["stage_title"], "Foundation");
    assert!(!presented["content"].as_array().expect("content").is_empty());

    let response = http
        .post(format!("{}/sessions/{}/submissions", server.http, session.id))
        .json(&json!({ "submission": { "kind": "text", "body": "Ownership moves values" } }))
        .send()
        .await
        .expect("submit");
    assert_eq!(response.status().as_u16(), 200);
    let outcome: Value = response.json().await.expect("outcome body");
    assert_eq!(outcome["result"]["score"], 75);
    assert_eq!(outcome["decision"], "keep_roadmap");

    let mut names = Vec::new();
    for _ in 0..5 {
        names.push(receive_event(&mut client).await.event_name());
    }
    assert_eq!(
        names,
        [
            "phase_changed",
            "checkpoint_presented",
            "phase_changed",
            "evaluation_recorded",
            "roadmap_adapted",
        ]
    );

    let listed: Vec<SessionSummary> = http
        .get(format!("{}/sessions", server.http))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("list body");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, session.id);
    assert_eq!(listed[0].stage_count, 3);
}

// ============================================================================
// Error Tests
// ============================================================================

#[tokio::test]
async fn test_rejected_submission_returns_conflict_and_error_event() {
    let server = spawn_test_server(default_state()).await;
    let http = reqwest::Client::new();
    let session = create_session(&http, &server).await;
    let mut client = connect_and_skip_greeting(&server.ws).await;

    let response = http
        .post(format!("{}/sessions/{}/submissions", server.http, session.id))
        .json(&json!({ "submission": { "kind": "text", "body": "too early" } }))
        .send()
        .await
        .expect("submit");
    assert_eq!(response.status().as_u16(), 409);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(!body.error.is_empty());

    match receive_event(&mut client).await {
        SessionEvent::Error(payload) => {
            assert_eq!(payload.session_id, Some(session.id));
            assert_eq!(payload.message, body.error);
        }
        other => panic!("Expected Error event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_incomplete_answers_are_unprocessable() {
    let server = spawn_test_server(default_state()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/sessions", server.http))
        .json(&json!({ "topic": "Rust", "experienceLevel": "beginner" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 422);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(body.error.contains("goal"), "unexpected error: {}", body.error);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let server = spawn_test_server(default_state()).await;

    let response = reqwest::Client::new()
        .get(format!(
            "{}/sessions/00000000-0000-4000-8000-000000000000",
            server.http
        ))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 404);
}

// ============================================================================
// Multiple Client Tests
// ============================================================================

#[tokio::test]
async fn test_all_clients_receive_events() {
    let server = spawn_test_server(default_state()).await;
    let mut first = connect_and_skip_greeting(&server.ws).await;
    let mut second = connect_and_skip_greeting(&server.ws).await;

    let session = create_session(&reqwest::Client::new(), &server).await;

    for client in [&mut first, &mut second] {
        match receive_event(client).await {
            SessionEvent::SessionStarted(payload) => assert_eq!(payload.session_id, session.id),
            other => panic!("Expected SessionStarted, got: {other:?}"),
        }
    }
}
