//! Error types for tutoring sessions.
//!
//! This module defines the error hierarchy for every session operation:
//! protocol violations raised by the state machine, configuration loading,
//! collaborator failures and session persistence.

use std::path::PathBuf;

/// A specialized `Result` type for tutoring session operations.
pub type Result<T> = std::result::Result<T, TutorError>;

/// Errors that can occur while driving a tutoring session.
///
/// Protocol variants are caller-input or sequencing violations. They never
/// leave the session partially mutated and are never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Mandatory interview fields were missing when the session started.
    #[error("Incomplete learner profile: missing {}\n\nSuggestion: Ask the learner for their {} before starting the session", .missing.join(", "), .missing.join(" and "))]
    IncompleteProfile {
        /// Names of the missing interview fields.
        missing: Vec<String>,
    },

    /// A roadmap (or roadmap replacement) violates the roadmap rules.
    #[error("Invalid roadmap: {reason}\n\nSuggestion: Every stage except the last must declare at least one checkpoint")]
    InvalidRoadmap {
        /// Why the roadmap was rejected.
        reason: String,
    },

    /// The operation is not valid in the session's current phase.
    #[error("State mismatch: cannot {operation} while {phase}")]
    StateMismatch {
        /// The attempted operation.
        operation: String,
        /// The phase the session is in.
        phase: String,
    },

    /// The checkpoint already carries an evaluation result.
    #[error("Checkpoint {checkpoint} of stage {stage} has already been evaluated (score {score})")]
    AlreadyEvaluated {
        /// Stage index.
        stage: usize,
        /// Checkpoint index within the stage.
        checkpoint: usize,
        /// The score that was recorded first.
        score: u8,
    },

    /// The session has no current stage (completed or not yet planned).
    #[error("Session is not in progress ({phase})")]
    NotInProgress {
        /// The phase the session is in.
        phase: String,
    },

    /// An evaluation score fell outside `0..=100`.
    #[error("Invalid score {score}: scores must be between 0 and 100")]
    InvalidScore {
        /// The rejected score.
        score: u32,
    },

    /// Research produced no usable findings.
    #[error("Research returned no findings\n\nSuggestion: Retry research or broaden the learner's goal")]
    EmptyResearch,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your tutor.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// An external collaborator failed to produce a result.
    #[error("{service} service failed: {message}\n\nSuggestion: Retry the operation; the session state was not changed")]
    Collaborator {
        /// Which collaborator failed (e.g. "research", "evaluation").
        service: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// No stored session has the given identifier.
    #[error("Session not found: '{id}'\n\nSuggestion: Run 'tutor status' with an existing session id")]
    SessionNotFound {
        /// The unknown session id.
        id: String,
    },

    /// Another process holds the session's lock file.
    #[error("Session '{id}' is already being driven (lock file '{lock_file}')\n\nSuggestion: Wait for the other process to finish or remove the lock file if it's stale")]
    SessionLocked {
        /// The locked session id.
        id: String,
        /// Path to the lock file.
        lock_file: PathBuf,
    },

    /// Session file contains malformed JSON or an unknown version.
    #[error("Corrupted session file '{path}': {message}\n\nSuggestion: Remove the session file to start fresh, or restore from backup")]
    StateFileCorrupted {
        /// Path to the corrupted session file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TutorError {
    /// Creates a new `IncompleteProfile` error.
    #[must_use]
    pub fn incomplete_profile<S: Into<String>>(missing: impl IntoIterator<Item = S>) -> Self {
        Self::IncompleteProfile {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a new `InvalidRoadmap` error.
    #[must_use]
    pub fn invalid_roadmap(reason: impl Into<String>) -> Self {
        Self::InvalidRoadmap {
            reason: reason.into(),
        }
    }

    /// Creates a new `StateMismatch` error.
    #[must_use]
    pub fn state_mismatch(operation: impl Into<String>, phase: impl std::fmt::Display) -> Self {
        Self::StateMismatch {
            operation: operation.into(),
            phase: phase.to_string(),
        }
    }

    /// Creates a new `NotInProgress` error.
    #[must_use]
    pub fn not_in_progress(phase: impl std::fmt::Display) -> Self {
        Self::NotInProgress {
            phase: phase.to_string(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Collaborator` error.
    #[must_use]
    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        Self::SessionNotFound { id: id.to_string() }
    }

    /// Creates a new `SessionLocked` error.
    #[must_use]
    pub fn session_locked(id: impl std::fmt::Display, lock_file: impl Into<PathBuf>) -> Self {
        Self::SessionLocked {
            id: id.to_string(),
            lock_file: lock_file.into(),
        }
    }

    /// Creates a new `StateFileCorrupted` error.
    #[must_use]
    pub fn state_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StateFileCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the caller violated the session protocol.
    ///
    /// These errors map to a corrective prompt for the learner rather than
    /// ending the session.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::IncompleteProfile { .. }
                | Self::InvalidRoadmap { .. }
                | Self::StateMismatch { .. }
                | Self::AlreadyEvaluated { .. }
                | Self::NotInProgress { .. }
                | Self::InvalidScore { .. }
                | Self::EmptyResearch
        )
    }

    /// Returns `true` if this error is transient and the caller may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Collaborator { .. } | Self::SessionLocked { .. })
    }

    /// Returns `true` if this error is fatal and requires immediate termination.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. }
        )
    }
}
