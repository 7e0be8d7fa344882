//! Configuration types for the tutoring engine.
//!
//! Settings live in an optional `tutor.json` file. Every field has a
//! default, so a missing file (or a partial one) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::roadmap::MAX_SCORE;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "tutor.json";

/// Default directory for persisted sessions.
fn default_state_dir() -> String {
    ".tutor/sessions".to_string()
}

/// Default output directory for reports.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Default checkpoint pass threshold.
const fn default_pass_threshold() -> u8 {
    70
}

const fn default_remediation_below() -> u8 {
    70
}

const fn default_accelerate_above() -> u8 {
    90
}

const fn default_max_remediations() -> usize {
    3
}

const fn default_max_findings() -> usize {
    5
}

/// Default capacity of the event broadcast channel.
const fn default_event_capacity() -> usize {
    100
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory where session files are stored.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Output directory for generated reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Pass threshold given to planned checkpoints.
    #[serde(default = "default_pass_threshold")]
    pub default_pass_threshold: u8,

    /// Adaptation policy tuning.
    #[serde(default)]
    pub adaptation: AdaptationConfig,

    /// Research settings.
    #[serde(default)]
    pub research: ResearchConfig,

    /// Event broadcasting settings.
    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            output_dir: default_output_dir(),
            default_pass_threshold: default_pass_threshold(),
            adaptation: AdaptationConfig::default(),
            research: ResearchConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `tutor.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            TutorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `tutor.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigParseError` if the file cannot be read or
    /// contains invalid JSON.
    ///
    /// Returns `TutorError::ConfigValidationError` if a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TutorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TutorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.state_dir.trim().is_empty() {
            return Err(TutorError::config_validation(
                "stateDir must not be empty",
                "Provide a directory for session files in your tutor.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(TutorError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your tutor.json (use '.' for current directory)",
            ));
        }

        if self.default_pass_threshold > MAX_SCORE {
            return Err(TutorError::config_validation(
                format!(
                    "defaultPassThreshold must be at most {MAX_SCORE}, got {}",
                    self.default_pass_threshold
                ),
                "Set defaultPassThreshold to a score between 0 and 100 in your tutor.json",
            ));
        }

        self.adaptation.validate()?;

        if self.research.max_findings == 0 {
            return Err(TutorError::config_validation(
                "research.maxFindings must be greater than 0",
                "Set research.maxFindings to at least 1 in your tutor.json",
            ));
        }

        if self.events.capacity == 0 {
            return Err(TutorError::config_validation(
                "events.capacity must be greater than 0",
                "Set events.capacity to at least 1 in your tutor.json",
            ));
        }

        Ok(())
    }
}

/// Tuning for the score-band adaptation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationConfig {
    /// Scores below this insert a review stage.
    #[serde(default = "default_remediation_below")]
    pub remediation_below: u8,

    /// Scores at or above this count as advanced.
    #[serde(default = "default_accelerate_above")]
    pub accelerate_above: u8,

    /// Maximum number of review stages per session.
    #[serde(default = "default_max_remediations")]
    pub max_remediations: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            remediation_below: default_remediation_below(),
            accelerate_above: default_accelerate_above(),
            max_remediations: default_max_remediations(),
        }
    }
}

impl AdaptationConfig {
    fn validate(&self) -> Result<()> {
        if self.remediation_below > MAX_SCORE || self.accelerate_above > MAX_SCORE {
            return Err(TutorError::config_validation(
                "adaptation thresholds must be at most 100",
                "Set adaptation.remediationBelow and adaptation.accelerateAbove to scores between 0 and 100",
            ));
        }

        if self.remediation_below > self.accelerate_above {
            return Err(TutorError::config_validation(
                format!(
                    "adaptation.remediationBelow ({}) is greater than adaptation.accelerateAbove ({})",
                    self.remediation_below, self.accelerate_above
                ),
                "Keep adaptation.remediationBelow at or below adaptation.accelerateAbove",
            ));
        }

        Ok(())
    }
}

/// Research collaborator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchConfig {
    /// Maximum number of findings kept from a research pass.
    #[serde(default = "default_max_findings")]
    pub max_findings: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_findings: default_max_findings(),
        }
    }
}

/// Event broadcasting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsConfig {
    /// Capacity of the broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, json: &str) -> std::path::PathBuf {
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.state_dir, ".tutor/sessions");
        assert_eq!(config.output_dir, ".");
        assert_eq!(config.default_pass_threshold, 70);
        assert_eq!(config.adaptation.remediation_below, 70);
        assert_eq!(config.adaptation.accelerate_above, 90);
        assert_eq!(config.adaptation.max_remediations, 3);
        assert_eq!(config.research.max_findings, 5);
        assert_eq!(config.events.capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "stateDir": "/var/lib/tutor",
            "defaultPassThreshold": 80,
            "adaptation": { "maxRemediations": 1 },
            "research": { "maxFindings": 2 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.state_dir, "/var/lib/tutor");
        assert_eq!(config.default_pass_threshold, 80);
        assert_eq!(config.adaptation.max_remediations, 1);
        assert_eq!(config.adaptation.remediation_below, 70);
        assert_eq!(config.research.max_findings, 2);
        assert_eq!(config.events.capacity, 100);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{"outputDir": "reports", "llmProvider": "whatever"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.output_dir, "reports");
    }

    #[test]
    fn test_load_from_dir_finds_tutor_json() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{"outputDir": "out"}"#);

        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.output_dir, "out");
    }

    #[test]
    fn test_load_from_dir_no_config_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "{ not valid json }");

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(
            matches!(&err, TutorError::ConfigParseError { path: p, message } if *p == path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"events": {"capacity": 0}}"#);

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(
            matches!(&err, TutorError::ConfigValidationError { message, .. } if message.contains("events.capacity")),
            "Expected ConfigValidationError about events.capacity, got: {err:?}"
        );
    }

    #[test]
    fn test_validation_pass_threshold_range() {
        let config = Config {
            default_pass_threshold: 120,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("defaultPassThreshold"));
    }

    #[test]
    fn test_validation_threshold_order() {
        let config = Config {
            adaptation: AdaptationConfig {
                remediation_below: 95,
                accelerate_above: 90,
                max_remediations: 3,
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, TutorError::ConfigValidationError { suggestion, .. } if suggestion.contains("remediationBelow")),
            "got: {err:?}"
        );
    }

    #[test]
    fn test_validation_empty_paths() {
        let config = Config {
            state_dir: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            output_dir: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_max_findings() {
        let config = Config {
            research: ResearchConfig { max_findings: 0 },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("research.maxFindings"));
    }
}
