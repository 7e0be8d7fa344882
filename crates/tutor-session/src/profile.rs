//! Learner profile types.
//!
//! A [`LearnerProfile`] is built once from interview answers when a session
//! starts. It only changes afterwards through an explicit profile update
//! while the session is adapting.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// Goal wording that signals the learner wants to go deeper than their level.
static STRETCH_GOAL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(advanced|expert)\b").ok());

/// Goal wording that signals the learner wants an introductory treatment.
static GENTLE_GOAL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(basics?|introduction|intro)\b").ok());

// ============================================================================
// ExperienceLevel
// ============================================================================

/// Self-reported experience with the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExperienceLevel {
    /// No prior exposure.
    Beginner,
    /// Working knowledge.
    Intermediate,
    /// Comfortable with most of the material.
    Advanced,
    /// Deep practitioner.
    Expert,
}

impl ExperienceLevel {
    const ALL: [Self; 4] = [
        Self::Beginner,
        Self::Intermediate,
        Self::Advanced,
        Self::Expert,
    ];

    /// Parses a string into an `ExperienceLevel`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }

    /// Returns the lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }

    const fn rank(self) -> usize {
        match self {
            Self::Beginner => 0,
            Self::Intermediate => 1,
            Self::Advanced => 2,
            Self::Expert => 3,
        }
    }

    /// Moves the level up or down by `delta`, clamped to the valid range.
    #[must_use]
    pub fn shifted(self, delta: i8) -> Self {
        let rank = self.rank();
        let target = if delta >= 0 {
            rank.saturating_add(delta.unsigned_abs() as usize)
        } else {
            rank.saturating_sub(delta.unsigned_abs() as usize)
        };
        Self::ALL[target.min(Self::ALL.len() - 1)]
    }
}

impl std::fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExperienceLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid experience level '{s}': expected one of 'beginner', 'intermediate', 'advanced', 'expert'"
            ))
        })
    }
}

impl Serialize for ExperienceLevel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Modality
// ============================================================================

/// How the learner prefers to receive content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Modality {
    /// Written lessons.
    Text,
    /// Diagrams and images.
    Visual,
    /// Narrated audio.
    Auditory,
    /// A blend of all of the above (default).
    #[default]
    Mixed,
}

impl Modality {
    /// Parses a string into a `Modality`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "visual" => Some(Self::Visual),
            "auditory" | "audio" => Some(Self::Auditory),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    /// Returns the lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Visual => "visual",
            Self::Auditory => "auditory",
            Self::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Modality {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid modality '{s}': expected one of 'text', 'visual', 'auditory', 'mixed'"
            ))
        })
    }
}

impl Serialize for Modality {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Pace
// ============================================================================

/// Recommended progression speed derived from the assessed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    /// Extra practice between checkpoints.
    Slow,
    /// Regular cadence.
    Moderate,
    /// Compressed schedule.
    Fast,
}

impl Pace {
    /// Estimated calendar length of a full roadmap at this pace.
    #[must_use]
    pub const fn estimated_timeline(&self) -> &'static str {
        match self {
            Self::Slow => "6-8 weeks",
            Self::Moderate => "4-6 weeks",
            Self::Fast => "2-3 weeks",
        }
    }
}

// ============================================================================
// InterviewAnswers
// ============================================================================

/// Structured answers returned by the interview collaborator.
///
/// Every field is optional on the wire so that missing answers can be
/// reported back to the learner instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewAnswers {
    /// Subject the learner wants to study.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Self-reported experience level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<ExperienceLevel>,

    /// What the learner wants to achieve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// Preferred content modality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<Modality>,
}

impl InterviewAnswers {
    /// Returns the names of mandatory fields that are missing or blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.experience_level.is_none() {
            missing.push("experience level");
        }
        if self.goal.as_deref().map_or(true, |g| g.trim().is_empty()) {
            missing.push("goal");
        }
        missing
    }

    /// Converts the answers into a profile.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::IncompleteProfile` if experience level or goal is
    /// missing.
    pub fn into_profile(self) -> Result<LearnerProfile> {
        let missing = self.missing_fields();
        let (Some(experience_level), Some(goal)) = (self.experience_level, self.goal) else {
            return Err(TutorError::incomplete_profile(missing));
        };
        if !missing.is_empty() {
            return Err(TutorError::incomplete_profile(missing));
        }

        Ok(LearnerProfile {
            topic: self.topic.filter(|t| !t.trim().is_empty()),
            experience_level,
            goal: goal.trim().to_string(),
            modality: self.modality.unwrap_or_default(),
        })
    }
}

// ============================================================================
// LearnerProfile
// ============================================================================

/// Who the learner is and how they like to learn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    /// Subject being studied, when the interview captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Self-reported experience level.
    pub experience_level: ExperienceLevel,

    /// Stated learning goal.
    pub goal: String,

    /// Preferred content modality.
    pub modality: Modality,
}

impl LearnerProfile {
    /// Returns the topic, falling back to the stated goal.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.topic.as_deref().unwrap_or(&self.goal)
    }

    /// Level to pitch content at, combining experience and goal wording.
    ///
    /// ```
    /// use tutor_session::{ExperienceLevel, LearnerProfile, Modality};
    ///
    /// let profile = LearnerProfile {
    ///     topic: Some("Rust".to_string()),
    ///     experience_level: ExperienceLevel::Beginner,
    ///     goal: "Write advanced async services".to_string(),
    ///     modality: Modality::Text,
    /// };
    /// assert_eq!(profile.assessed_level(), ExperienceLevel::Intermediate);
    /// ```
    #[must_use]
    pub fn assessed_level(&self) -> ExperienceLevel {
        let matches = |re: &Lazy<Option<Regex>>| {
            re.as_ref().map_or(false, |re| re.is_match(&self.goal))
        };

        let delta = if matches(&STRETCH_GOAL) {
            1
        } else if matches(&GENTLE_GOAL) {
            -1
        } else {
            0
        };
        self.experience_level.shifted(delta)
    }

    /// Recommended pace for the assessed level.
    #[must_use]
    pub fn pace(&self) -> Pace {
        match self.assessed_level() {
            ExperienceLevel::Beginner => Pace::Slow,
            ExperienceLevel::Intermediate => Pace::Moderate,
            ExperienceLevel::Advanced | ExperienceLevel::Expert => Pace::Fast,
        }
    }

    /// Applies a partial update, returning the new profile.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::IncompleteProfile` if the update blanks the goal.
    pub fn updated(&self, update: &ProfileUpdate) -> Result<Self> {
        let mut next = self.clone();
        if let Some(level) = update.experience_level {
            next.experience_level = level;
        }
        if let Some(goal) = &update.goal {
            if goal.trim().is_empty() {
                return Err(TutorError::incomplete_profile(["goal"]));
            }
            next.goal = goal.trim().to_string();
        }
        if let Some(modality) = update.modality {
            next.modality = modality;
        }
        Ok(next)
    }
}

/// Partial profile change applied while a session is adapting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// New experience level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<ExperienceLevel>,

    /// New learning goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// New preferred modality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<Modality>,
}
