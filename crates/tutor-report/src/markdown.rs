//! Markdown report rendering.
//!
//! [`MarkdownGenerator`] turns a [`Report`] into a document with:
//!
//! - Learner details
//! - A summary table
//! - Per-stage checkpoint results
//! - The adaptation history
//! - A timeline of events
//! - Prioritized recommendations
//!
//! # Example
//!
//! ```rust
//! use tutor_report::{MarkdownGenerator, Report};
//!
//! let report = Report::default();
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.starts_with("# Learning Progress Report"));
//! ```

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{format_duration, CheckpointResult, Report, StageResult, TimelineEntry};

/// Renders a [`Report`] as Markdown.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a generator for `report`.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Renders the complete document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_learner(&mut output);
        self.write_summary(&mut output);
        self.write_stages(&mut output);
        self.write_adaptations(&mut output);
        self.write_timeline(&mut output);
        self.write_recommendations(&mut output);
        Self::write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let topic = &self.report.learner.topic;
        if topic.is_empty() {
            let _ = writeln!(output, "# Learning Progress Report\n");
        } else {
            let _ = writeln!(
                output,
                "# Learning Progress Report: {}\n",
                escape_markdown(topic)
            );
        }
    }

    fn write_learner(&self, output: &mut String) {
        let learner = &self.report.learner;

        let _ = writeln!(output, "## Learner\n");
        let _ = writeln!(output, "- **Session**: `{}`", self.report.session_id);
        let _ = writeln!(
            output,
            "- **Experience level**: {}",
            escape_markdown(&learner.experience_level)
        );
        let _ = writeln!(output, "- **Goal**: {}", escape_markdown(&learner.goal));
        let _ = writeln!(
            output,
            "- **Preferred modality**: {}\n",
            escape_markdown(&learner.modality)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let average = summary
            .average_score
            .map_or_else(|| "n/a".to_string(), |avg| format!("{avg:.1}"));

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", summary.status.description());
        let _ = writeln!(
            output,
            "| Stages | {} of {} completed |",
            summary.stages_completed, summary.stage_count
        );
        let _ = writeln!(
            output,
            "| Checkpoints | {} of {} passed |",
            summary.checkpoints_passed, summary.checkpoints_evaluated
        );
        let _ = writeln!(output, "| Average Score | {average} |");
        let _ = writeln!(output, "| Review Stages | {} |", summary.remediations);
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(summary.duration_seconds)
        );
        let _ = writeln!(output);
    }

    fn write_stages(&self, output: &mut String) {
        let _ = writeln!(output, "## Roadmap\n");

        if self.report.stages.is_empty() {
            let _ = writeln!(output, "*No roadmap planned yet.*\n");
            return;
        }

        for stage in &self.report.stages {
            Self::write_stage(output, stage);
        }
    }

    fn write_stage(output: &mut String, stage: &StageResult) {
        let marker = if stage.completed { "&#9989;" } else { "&#9203;" };
        let _ = writeln!(
            output,
            "### {marker} Stage {}: {}\n",
            stage.index + 1,
            escape_markdown(&stage.title)
        );

        if stage.checkpoints.is_empty() {
            let _ = writeln!(output, "*No checkpoints.*\n");
            return;
        }

        let _ = writeln!(output, "| # | Checkpoint | Threshold | Score | Result | Feedback |");
        let _ = writeln!(output, "|---|------------|-----------|-------|--------|----------|");
        for (index, checkpoint) in stage.checkpoints.iter().enumerate() {
            Self::write_checkpoint_row(output, index, checkpoint);
        }
        let _ = writeln!(output);
    }

    fn write_checkpoint_row(output: &mut String, index: usize, checkpoint: &CheckpointResult) {
        let score = checkpoint
            .score
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let result = match checkpoint.passed {
            Some(true) => "Passed",
            Some(false) => "Not passed",
            None => "Pending",
        };
        let feedback = checkpoint
            .feedback
            .as_deref()
            .map(escape_markdown)
            .unwrap_or_default();

        let _ = writeln!(
            output,
            "| {} | {} | {} | {score} | {result} | {feedback} |",
            index + 1,
            escape_markdown(&checkpoint.kind),
            checkpoint.threshold
        );
    }

    fn write_adaptations(&self, output: &mut String) {
        let _ = writeln!(output, "## Adaptations\n");

        if self.report.adaptations.is_empty() {
            let _ = writeln!(output, "*No adaptations recorded.*\n");
            return;
        }

        let _ = writeln!(output, "| Time | Trigger | Decision | Profile Updated |");
        let _ = writeln!(output, "|------|---------|----------|-----------------|");
        for adaptation in &self.report.adaptations {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                format_timestamp(&adaptation.timestamp),
                escape_markdown(&adaptation.trigger),
                escape_markdown(&adaptation.decision),
                if adaptation.profile_changed { "yes" } else { "no" }
            );
        }
        let _ = writeln!(output);
    }

    fn write_timeline(&self, output: &mut String) {
        let _ = writeln!(output, "## Timeline\n");

        if self.report.timeline.is_empty() {
            let _ = writeln!(output, "*No timeline events recorded.*\n");
            return;
        }

        let _ = writeln!(output, "| Time | Event | Details |");
        let _ = writeln!(output, "|------|-------|---------|");
        for entry in &self.report.timeline {
            Self::write_timeline_entry(output, entry);
        }
        let _ = writeln!(output);
    }

    fn write_timeline_entry(output: &mut String, entry: &TimelineEntry) {
        let details = entry
            .details
            .as_deref()
            .map(escape_markdown)
            .unwrap_or_default();
        let time = format_timestamp(&entry.timestamp);
        let event = escape_markdown(&entry.event);
        let _ = writeln!(output, "| {time} | {event} | {details} |");
    }

    fn write_recommendations(&self, output: &mut String) {
        let _ = writeln!(output, "## Recommendations\n");

        if self.report.recommendations.is_empty() {
            let _ = writeln!(output, "*No specific recommendations.*\n");
            return;
        }

        let mut sorted: Vec<_> = self.report.recommendations.iter().collect();
        sorted.sort_by_key(|r| r.priority);

        for (index, rec) in sorted.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. **[{}]** {}",
                index + 1,
                escape_markdown(&rec.category),
                escape_markdown(&rec.description),
            );
        }
        let _ = writeln!(output);
    }

    fn write_footer(output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&Utc::now());
        let _ = writeln!(output, "*Generated by tutor at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes characters that Markdown would interpret, and flattens newlines
/// so the text fits in a table cell.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
