//! JSON report output.
//!
//! [`JsonGenerator`] serializes a [`Report`] as compact single-line JSON for
//! machines or pretty-printed JSON for people.
//!
//! ```rust
//! use tutor_report::{json::JsonGenerator, Report};
//!
//! let report = Report::default();
//! let generator = JsonGenerator::new(&report);
//!
//! assert!(!generator.generate().unwrap().contains('\n'));
//! assert!(generator.generate_pretty().unwrap().contains("\"summary\""));
//! ```

use std::path::Path;

use crate::{Report, ReportError, Result};

/// Serializes a borrowed [`Report`] to JSON.
pub struct JsonGenerator<'a> {
    report: &'a Report,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a generator for `report`.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Compact JSON (single line).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Pretty-printed JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the report to `path`, creating or truncating the file.
    ///
    /// Parent directories must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails and
    /// [`ReportError::Io`] if the file cannot be written.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };
        std::fs::write(path, json)?;
        Ok(())
    }
}
