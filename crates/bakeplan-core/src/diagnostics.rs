//! Diagnostics infrastructure for tracking issues during validation.
//!
//! The pre-build gate collects every problem it finds instead of stopping at
//! the first one, so an operator sees the whole picture in a single run.
//! Warnings describe records that were accepted with an adjustment (e.g. a
//! clamped inventory entry date); errors are fatal and abort the solve.

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the record was accepted (possibly adjusted)
    Warning,
    /// The record is unusable; the solve must not proceed
    Error,
}

/// A single issue encountered during validation
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping (e.g. "catalog", "labor", "reachability")
    pub category: String,
    /// Human-readable description of the issue
    pub message: String,
    /// Optional entity reference (e.g. "product BREAD-WHITE", "route P1->H2")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of diagnostic issues for one validation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, category: &str, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn warning_for(&mut self, category: &str, entity: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn error(&mut self, category: &str, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn error_for(&mut self, category: &str, entity: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Merge another set of diagnostics into this one
    pub fn extend(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    /// Render all errors as a single multi-line message
    pub fn error_summary(&self) -> String {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut diag = Diagnostics::new();
        diag.warning("labor", "weekend day defaulted to zero hours");
        diag.error_for("catalog", "product X", "forecast references unknown product");
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
    }

    #[test]
    fn test_display_includes_entity() {
        let issue = DiagnosticIssue::new(Severity::Error, "route", "destination does not exist")
            .with_entity("route P1->X9");
        let text = issue.to_string();
        assert!(text.contains("[error:route]"));
        assert!(text.contains("route P1->X9"));
    }

    #[test]
    fn test_error_summary_skips_warnings() {
        let mut diag = Diagnostics::new();
        diag.warning("inventory", "entry date clamped");
        diag.error("cost", "shortage penalty below 4x production cost");
        let summary = diag.error_summary();
        assert!(summary.contains("shortage penalty"));
        assert!(!summary.contains("clamped"));
    }
}
