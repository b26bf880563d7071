//! Diagnostic Infrastructure
//!
//! Collecting and formatting compilation errors and warnings. Diagnostics
//! carry spans rather than raw string positions so they can be mapped back
//! to source text by whoever renders them.
//!
//! # Components
//!
//! - `Diagnostic` - A single diagnostic message with location and severity
//! - `DiagnosticBag` - A collection of diagnostics for a compilation phase
//! - `DiagnosticSeverity` - Error, Warning, Info, or Hint

use crate::span::Span;
use serde::Serialize;
use std::fmt;

// =============================================================================
// Diagnostic codes
// =============================================================================

/// Codes used by the generator lowering pass.
pub mod codes {
    /// A `yield` is embedded in an expression the decomposer cannot take apart.
    pub const UNDECOMPOSABLE_EXPRESSION: u32 = 901;
    /// A feature the pass recognizes but does not support yet.
    pub const CANNOT_CONVERT_YET: u32 = 902;
    /// A parse error.
    pub const PARSE_ERROR: u32 = 100;
}

// =============================================================================
// Diagnostic Severity
// =============================================================================

/// The severity level of a diagnostic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// A hint (lowest severity)
    Hint,
    /// Informational message
    Info,
    /// A warning
    Warning,
    /// An error (highest severity)
    #[default]
    Error,
}

impl DiagnosticSeverity {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Info => "info",
            DiagnosticSeverity::Hint => "hint",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DiagnosticSeverity::Error)
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Diagnostic
// =============================================================================

/// A diagnostic message with location, severity, and numeric code.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    /// The source span (byte offsets)
    pub span: Span,
    /// The diagnostic message
    pub message: String,
    /// The severity level
    pub severity: DiagnosticSeverity,
    /// The diagnostic code
    pub code: u32,
}

impl Diagnostic {
    pub fn new(
        span: Span,
        message: impl Into<String>,
        severity: DiagnosticSeverity,
        code: u32,
    ) -> Self {
        Diagnostic {
            span,
            message: message.into(),
            severity,
            code,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} YL{}: {} [{}..{}]",
            self.severity, self.code, self.message, self.span.start, self.span.end
        )
    }
}

// =============================================================================
// DiagnosticBag
// =============================================================================

/// A collection of diagnostics produced by one compilation phase.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>, code: u32) {
        self.diagnostics
            .push(Diagnostic::new(span, message, DiagnosticSeverity::Error, code));
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>, code: u32) {
        self.diagnostics.push(Diagnostic::new(
            span,
            message,
            DiagnosticSeverity::Warning,
            code,
        ));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }

    /// Drains all diagnostics out of the bag.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(DiagnosticSeverity::Error > DiagnosticSeverity::Warning);
        assert!(DiagnosticSeverity::Warning > DiagnosticSeverity::Info);
        assert!(DiagnosticSeverity::Info > DiagnosticSeverity::Hint);
    }

    #[test]
    fn bag_collects_and_reports_errors() {
        let mut bag = DiagnosticBag::new();
        assert!(!bag.has_errors());
        bag.warning(Span::new(0, 1), "looks odd", 1);
        assert!(!bag.has_errors());
        bag.error(Span::new(2, 5), "broken", codes::CANNOT_CONVERT_YET);
        assert!(bag.has_errors());
        assert_eq!(bag.len(), 2);
        let rendered = bag.iter().last().unwrap().to_string();
        assert!(rendered.contains("YL902"));
        assert!(rendered.contains("broken"));
    }

    #[test]
    fn diagnostics_serialize() {
        let diag = Diagnostic::new(
            Span::new(1, 4),
            "test",
            DiagnosticSeverity::Error,
            codes::UNDECOMPOSABLE_EXPRESSION,
        );
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"code\":901"));
        assert!(json.contains("\"severity\":\"error\""));
    }
}
