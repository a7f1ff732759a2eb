//! Diagnostic types shared by analysis and the LSP layer.

use crate::Range;

/// Diagnostic severity level for display.
///
/// Maps directly to LSP's `DiagnosticSeverity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Error - indicates a problem that prevents correct execution
    Error,
    /// Warning - indicates a potential problem
    Warning,
    /// Information - informational message
    Information,
    /// Hint - a suggestion or style recommendation
    Hint,
}

impl DiagnosticSeverity {
    /// Returns true if this severity indicates an error.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Information => write!(f, "info"),
            Self::Hint => write!(f, "hint"),
        }
    }
}

/// A single diagnostic attached to a range of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Range the diagnostic applies to
    pub range: Range,
    /// Severity of the diagnostic
    pub severity: DiagnosticSeverity,
    /// Human-readable message
    pub message: String,
    /// Stable machine-readable code (e.g. `"syntax"`, `"unknown-field"`)
    pub code: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    #[must_use]
    pub fn error(range: Range, message: impl Into<String>) -> Self {
        Self {
            range,
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            code: None,
        }
    }

    /// Create a warning diagnostic.
    #[must_use]
    pub fn warning(range: Range, message: impl Into<String>) -> Self {
        Self {
            range,
            severity: DiagnosticSeverity::Warning,
            message: message.into(),
            code: None,
        }
    }

    /// Create an informational diagnostic.
    #[must_use]
    pub fn info(range: Range, message: impl Into<String>) -> Self {
        Self {
            range,
            severity: DiagnosticSeverity::Information,
            message: message.into(),
            code: None,
        }
    }

    /// Attach a machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    #[test]
    fn test_severity_display() {
        assert_eq!(DiagnosticSeverity::Error.to_string(), "error");
        assert_eq!(DiagnosticSeverity::Warning.to_string(), "warning");
        assert_eq!(DiagnosticSeverity::Information.to_string(), "info");
        assert_eq!(DiagnosticSeverity::Hint.to_string(), "hint");
    }

    #[test]
    fn test_constructors() {
        let range = Range::at(Position::new(0, 0));
        let diag = Diagnostic::error(range, "boom").with_code("syntax");
        assert!(diag.severity.is_error());
        assert_eq!(diag.code.as_deref(), Some("syntax"));
        assert_eq!(Diagnostic::warning(range, "w").severity, DiagnosticSeverity::Warning);
        assert_eq!(Diagnostic::info(range, "i").severity, DiagnosticSeverity::Information);
    }
}
