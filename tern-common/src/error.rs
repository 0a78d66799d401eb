//! Error handling for the Tern compiler backends
//!
//! Two recoverable error kinds exist at the function level: features the
//! target backend does not lower yet, and register exhaustion (a backend
//! limitation, reported separately from ordinary compile errors). Both abort
//! only the current function; the driver keeps compiling the rest of the
//! module. Internal consistency violations are panics, never `Err`.

use crate::source_loc::{SourceLocation, SourceSpan};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for the code generation backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    #[error("{location}: not yet implemented for this target: {feature}")]
    NotImplemented {
        location: SourceLocation,
        feature: String,
    },

    #[error("{location}: backend ran out of registers (this is a compiler limitation)")]
    OutOfRegisters { location: SourceLocation },

    #[error("Code generation error at {location}: {message}")]
    Codegen {
        location: SourceLocation,
        message: String,
    },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

impl CompilerError {
    /// Create a not-yet-implemented error for a feature
    pub fn not_implemented(feature: impl Into<String>, location: SourceLocation) -> Self {
        CompilerError::NotImplemented {
            location,
            feature: feature.into(),
        }
    }

    /// Create a codegen error
    pub fn codegen_error(message: impl Into<String>, location: SourceLocation) -> Self {
        CompilerError::Codegen {
            location,
            message: message.into(),
        }
    }

    /// Whether this error reflects a backend limitation rather than a
    /// problem with the input program
    pub fn is_backend_limitation(&self) -> bool {
        matches!(
            self,
            CompilerError::NotImplemented { .. } | CompilerError::OutOfRegisters { .. }
        )
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::Io {
            message: err.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with location and severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: SourceSpan,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: SourceSpan) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
        }
    }

    pub fn warning(message: String, span: SourceSpan) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span, self.severity, self.message)?;

        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }

        Ok(())
    }
}

/// Error reporter for collecting and displaying diagnostics
///
/// The module driver reports one diagnostic per failed function and keeps
/// going, so a single unsupported construct never hides errors elsewhere.
pub struct ErrorReporter {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
            error_count: 0,
            warning_count: 0,
        }
    }

    /// Report an error diagnostic
    pub fn error(&mut self, message: String, span: SourceSpan) -> &mut Diagnostic {
        let diagnostic = Diagnostic::error(message, span);
        self.diagnostics.push(diagnostic);
        self.error_count += 1;
        self.diagnostics.last_mut().unwrap()
    }

    /// Report a warning diagnostic
    pub fn warning(&mut self, message: String, span: SourceSpan) -> &mut Diagnostic {
        let diagnostic = Diagnostic::warning(message, span);
        self.diagnostics.push(diagnostic);
        self.warning_count += 1;
        self.diagnostics.last_mut().unwrap()
    }

    /// Report a function-scoped compile error
    pub fn report(&mut self, err: &CompilerError, span: SourceSpan) {
        let diag = self.error(err.to_string(), span);
        if err.is_backend_limitation() {
            diag.notes.push(
                "the rest of the module is compiled regardless; this function is skipped"
                    .to_string(),
            );
        }
    }

    /// Check if any errors have been reported
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Get the number of warnings
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Get all diagnostics
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Print all diagnostics to stderr
    pub fn print_diagnostics(&self) {
        for diagnostic in &self.diagnostics {
            eprintln!("{}", diagnostic);
        }
    }

    /// Create a summary string
    pub fn summary(&self) -> String {
        match (self.error_count, self.warning_count) {
            (0, 0) => "No errors or warnings".to_string(),
            (0, w) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (e, 0) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (e, w) => format!(
                "{} error{} and {} warning{}",
                e,
                if e == 1 { "" } else { "s" },
                w,
                if w == 1 { "" } else { "s" }
            ),
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_display() {
        let err = CompilerError::not_implemented(
            "128-bit integer arithmetic",
            SourceLocation::new("lib.tn", 3, 1),
        );
        assert_eq!(
            err.to_string(),
            "lib.tn:3:1: not yet implemented for this target: 128-bit integer arithmetic"
        );
        assert!(err.is_backend_limitation());
    }

    #[test]
    fn test_error_reporter() {
        let mut reporter = ErrorReporter::new();
        let span = SourceSpan::new(
            SourceLocation::new("main.tn", 1, 1),
            SourceLocation::new("main.tn", 1, 5),
        );

        assert!(!reporter.has_errors());
        assert_eq!(reporter.error_count(), 0);

        reporter.error("Test error".to_string(), span);
        assert!(reporter.has_errors());
        assert_eq!(reporter.error_count(), 1);
    }

    #[test]
    fn test_report_backend_limitation_adds_note() {
        let mut reporter = ErrorReporter::new();
        let err = CompilerError::OutOfRegisters {
            location: SourceLocation::dummy(),
        };
        reporter.report(&err, SourceSpan::dummy());

        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.diagnostics()[0].notes.len(), 1);
    }

    #[test]
    fn test_summary() {
        let mut reporter = ErrorReporter::new();
        assert_eq!(reporter.summary(), "No errors or warnings");

        let span = SourceSpan::dummy();
        reporter.error("Error 1".to_string(), span.clone());
        assert_eq!(reporter.summary(), "1 error");

        reporter.error("Error 2".to_string(), span.clone());
        assert_eq!(reporter.summary(), "2 errors");

        reporter.warning("Warning 1".to_string(), span);
        assert_eq!(reporter.summary(), "2 errors and 1 warning");
    }
}
