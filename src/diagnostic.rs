use crate::error::Error;
use crate::source::SourceLocation;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

/// A single reported diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub location: Option<SourceLocation>,
}

/// Collects non-fatal diagnostics produced while a translation unit is processed.
///
/// Fatal problems travel as [`Error`] values; the engine only keeps what does not
/// abort the pipeline, plus the final error when the caller chooses to record it.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    pub diagnostics: Vec<Diagnostic>,
    pub warnings_as_errors: bool,
    pub disable_all_warnings: bool,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_warnings(warnings: &[String]) -> Self {
        let warnings_as_errors = warnings.iter().any(|w| w == "error");
        let disable_all_warnings = warnings.iter().any(|w| w == "no-warnings");
        Self {
            diagnostics: Vec::new(),
            warnings_as_errors,
            disable_all_warnings,
        }
    }

    pub fn report_warning(&mut self, message: impl Into<String>, location: Option<SourceLocation>) {
        if self.disable_all_warnings {
            return;
        }
        let level = if self.warnings_as_errors {
            DiagnosticLevel::Error
        } else {
            DiagnosticLevel::Warning
        };
        self.diagnostics.push(Diagnostic {
            level,
            message: message.into(),
            location,
        });
    }

    pub fn report_note(&mut self, message: impl Into<String>, location: Option<SourceLocation>) {
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Note,
            message: message.into(),
            location,
        });
    }

    pub fn report_error(&mut self, error: &Error) {
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            message: format!("{}: {}", error.kind, error.message),
            location: error.location,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.level == DiagnosticLevel::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_as_errors() {
        let mut diag = DiagnosticEngine::from_warnings(&["error".to_string()]);
        diag.report_warning("redefined", None);
        assert!(diag.has_errors());

        let mut quiet = DiagnosticEngine::from_warnings(&["no-warnings".to_string()]);
        quiet.report_warning("redefined", None);
        assert!(quiet.diagnostics().is_empty());
    }
}
