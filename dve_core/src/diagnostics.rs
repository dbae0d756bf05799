//! Source positions and the diagnostics collected while building a model.

use log::warn;
use std::fmt;

/// A range of source text, from the first character of a construct to its last one.
///
/// Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    /// Line of the first character.
    pub first_line: u32,
    /// Column of the first character.
    pub first_col: u32,
    /// Line of the last character.
    pub last_line: u32,
    /// Column of the last character.
    pub last_col: u32,
}

impl SourceSpan {
    /// Creates a new span.
    pub const fn new(first_line: u32, first_col: u32, last_line: u32, last_col: u32) -> Self {
        Self {
            first_line,
            first_col,
            last_line,
            last_col,
        }
    }

    /// Span covering both `self` and `other`, assuming `self` starts first.
    pub const fn to(self, other: SourceSpan) -> Self {
        Self {
            first_line: self.first_line,
            first_col: self.first_col,
            last_line: other.last_line,
            last_col: other.last_col,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.first_line, self.first_col, self.last_line, self.last_col
        )
    }
}

/// How serious a [`Diagnostic`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The model is still usable.
    Warning,
    /// The model cannot be built.
    Error,
}

/// A message about the model, possibly tied to a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the message.
    pub severity: Severity,
    /// Where the message originates, if known.
    pub span: Option<SourceSpan>,
    /// Text of the message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{span} {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Collects the diagnostics produced while parsing and consolidating a model.
///
/// An instance is passed explicitly to every phase that can report problems.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and forwards it to the logger.
    pub fn warn(&mut self, span: Option<SourceSpan>, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            severity: Severity::Warning,
            span,
            message: message.into(),
        };
        warn!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    /// Records an error.
    pub fn error(&mut self, span: Option<SourceSpan>, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            span,
            message: message.into(),
        });
    }

    /// Whether any error has been recorded.
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Iterates over the recorded errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    /// Iterates over the recorded warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// All recorded diagnostics, in order of emission.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_display() {
        let span = SourceSpan::new(3, 7, 4, 1);
        assert_eq!(span.to_string(), "3:7-4:1");
        let joined = SourceSpan::new(1, 1, 1, 3).to(SourceSpan::new(2, 5, 2, 9));
        assert_eq!(joined, SourceSpan::new(1, 1, 2, 9));
    }

    #[test]
    fn collect() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());
        diagnostics.warn(None, "unused channel");
        assert!(!diagnostics.has_errors());
        diagnostics.error(Some(SourceSpan::new(1, 1, 1, 2)), "bad");
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.warnings().count(), 1);
        assert_eq!(diagnostics.errors().next().unwrap().to_string(), "1:1-1:2 bad");
    }
}
