//! Diagnostic collection for the assembler pipeline.
//!
//! Nothing in the pipeline throws past a stage boundary: every problem is
//! lowered into a [`Diagnostic`] and appended to a [`DiagnosticList`] in
//! discovery order. The caller decides what to do with the list; success is
//! conventionally "no error-severity entry".
//!
//! # Diagnostic Format
//!
//! All diagnostics format to stderr in the standard style:
//! ```text
//! file.f8:10: error: message
//! ```

use std::fmt;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The construct could not be assembled; emission was suppressed or
    /// replaced with zero padding.
    Error,
    /// The construct assembled but deserves attention.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A source location: file path and 1-indexed line, with an optional
/// column when the lexer could recover one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    /// Source file path as it appears in the source set.
    pub file: String,
    /// 1-indexed line number within that file.
    pub line: usize,
    /// 1-indexed column number, if known.
    pub column: Option<usize>,
}

impl SourceLoc {
    /// Creates a source location without column information.
    #[must_use]
    pub const fn new(file: String, line: usize) -> Self {
        Self {
            file,
            line,
            column: None,
        }
    }

    /// Attaches a column to the location.
    #[must_use]
    pub const fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{column}", self.file, self.line),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// A single diagnostic with severity, location, message, and an optional
/// remediation suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Where the problem was discovered.
    pub location: SourceLoc,
    /// Human-readable description.
    pub message: String,
    /// Optional remediation hint.
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    #[must_use]
    pub fn error(location: SourceLoc, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Creates a warning diagnostic.
    #[must_use]
    pub fn warning(location: SourceLoc, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Attaches a remediation suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Formats the diagnostic for stderr output.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        match &self.suggestion {
            Some(suggestion) => format!(
                "{}: {}: {} (help: {suggestion})",
                self.location, self.severity, self.message
            ),
            None => format!("{}: {}: {}", self.location, self.severity, self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity, self.message)
    }
}

/// A growable diagnostic collection preserving discovery order.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticList {
    items: Vec<Diagnostic>,
}

impl DiagnosticList {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Returns true if the collection is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of diagnostics.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if any diagnostic has error severity.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|diagnostic| diagnostic.severity == Severity::Error)
    }

    /// Returns an iterator over the diagnostics in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Consumes the collection into its backing vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }

    /// Formats all diagnostics for stderr output.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        self.items
            .iter()
            .map(Diagnostic::format_for_stderr)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for DiagnosticList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl FromIterator<Diagnostic> for DiagnosticList {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
