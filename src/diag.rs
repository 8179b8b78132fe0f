//! Compile-pipeline diagnostics.
//!
//! Every compile failure is a [`Diag`]: which pipeline phase rejected the
//! query, where in the query text, and why. A diagnostic renders two ways:
//! as a rich [`miette::Report`] against the query text for terminals, and
//! as the single [`EngineError`] the engine facade surfaces, carrying
//! line/column context and the namespaced rule code either way.

use crate::ast::Span;
use crate::error::{EngineError, ErrorKind};
use miette::{LabeledSpan, Report, Severity};
use std::fmt;

/// The compile phase a diagnostic originated from.
///
/// The phase determines both the code namespace (`lexer::…`, `types::…`)
/// and the [`ErrorKind`] the diagnostic converts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Parser,
    Semantic,
    TypeCheck,
    Validation,
}

impl Phase {
    /// The error kind surfaced for diagnostics of this phase.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Phase::Lexer => ErrorKind::Lexer,
            Phase::Parser => ErrorKind::Parser,
            Phase::Semantic => ErrorKind::Semantic,
            Phase::TypeCheck => ErrorKind::TypeCheck,
            Phase::Validation => ErrorKind::Validation,
        }
    }

    /// The code namespace for rules of this phase.
    fn prefix(&self) -> &'static str {
        match self {
            Phase::Lexer => "lexer",
            Phase::Parser => "parser",
            Phase::Semantic => "semantic",
            Phase::TypeCheck => "types",
            Phase::Validation => "validation",
        }
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagSeverity {
    /// Prevents the query from compiling.
    Error,
    /// Suspicious but compilable.
    Warning,
    /// Informational.
    Note,
}

/// Whether a label is the diagnostic's anchor or supporting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRole {
    Primary,
    Secondary,
}

/// A captioned span inside the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagLabel {
    /// The span this label points at.
    pub span: Span,
    /// Caption shown next to the underline.
    pub caption: String,
    /// Anchor or context.
    pub role: LabelRole,
}

/// A structured compile diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diag {
    /// Phase that produced this diagnostic.
    pub phase: Phase,
    /// Severity level.
    pub severity: DiagSeverity,
    /// The main message.
    pub message: String,
    /// Rule slug within the phase; renders as `phase::rule`.
    pub rule: Option<&'static str>,
    /// Labeled spans into the query text.
    pub labels: Vec<DiagLabel>,
    /// Optional fix suggestion.
    pub help: Option<String>,
    /// Extra context lines appended to the rendered help.
    pub notes: Vec<String>,
}

impl Diag {
    /// Creates a diagnostic with explicit phase and severity.
    pub fn new(phase: Phase, severity: DiagSeverity, message: impl Into<String>) -> Self {
        Self {
            phase,
            severity,
            message: message.into(),
            rule: None,
            labels: Vec::new(),
            help: None,
            notes: Vec::new(),
        }
    }

    /// A lexer error.
    pub fn lexer(message: impl Into<String>) -> Self {
        Self::new(Phase::Lexer, DiagSeverity::Error, message)
    }

    /// A parser error.
    pub fn parser(message: impl Into<String>) -> Self {
        Self::new(Phase::Parser, DiagSeverity::Error, message)
    }

    /// A semantic-analysis error.
    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(Phase::Semantic, DiagSeverity::Error, message)
    }

    /// A type-inference error.
    pub fn type_check(message: impl Into<String>) -> Self {
        Self::new(Phase::TypeCheck, DiagSeverity::Error, message)
    }

    /// A structural-validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Phase::Validation, DiagSeverity::Error, message)
    }

    /// A warning in the given phase.
    pub fn warning(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(phase, DiagSeverity::Warning, message)
    }

    /// Anchors the diagnostic at a span (primary label).
    pub fn at(mut self, span: Span, caption: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            span,
            caption: caption.into(),
            role: LabelRole::Primary,
        });
        self
    }

    /// Adds a supporting span (secondary label).
    pub fn also(mut self, span: Span, caption: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            span,
            caption: caption.into(),
            role: LabelRole::Secondary,
        });
        self
    }

    /// Names the rule that fired.
    pub fn rule(mut self, rule: &'static str) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Attaches a fix suggestion.
    pub fn suggest(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Appends a context note.
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// The namespaced code, e.g. `lexer::unterminated_string`.
    pub fn code(&self) -> Option<String> {
        self.rule
            .map(|rule| format!("{}::{rule}", self.phase.prefix()))
    }

    /// Returns true for error-severity diagnostics.
    pub fn is_error(&self) -> bool {
        self.severity == DiagSeverity::Error
    }

    /// The span of the first primary label, if the diagnostic has one.
    pub fn primary_span(&self) -> Option<Span> {
        self.labels
            .iter()
            .find(|label| label.role == LabelRole::Primary)
            .map(|label| label.span.clone())
    }

    /// Converts this diagnostic into the error shape the engine surfaces:
    /// the phase's error kind, with line/column resolved against the query
    /// text and the rule code attached as context.
    pub fn to_engine_error(&self, source: &SourceFile) -> EngineError {
        let mut error = EngineError::new(self.phase.error_kind(), self.message.clone());
        if let Some(span) = self.primary_span() {
            let (line, column) = source.line_column(span.start);
            error = error
                .with_context("line", line)
                .with_context("column", column);
        }
        if let Some(code) = self.code() {
            error = error.with_context("diagnostic", code);
        }
        error
    }
}

/// Returns true when any diagnostic in the batch is an error.
pub fn has_errors(diags: &[Diag]) -> bool {
    diags.iter().any(Diag::is_error)
}

/// Collapses a diagnostic batch into the single error the engine surfaces:
/// the first error-severity diagnostic wins, then the first of any
/// severity, then a bare error of the fallback phase.
pub fn engine_error_from(diags: &[Diag], source: &SourceFile, fallback: Phase) -> EngineError {
    diags
        .iter()
        .find(|diag| diag.is_error())
        .or_else(|| diags.first())
        .map(|diag| diag.to_engine_error(source))
        .unwrap_or_else(|| EngineError::new(fallback.error_kind(), "compilation failed"))
}

/// Query text paired with an optional display name.
///
/// WebQL sources are usually ad-hoc strings rather than files; unnamed
/// sources render under the placeholder name `query`.
#[derive(Debug, Clone)]
pub struct SourceFile {
    content: String,
    name: Option<String>,
}

impl SourceFile {
    /// Wraps query text.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: None,
        }
    }

    /// Wraps query text with a display name.
    pub fn named(content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: Some(name.into()),
        }
    }

    /// The query text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The display name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Computes the 1-based line and column of a byte offset. Offsets past
    /// the end (or inside a multi-byte character) resolve to the nearest
    /// preceding position.
    pub fn line_column(&self, offset: usize) -> (u32, u32) {
        let mut line = 1u32;
        let mut column = 1u32;
        for (index, ch) in self.content.char_indices() {
            if index >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }

    /// Clamps a span into bounds, as (offset, length) for rendering.
    fn clamp(&self, span: &Span) -> (usize, usize) {
        let len = self.content.len();
        let start = span.start.min(len);
        let end = span.end.clamp(start, len);
        (start, end - start)
    }
}

/// Renders a batch of diagnostics against the query text.
pub fn render_all(diags: &[Diag], source: &SourceFile) -> Vec<Report> {
    diags.iter().map(|diag| render(diag, source)).collect()
}

/// Renders one diagnostic as a miette report with query-text context.
pub fn render(diag: &Diag, source: &SourceFile) -> Report {
    let labels: Vec<LabeledSpan> = diag
        .labels
        .iter()
        .map(|label| {
            let span = source.clamp(&label.span);
            match label.role {
                LabelRole::Primary => {
                    LabeledSpan::new_primary_with_span(Some(label.caption.clone()), span)
                }
                LabelRole::Secondary => LabeledSpan::new_with_span(Some(label.caption.clone()), span),
            }
        })
        .collect();

    // The suggestion and the notes share the help footer.
    let mut help_lines: Vec<String> = Vec::new();
    if let Some(help) = &diag.help {
        help_lines.push(help.clone());
    }
    help_lines.extend(diag.notes.iter().cloned());

    Report::new(RenderedDiag {
        message: diag.message.clone(),
        severity: match diag.severity {
            DiagSeverity::Error => Severity::Error,
            DiagSeverity::Warning => Severity::Warning,
            DiagSeverity::Note => Severity::Advice,
        },
        code: diag.code(),
        help: (!help_lines.is_empty()).then(|| help_lines.join("\n")),
        labels,
        source: miette::NamedSource::new(
            source.name().unwrap_or("query"),
            source.content().to_string(),
        ),
    })
}

/// A diagnostic bound to its query text, ready for terminal rendering.
#[derive(Debug)]
struct RenderedDiag {
    message: String,
    severity: Severity,
    code: Option<String>,
    help: Option<String>,
    labels: Vec<LabeledSpan>,
    source: miette::NamedSource<String>,
}

impl fmt::Display for RenderedDiag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RenderedDiag {}

impl miette::Diagnostic for RenderedDiag {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }

    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.code
            .as_ref()
            .map(|code| Box::new(code) as Box<dyn fmt::Display>)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.labels.is_empty() {
            return None;
        }
        Some(Box::new(self.labels.iter().cloned()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_maps_to_error_kind() {
        assert_eq!(Phase::Lexer.error_kind(), ErrorKind::Lexer);
        assert_eq!(Phase::TypeCheck.error_kind(), ErrorKind::TypeCheck);
        assert_eq!(Phase::Validation.error_kind(), ErrorKind::Validation);
    }

    #[test]
    fn rule_renders_namespaced_code() {
        let diag = Diag::lexer("unterminated string").rule("unterminated_string");
        assert_eq!(diag.code().as_deref(), Some("lexer::unterminated_string"));

        let diag = Diag::type_check("mismatch");
        assert_eq!(diag.code(), None);
    }

    #[test]
    fn type_check_codes_use_the_types_namespace() {
        let diag = Diag::type_check("bad operand").rule("mismatch");
        assert_eq!(diag.code().as_deref(), Some("types::mismatch"));
    }

    #[test]
    fn primary_span_absent_without_labels() {
        let diag = Diag::parser("expected statement");
        assert_eq!(diag.primary_span(), None);
    }

    #[test]
    fn primary_span_ignores_secondary_labels() {
        let diag = Diag::validation("duplicate output name")
            .also(2..7, "first use here")
            .also(14..19, "second use here");
        assert_eq!(diag.primary_span(), None);
    }

    #[test]
    fn primary_span_prefers_first_primary() {
        let diag = Diag::validation("duplicate output name")
            .also(2..7, "first use here")
            .at(14..19, "second use here")
            .at(30..31, "another anchor");
        assert_eq!(diag.primary_span(), Some(14..19));
    }

    #[test]
    fn has_errors_distinguishes_warnings() {
        let warnings = vec![Diag::warning(Phase::Semantic, "shadowed variable")];
        assert!(!has_errors(&warnings));

        let mixed = vec![
            Diag::warning(Phase::Semantic, "shadowed variable"),
            Diag::parser("expected FROM"),
        ];
        assert!(has_errors(&mixed));
        assert!(!has_errors(&[]));
    }

    #[test]
    fn engine_error_carries_position_context() {
        let source = SourceFile::new("SELECT title\nFROM 'ftp://x'");
        let diag = Diag::validation("URL scheme 'ftp:' is not allowed")
            .at(18..27, "here")
            .rule("url_scheme");
        let error = diag.to_engine_error(&source);

        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(!error.recoverable);
        assert_eq!(error.context.get("line").map(String::as_str), Some("2"));
        assert_eq!(error.context.get("column").map(String::as_str), Some("6"));
        assert_eq!(
            error.context.get("diagnostic").map(String::as_str),
            Some("validation::url_scheme")
        );
    }

    #[test]
    fn engine_error_without_anchor_has_no_position() {
        let source = SourceFile::new("SELECT 1");
        let error = Diag::semantic("nesting too deep").to_engine_error(&source);
        assert_eq!(error.kind, ErrorKind::Semantic);
        assert!(!error.context.contains_key("line"));
        assert!(!error.context.contains_key("column"));
    }

    #[test]
    fn engine_error_from_prefers_first_error() {
        let source = SourceFile::new("SELECT 1");
        let diags = vec![
            Diag::warning(Phase::Lexer, "odd spacing"),
            Diag::parser("expected FROM"),
        ];
        let error = engine_error_from(&diags, &source, Phase::Lexer);
        assert_eq!(error.kind, ErrorKind::Parser);
        assert_eq!(error.message, "expected FROM");
    }

    #[test]
    fn engine_error_from_empty_batch_uses_fallback() {
        let source = SourceFile::new("");
        let error = engine_error_from(&[], &source, Phase::Lexer);
        assert_eq!(error.kind, ErrorKind::Lexer);
    }

    #[test]
    fn line_column_counts_newlines() {
        let source = SourceFile::new("SELECT *\nFROM 'https://x'");
        assert_eq!(source.line_column(0), (1, 1));
        assert_eq!(source.line_column(7), (1, 8));
        assert_eq!(source.line_column(9), (2, 1));
        // Past-the-end offsets resolve to the final position.
        assert_eq!(source.line_column(999), (2, 17));
    }

    #[test]
    fn render_survives_out_of_bounds_spans() {
        let source = SourceFile::new("short");
        let diag = Diag::parser("unexpected end of input").at(50..99, "here");
        let report = render(&diag, &source);
        assert!(format!("{report:?}").contains("unexpected end of input"));
    }

    #[test]
    fn render_includes_suggestion_and_notes() {
        let source = SourceFile::new("NAVIGATE TO x");
        let diag = Diag::parser("NAVIGATE target must be quoted")
            .at(12..13, "here")
            .suggest("wrap the URL in quotes")
            .note("at line 1, column 13");
        let rendered = format!("{:?}", render(&diag, &source));
        assert!(rendered.contains("wrap the URL in quotes"), "{rendered}");
        assert!(rendered.contains("line 1"), "{rendered}");
    }

    #[test]
    fn named_sources_keep_their_name() {
        let source = SourceFile::named("SELECT 1", "scrape.webql");
        assert_eq!(source.name(), Some("scrape.webql"));
        assert_eq!(SourceFile::new("SELECT 1").name(), None);
    }
}
