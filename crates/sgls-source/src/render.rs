use annotate_snippets::AnnotationKind;
use annotate_snippets::Level;
use annotate_snippets::Renderer;
use annotate_snippets::Snippet;

use crate::Span;

/// Header word of a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    fn level(self) -> Level<'static> {
        match self {
            Severity::Error => Level::ERROR,
            Severity::Warning => Level::WARNING,
            Severity::Info => Level::INFO,
            Severity::Hint => Level::HELP,
        }
    }
}

/// One problem in one source file, pointed at a single span.
#[derive(Debug, Clone)]
pub struct Report<'a> {
    source: &'a str,
    path: &'a str,
    severity: Severity,
    code: &'a str,
    message: &'a str,
    span: Span,
    label: &'a str,
    notes: Vec<&'a str>,
}

impl<'a> Report<'a> {
    #[must_use]
    pub fn new(
        source: &'a str,
        path: &'a str,
        severity: Severity,
        code: &'a str,
        message: &'a str,
    ) -> Self {
        Self {
            source,
            path,
            severity,
            code,
            message,
            span: Span::default(),
            label: "",
            notes: Vec::new(),
        }
    }

    /// Underline `span`, with `label` printed beside the carets.
    #[must_use]
    pub fn at(mut self, span: Span, label: &'a str) -> Self {
        self.span = span;
        self.label = label;
        self
    }

    #[must_use]
    pub fn note(mut self, note: &'a str) -> Self {
        self.notes.push(note);
        self
    }
}

/// Terminal output for reports: `plain` for pipes and snapshots, `styled`
/// with ANSI colors for a TTY.
#[derive(Debug)]
pub struct DiagnosticRenderer {
    renderer: Renderer,
}

impl DiagnosticRenderer {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            renderer: Renderer::plain(),
        }
    }

    #[must_use]
    pub fn styled() -> Self {
        Self {
            renderer: Renderer::styled(),
        }
    }

    #[must_use]
    pub fn render(&self, report: &Report<'_>) -> String {
        // Spans computed against an older text may run past the end.
        let clamp = |offset: usize| offset.min(report.source.len());
        let range = clamp(report.span.start_usize())..clamp(report.span.end_usize());

        let mut annotation = AnnotationKind::Primary.span(range);
        if !report.label.is_empty() {
            annotation = annotation.label(report.label);
        }
        let snippet = Snippet::source(report.source)
            .path(report.path)
            .line_start(1)
            .annotation(annotation);

        let group = report.notes.iter().fold(
            report
                .severity
                .level()
                .primary_title(report.message)
                .id(report.code)
                .element(snippet),
            |group, note| group.element(Level::NOTE.message(*note)),
        );

        self.renderer.render(&[group])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "{\n  \"Person\": {\n    \"fields\": [\"id\", \"email\"]\n  }\n}\n";

    fn email() -> Span {
        let start = QUERY.find("email").unwrap();
        Span::from_bounds(start, start + "email".len())
    }

    fn unknown_field() -> Report<'static> {
        Report::new(
            QUERY,
            "queries/person.json",
            Severity::Warning,
            "S101",
            "Unknown field 'email' on Person",
        )
        .at(email(), "not a field of Person")
    }

    #[test]
    fn test_header_snippet_and_label() {
        let output = DiagnosticRenderer::plain().render(&unknown_field());

        assert!(output.contains("warning[S101]: Unknown field 'email' on Person"));
        assert!(output.contains("queries/person.json:3:23"), "{output}");
        assert!(output.contains("\"fields\": [\"id\", \"email\"]"));
        assert!(output.contains("^^^^^ not a field of Person"), "{output}");
    }

    #[test]
    fn test_notes_follow_snippet() {
        let report = unknown_field().note("known fields: id, name, status");
        let output = DiagnosticRenderer::plain().render(&report);
        assert!(output.contains("note: known fields: id, name, status"));
    }

    #[test]
    fn test_span_past_end_is_clamped() {
        let report = Report::new("{}", "q.json", Severity::Error, "S100", "Unknown entity")
            .at(Span::new(1, 50), "");
        let output = DiagnosticRenderer::plain().render(&report);
        assert!(output.contains("error[S100]: Unknown entity"));
    }

    #[test]
    fn test_styles() {
        let report = unknown_field();
        assert!(!DiagnosticRenderer::plain().render(&report).contains("\x1b["));
        assert!(DiagnosticRenderer::styled().render(&report).contains("\x1b["));
    }
}
