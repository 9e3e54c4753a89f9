use crate::span::Span;

/// A compiler diagnostic with optional notes and help text.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let start = self.span.start as usize;
        let end = (self.span.end as usize).max(start);

        let mut report = Report::build(ReportKind::Error, filename, start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        let _ = report.finish().eprint((filename, Source::from(source)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error("unexpected token ')'".to_string(), Span::new(10, 11));
        assert_eq!(d.message, "unexpected token ')'");
        assert_eq!(d.span.start, 10);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::error("undefined variable 'y'".to_string(), Span::new(3, 4))
            .with_note("variables must be bound as function parameters".to_string())
            .with_help("did you mean 'x'?".to_string());
        assert_eq!(d.notes.len(), 1);
        assert_eq!(d.help.as_deref(), Some("did you mean 'x'?"));
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "(defun f (x)\n  (+ x y))\n";
        let d = Diagnostic::error("undefined variable 'y'".to_string(), Span::new(20, 21));
        // Renders to stderr; just verify it doesn't panic
        d.render("test.sprig", source);
    }

    #[test]
    fn test_render_point_span_does_not_panic() {
        let source = "(print 1";
        let d = Diagnostic::error("unexpected end of input".to_string(), Span::point(8));
        d.render("test.sprig", source);
    }
}
