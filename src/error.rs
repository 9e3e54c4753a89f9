use crate::diagnostic::Diagnostic;
use crate::span::Span;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a compile or run invocation can fail. All variants are fatal to
/// the current invocation; the caller maps them to presentation and exit code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("syntax error: {message}")]
    Syntax { message: String, span: Span },

    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String, span: Span },

    #[error("undefined function '{name}'")]
    UndefinedFunction { name: String, span: Option<Span> },

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Error::Syntax {
            message: message.into(),
            span,
        }
    }

    /// The source span this error points at, if it has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Syntax { span, .. } | Error::UndefinedVariable { span, .. } => Some(*span),
            Error::UndefinedFunction { span, .. } => *span,
            Error::Verification(_) | Error::Runtime(_) | Error::Io(_) => None,
        }
    }

    /// Bridge into the ariadne-rendered diagnostic machinery. Errors without
    /// a span get a dummy span pointing at the start of the file.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let span = self.span().unwrap_or_else(Span::dummy);
        match self {
            Error::UndefinedVariable { .. } => Diagnostic::error(self.to_string(), span)
                .with_help("variables come from enclosing function parameters".to_string()),
            Error::UndefinedFunction { .. } => Diagnostic::error(self.to_string(), span)
                .with_help("define the function with (defun name (params...) body...)".to_string()),
            _ => Diagnostic::error(self.to_string(), span),
        }
    }
}
