use thiserror::Error;

use crate::ast::Expression;
use crate::lexer::LexError;
use crate::token::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Syntax error reported by the lexer or parser.
    Parse,
    /// Semantic error reported while evaluating or lowering a script.
    Evaluation,
}

/// Terminal error node. Once produced it is propagated unchanged to the
/// caller; nothing evaluates past it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at line {}, column {}", .span.line, .span.column)]
pub struct ErrorExpression {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    /// Expression that triggered the error, when there is one to show.
    pub cause: Option<Box<Expression>>,
}

impl ErrorExpression {
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.into(),
            span,
            cause: None,
        }
    }

    pub fn evaluation(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ErrorKind::Evaluation,
            message: message.into(),
            span,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Expression) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl From<LexError> for ErrorExpression {
    fn from(error: LexError) -> Self {
        ErrorExpression::parse(error.to_string(), error.span())
    }
}

pub type EvalResult<T> = Result<T, ErrorExpression>;
