use thiserror::Error;

use crate::token::Span;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}'")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("Invalid integer literal '{literal}'")]
    InvalidIntegerLiteral { literal: String, span: Span },
    #[error("Unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("Unknown escape sequence '\\{character}'")]
    InvalidEscape { character: char, span: Span },
    #[error("Unterminated comment")]
    UnterminatedComment { span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::InvalidIntegerLiteral { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::InvalidEscape { span, .. }
            | LexError::UnterminatedComment { span } => *span,
        }
    }
}

pub type LexResult<T> = Result<T, LexError>;
