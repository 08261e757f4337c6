use thiserror::Error;

use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::token::Span;

/// Every way lowering can reject a program. The first error aborts the unit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranspileError {
    #[error("Missing type annotation for {what}")]
    MissingAnnotation { what: String },
    #[error("Class '{class}' uses multiple inheritance: {reason}")]
    MultipleInheritance { class: String, reason: String },
    #[error("Unsupported type annotation '{annotation}'")]
    UnsupportedAnnotation { annotation: String },
    #[error("Unsupported statement: {kind}")]
    UnsupportedStatement { kind: String },
    #[error("Unsupported expression: {kind}")]
    UnsupportedExpression { kind: String },
    #[error("Class '{class}' derives from unknown base type '{base}'")]
    UnknownBaseType { class: String, base: String },
    #[error("Name '{name}' is only bound inside a branch; declare it before the branch")]
    ConditionalBinding { name: String },
    #[error("line {line}, column {column}: {error}")]
    Located {
        line: usize,
        column: usize,
        error: Box<TranspileError>,
    },
}

impl TranspileError {
    pub fn missing_annotation(what: impl Into<String>) -> Self {
        Self::MissingAnnotation { what: what.into() }
    }

    pub fn unsupported_statement(kind: impl Into<String>) -> Self {
        Self::UnsupportedStatement { kind: kind.into() }
    }

    pub fn unsupported_expression(kind: impl Into<String>) -> Self {
        Self::UnsupportedExpression { kind: kind.into() }
    }

    pub fn unsupported_annotation(annotation: impl Into<String>) -> Self {
        Self::UnsupportedAnnotation {
            annotation: annotation.into(),
        }
    }

    /// Attaches a source position; the innermost position wins.
    pub fn at(self, span: Span) -> Self {
        match self {
            Self::Located { .. } => self,
            error => Self::Located {
                line: span.line,
                column: span.column,
                error: Box::new(error),
            },
        }
    }

    /// Stable snake-case name of the underlying variant.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Self::MissingAnnotation { .. } => "missing_annotation",
            Self::MultipleInheritance { .. } => "multiple_inheritance",
            Self::UnsupportedAnnotation { .. } => "unsupported_annotation",
            Self::UnsupportedStatement { .. } => "unsupported_statement",
            Self::UnsupportedExpression { .. } => "unsupported_expression",
            Self::UnknownBaseType { .. } => "unknown_base_type",
            Self::ConditionalBinding { .. } => "conditional_binding",
            Self::Located { .. } => "located",
        }
    }

    /// The underlying error without its position.
    pub fn root(&self) -> &TranspileError {
        match self {
            Self::Located { error, .. } => error.root(),
            error => error,
        }
    }
}

pub type TranspileResult<T> = Result<T, TranspileError>;

/// Failure of any stage between source text and emitted code.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Transpile(#[from] TranspileError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_keeps_innermost_position() {
        let error = TranspileError::unsupported_expression("list comprehension")
            .at(Span {
                line: 4,
                column: 8,
                ..Span::default()
            })
            .at(Span {
                line: 1,
                column: 0,
                ..Span::default()
            });
        assert_eq!(error.to_string(), "line 4, column 8: Unsupported expression: list comprehension");
        assert_eq!(
            error.root(),
            &TranspileError::UnsupportedExpression {
                kind: "list comprehension".to_string()
            }
        );
        assert_eq!(error.kind(), "unsupported_expression");
    }
}
