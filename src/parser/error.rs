use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("Expected {expected}, got {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Cannot assign to {target} at line {line}, column {column}")]
    InvalidAssignmentTarget {
        target: &'static str,
        line: usize,
        column: usize,
    },
    #[error("Invalid f-string at line {line}: {message}")]
    InvalidFString { message: String, line: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;
