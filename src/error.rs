//! Compile-time error types.

use thiserror::Error;

/// Errors raised while turning expression text into tokens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedCharacter { ch: char, offset: usize },

    #[error("Unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("Invalid numeric literal '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("Expected digits after '@' at offset {offset}")]
    InvalidPlaceholder { offset: usize },
}

impl LexError {
    pub fn offset(&self) -> usize {
        match self {
            LexError::UnexpectedCharacter { offset, .. }
            | LexError::UnterminatedString { offset }
            | LexError::InvalidNumber { offset, .. }
            | LexError::InvalidPlaceholder { offset } => *offset,
        }
    }
}

/// Grammar and binding errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected {expected} at offset {offset}, found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("Unknown identifier '{name}' at offset {offset}")]
    UnknownIdentifier { name: String, offset: usize },

    #[error("No property or field '{member}' exists in type '{type_name}' (offset {offset})")]
    UnknownMember {
        member: String,
        type_name: String,
        offset: usize,
    },

    #[error("No applicable method '{method}' exists in type '{type_name}' for arguments ({arguments}) (offset {offset})")]
    NoApplicableMethod {
        method: String,
        type_name: String,
        arguments: String,
        offset: usize,
    },

    #[error("Ambiguous invocation of method '{method}' in type '{type_name}'; candidates: {candidates} (offset {offset})")]
    AmbiguousMethod {
        method: String,
        type_name: String,
        candidates: String,
        offset: usize,
    },

    #[error("Operator '{operator}' incompatible with operand types '{left}' and '{right}' (offset {offset})")]
    IncompatibleOperands {
        operator: String,
        left: String,
        right: String,
        offset: usize,
    },

    #[error("Operator '{operator}' incompatible with operand type '{operand}' (offset {offset})")]
    IncompatibleOperand {
        operator: String,
        operand: String,
        offset: usize,
    },

    #[error("Parameter @{index} is out of range; {count} parameter(s) supplied (offset {offset})")]
    PlaceholderOutOfRange {
        index: usize,
        count: usize,
        offset: usize,
    },

    #[error("Context keyword '{keyword}' is disabled; use '{symbol}' instead (offset {offset})")]
    ContextKeywordDisabled {
        keyword: String,
        symbol: char,
        offset: usize,
    },

    #[error("'{keyword}' has no enclosing scope at offset {offset}")]
    NoEnclosingScope { keyword: String, offset: usize },

    #[error("Expression of type '{actual}' expected to be '{expected}' (offset {offset})")]
    TypeMismatch {
        expected: String,
        actual: String,
        offset: usize,
    },

    #[error("Cannot convert '{value}' to type '{target}' (offset {offset})")]
    InvalidConversion {
        value: String,
        target: String,
        offset: usize,
    },

    #[error("Type '{type_name}' has no indexer accepting '{index_type}' (offset {offset})")]
    NoApplicableIndexer {
        type_name: String,
        index_type: String,
        offset: usize,
    },

    #[error("Duplicate member name '{name}' in anonymous type (offset {offset})")]
    DuplicateMemberName { name: String, offset: usize },
}

impl ParseError {
    pub fn offset(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { offset, .. }
            | ParseError::UnknownIdentifier { offset, .. }
            | ParseError::UnknownMember { offset, .. }
            | ParseError::NoApplicableMethod { offset, .. }
            | ParseError::AmbiguousMethod { offset, .. }
            | ParseError::IncompatibleOperands { offset, .. }
            | ParseError::IncompatibleOperand { offset, .. }
            | ParseError::PlaceholderOutOfRange { offset, .. }
            | ParseError::ContextKeywordDisabled { offset, .. }
            | ParseError::NoEnclosingScope { offset, .. }
            | ParseError::TypeMismatch { offset, .. }
            | ParseError::InvalidConversion { offset, .. }
            | ParseError::NoApplicableIndexer { offset, .. }
            | ParseError::DuplicateMemberName { offset, .. } => *offset,
        }
    }
}

/// Any failure of a compile call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CompileError {
    /// Char offset into the expression text where compilation stopped.
    pub fn offset(&self) -> usize {
        match self {
            CompileError::Lex(e) => e.offset(),
            CompileError::Parse(e) => e.offset(),
        }
    }

    pub fn is_lex_error(&self) -> bool {
        matches!(self, CompileError::Lex(_))
    }
}

/// Result type for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
