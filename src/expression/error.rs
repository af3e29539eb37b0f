//! Error types for evaluating compiled expressions.

use thiserror::Error;

/// Errors raised while a compiled closure runs against an element
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Member access or call on a null receiver
    #[error("Null reference while evaluating {context}")]
    NullReference { context: String },

    /// Integer division or remainder by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// First/Last/Min/Max/Average on an empty sequence
    #[error("Sequence contains no elements")]
    EmptySequence,

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// String could not be parsed into the requested type
    #[error("Cannot convert '{value}' to {target}")]
    InvalidFormat { value: String, target: String },

    #[error("Invalid cast from {from} to {target}")]
    InvalidCast { from: String, target: String },

    /// Value shape disagrees with the bound type
    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        context: String,
    },

    /// Failure reported by a native method or parameter source
    #[error("Expression evaluation error: {message}")]
    EvaluationError { message: String },
}

impl EvalError {
    pub fn null_reference(context: impl Into<String>) -> Self {
        EvalError::NullReference {
            context: context.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        EvalError::EvaluationError {
            message: message.into(),
        }
    }
}

/// Result type for expression evaluation
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(EvalError::DivisionByZero.to_string(), "Division by zero");
        assert_eq!(
            EvalError::EmptySequence.to_string(),
            "Sequence contains no elements"
        );
        assert_eq!(
            EvalError::null_reference("member 'Profile.Age'").to_string(),
            "Null reference while evaluating member 'Profile.Age'"
        );
        assert_eq!(
            EvalError::IndexOutOfRange { index: 5, len: 3 }.to_string(),
            "Index 5 out of range for length 3"
        );
        assert_eq!(
            EvalError::InvalidFormat {
                value: "abc".to_string(),
                target: "Guid".to_string(),
            }
            .to_string(),
            "Cannot convert 'abc' to Guid"
        );
        assert_eq!(
            EvalError::evaluation("boom").to_string(),
            "Expression evaluation error: boom"
        );
    }
}
