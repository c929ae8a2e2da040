//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula parsing or evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Formula text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// An operand had the wrong type (e.g. arithmetic on text)
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A name did not resolve to a range
    #[error("Name not found: {0}")]
    NameNotFound(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ParameterMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Reference to an invalid cell
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Any other evaluation failure
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl FormulaError {
    /// Shorthand for a type mismatch
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        FormulaError::TypeMismatch(msg.into())
    }
}

impl From<FormulaError> for sheetflow_core::Error {
    fn from(err: FormulaError) -> Self {
        match err {
            FormulaError::Parse(msg) => sheetflow_core::Error::FormulaParse(msg),
            other => sheetflow_core::Error::Evaluation(other.to_string()),
        }
    }
}
