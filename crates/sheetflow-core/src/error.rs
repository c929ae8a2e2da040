//! Error types for sheetflow

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised synchronously to callers of the mutating APIs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Invalid cell address format
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Invalid cell range format
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// Row index out of bounds
    #[error("Row index {0} out of bounds (max: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column index out of bounds
    #[error("Column index {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u16, u16),

    /// Sheet not found by name or id
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Invalid sheet name
    #[error("Invalid sheet name: {0}")]
    InvalidSheetName(String),

    /// Duplicate sheet name
    #[error("Sheet name already exists: {0}")]
    DuplicateSheetName(String),

    /// Invalid named range
    #[error("Invalid named range: {0}")]
    InvalidName(String),

    /// Merged cell conflict
    #[error("Range {0} conflicts with a merged region")]
    MergedCellConflict(String),

    /// A formula references its own cell
    #[error("Circular reference detected involving cell {0}")]
    CircularReference(String),

    /// A reference points outside the sheet extents
    #[error("Reference {0} is outside the sheet extents")]
    ReferenceOutOfRange(String),

    /// Formula parse error
    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    /// Formula evaluation failed
    #[error("Formula evaluation error: {0}")]
    Evaluation(String),

    /// Source and target ranges cannot be auto-filled
    #[error("Invalid auto fill range: {0}")]
    InvalidFillRange(String),

    /// A cancellable hook vetoed the operation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Whether this error is a circular-reference rejection
    pub fn is_circular_reference(&self) -> bool {
        matches!(self, Error::CircularReference(_))
    }
}
