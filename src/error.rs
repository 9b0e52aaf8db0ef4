//! Error types for the data wizard

use thiserror::Error;

/// Result type alias for data wizard operations
pub type Result<T> = std::result::Result<T, WizardError>;

/// Main error type.
///
/// Every documented edge case of ingestion, the transformation pipeline,
/// the session state machine and the adapters has its own variant, so
/// callers can render a precise message instead of an opaque library error.
#[derive(Error, Debug)]
pub enum WizardError {
    #[error("Unsupported file format: '{0}' (expected csv, xlsx, xls, json or parquet)")]
    UnsupportedFormat(String),

    #[error("Could not decode {format} data: {message}")]
    DecodeFailure { format: String, message: String },

    #[error("Cannot {action} yet: {required} first")]
    StagePrecondition { action: String, required: String },

    #[error("Cannot compute {statistic} of column '{column}': it has no usable values")]
    DegenerateStatistic { column: String, statistic: String },

    #[error("Column '{column}' referenced by the {stage} stage no longer exists")]
    StaleColumnReference { column: String, stage: String },

    #[error("Column '{0}' is not numeric; encode or drop it first")]
    NonNumericColumn(String),

    #[error("Column '{0}' is not categorical")]
    NonCategoricalColumn(String),

    #[error("Encoding would create column '{0}', which already exists")]
    ColumnCollision(String),

    #[error("Column '{column}' contains {count} missing values")]
    NullValues { column: String, count: usize },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl WizardError {
    /// Shorthand for a stage-gating failure
    pub fn precondition(action: impl Into<String>, required: impl Into<String>) -> Self {
        WizardError::StagePrecondition {
            action: action.into(),
            required: required.into(),
        }
    }

    /// Whether the error was caused by the caller's input or selections
    /// rather than by an internal fault.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            WizardError::TrainingError(_) | WizardError::IoError(_) | WizardError::SerializationError(_)
        )
    }
}

impl From<polars::error::PolarsError> for WizardError {
    fn from(err: polars::error::PolarsError) -> Self {
        WizardError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for WizardError {
    fn from(err: serde_json::Error) -> Self {
        WizardError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for WizardError {
    fn from(err: ndarray::ShapeError) -> Self {
        WizardError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
