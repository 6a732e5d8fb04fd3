use thiserror::Error;

/// Errors raised by the zonation engine.
///
/// Missing values inside a batch are not errors; they flow through as
/// no-data predictions.
#[derive(Debug, Error)]
pub enum ZonationError {
    /// Degenerate, empty or dimension-mismatched input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough usable samples after removing missing values.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Predictor names or order differ from the schema the model was built on.
    #[error("schema mismatch: expected [{}], found [{}]", .expected.join(", "), .found.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("model serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ZonationError>;

pub(crate) fn invalid(msg: impl Into<String>) -> ZonationError {
    ZonationError::InvalidInput(msg.into())
}

pub(crate) fn insufficient(msg: impl Into<String>) -> ZonationError {
    ZonationError::InsufficientData(msg.into())
}
