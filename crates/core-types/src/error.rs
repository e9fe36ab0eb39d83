use thiserror::Error;

/// Reasons an input fails the validation gate that runs before every analyzer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Series is empty")]
    Empty,

    #[error("Series too short: {required} observations required, {actual} given")]
    TooShort { required: usize, actual: usize },

    #[error("Non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("Series has zero variance")]
    ZeroVariance,

    #[error("Timestamp count ({timestamps}) does not match value count ({values})")]
    TimestampMismatch { values: usize, timestamps: usize },

    #[error("Timestamps are not strictly increasing at index {index}")]
    TimestampsNotIncreasing { index: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}
