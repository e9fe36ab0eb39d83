use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters are invalid: {0}")]
    InvalidParameters(String),

    #[error("At least {required} returns are needed, {actual} given")]
    InsufficientReturns { required: usize, actual: usize },

    #[error("A calculation error occurred: {0}")]
    Calculation(String),
}
