use configuration::error::ConfigError;
use core_types::ValidationError;
use risk::RiskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not enough data to perform calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Risk calculation failed: {0}")]
    Risk(#[from] RiskError),

    #[error("Error in calculation: {0}")]
    Calculation(String),

    #[error("Worker pool could not be started: {0}")]
    WorkerPool(String),
}

impl AnalyticsError {
    /// Builds a configuration error for an option that conflicts with the input.
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        AnalyticsError::Configuration(ConfigError::ValidationError(msg.into()))
    }

    /// A stable, machine-readable tag used in batch error markers.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyticsError::Validation(_) => "validation",
            AnalyticsError::InsufficientData(_) => "insufficient_data",
            AnalyticsError::Configuration(_) => "configuration",
            AnalyticsError::Risk(_) => "risk",
            AnalyticsError::Calculation(_) => "calculation",
            AnalyticsError::WorkerPool(_) => "internal",
        }
    }
}
