use crate::error::ConfigError;
use crate::options::{
    AnomalyOptions, ClusteringOptions, CorrelationOptions, ForecastOptions, PatternOptions,
    VolatilityOptions,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The root configuration structure for the analytics engine.
///
/// Each analyzer section holds the defaults applied when a request does not
/// carry its own options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub forecast: ForecastOptions,
    pub patterns: PatternOptions,
    pub volatility: VolatilityOptions,
    pub correlation: CorrelationOptions,
    pub clustering: ClusteringOptions,
    pub anomaly: AnomalyOptions,
}

/// Runtime settings of the engine itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Size of the batch worker pool. Defaults to the number of logical CPUs.
    pub worker_threads: Option<usize>,
    pub cache: CacheSettings,
}

/// Policy of the advisory result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Maximum number of cached results; the oldest entries are evicted first.
    pub capacity: usize,
    /// How long an entry stays valid, e.g. "10m".
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
            ttl: Duration::from_secs(600),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.worker_threads == Some(0) {
            return Err(ConfigError::ValidationError(
                "engine.worker_threads must be greater than 0".to_string(),
            ));
        }
        if self.engine.cache.enabled && self.engine.cache.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "engine.cache.capacity must be greater than 0 when the cache is enabled".to_string(),
            ));
        }
        self.forecast.validate()?;
        self.patterns.validate()?;
        self.volatility.validate()?;
        self.correlation.validate()?;
        self.clustering.validate()?;
        self.anomaly.validate()?;
        Ok(())
    }
}
