use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod options;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use options::{
    AnomalyOptions, ClusteringOptions, CorrelationOptions, ForecastOptions, PatternOptions,
    VolatilityOptions,
};
pub use settings::{CacheSettings, EngineConfig, EngineSettings};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "analytics.toml";

/// Environment variables with this prefix override file values,
/// e.g. `ANALYTICS__ENGINE__CACHE__CAPACITY=64`.
pub const ENV_PREFIX: &str = "ANALYTICS";

/// Loads the engine configuration.
///
/// Layers the TOML file at `path` (or `analytics.toml` when `None`; the file is
/// optional in that case) under `ANALYTICS__*` environment variables, then
/// deserializes into `EngineConfig` and validates it. Missing sections take
/// their defaults.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let file = match path {
        Some(p) => config::File::with_name(p).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let builder = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config = builder.try_deserialize::<EngineConfig>()?;
    config.validate()?;

    tracing::debug!(
        cache_enabled = config.engine.cache.enabled,
        worker_threads = ?config.engine.worker_threads,
        "Configuration loaded"
    );
    Ok(config)
}

/// Parses an in-memory TOML document the same way `load_config` parses a file.
pub fn parse_config(toml: &str) -> Result<EngineConfig, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<EngineConfig>()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::enums::{ClusteringAlgorithm, ForecastModel, VolatilityModel};
    use std::time::Duration;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let toml = r#"
            [engine]
            worker_threads = 2

            [engine.cache]
            capacity = 32
            ttl = "90s"

            [forecast]
            models = ["arima", "holt_winters"]
            horizon = 12

            [volatility]
            model = "garch"

            [clustering]
            algorithm = "hierarchical"
            k = 3
        "#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.engine.worker_threads, Some(2));
        assert_eq!(config.engine.cache.capacity, 32);
        assert_eq!(config.engine.cache.ttl, Duration::from_secs(90));
        assert!(config.engine.cache.enabled);
        assert_eq!(
            config.forecast.models,
            vec![ForecastModel::Arima, ForecastModel::HoltWinters]
        );
        assert_eq!(config.forecast.horizon, 12);
        assert!((config.forecast.holdout_ratio - 0.2).abs() < 1e-12);
        assert_eq!(config.volatility.model, VolatilityModel::Garch);
        assert_eq!(config.clustering.algorithm, ClusteringAlgorithm::Hierarchical);
        assert_eq!(config.clustering.k, Some(3));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let toml = r#"
            [anomaly]
            contamination = 0.9
        "#;
        assert!(matches!(parse_config(toml), Err(ConfigError::ValidationError(_))));

        let toml = r#"
            [engine]
            worker_threads = 0
        "#;
        assert!(parse_config(toml).is_err());
    }

    #[test]
    fn test_unknown_method_name_is_a_load_error() {
        let toml = r#"
            [volatility]
            model = "stochastic"
        "#;
        assert!(matches!(parse_config(toml), Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some("definitely/not/here.toml")).is_err());
    }
}
