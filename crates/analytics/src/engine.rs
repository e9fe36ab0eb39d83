use crate::anomaly::{AnomalyDetector, AnomalyInput};
use crate::cache::{CacheKey, CacheStats, ResultCache};
use crate::clustering::ClusteringAnalyzer;
use crate::correlation::CorrelationAnalyzer;
use crate::error::AnalyticsError;
use crate::forecast::ForecastEngine;
use crate::patterns::PatternDetector;
use crate::report::{AnalysisReport, AnalysisRequest, BatchEntry, BatchOutcome, BatchRequest};
use crate::volatility::VolatilityAnalyzer;
use configuration::{
    AnomalyOptions, ClusteringOptions, CorrelationOptions, EngineConfig, ForecastOptions,
    PatternOptions, VolatilityOptions,
};
use core_types::{
    AnomalyRecord, ClusterAssignment, CorrelationMatrix, EnsembleForecast, Pattern, TimeSeries,
    VolatilityEstimate,
};
use rayon::prelude::*;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// The entry point to every analyzer.
///
/// Holds the default options, the worker pool batches fan out over, and the
/// optional result cache. Each call builds a fresh analyzer, so calls never
/// share mutable state beyond the cache.
#[derive(Debug)]
pub struct AnalyticsEngine {
    config: EngineConfig,
    cache: Option<Arc<ResultCache>>,
    pool: rayon::ThreadPool,
}

impl AnalyticsEngine {
    pub fn new(config: EngineConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("analytics-worker-{}", i));
        if let Some(threads) = config.engine.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| AnalyticsError::WorkerPool(e.to_string()))?;
        let cache = config
            .engine
            .cache
            .enabled
            .then(|| Arc::new(ResultCache::new(&config.engine.cache)));
        debug!(
            workers = pool.current_num_threads(),
            cache = cache.is_some(),
            "analytics engine ready"
        );
        Ok(Self { config, cache, pool })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Looks up `key` in the cache, or computes and stores the result.
    ///
    /// `key` is `None` when the result must not be cached.
    fn cached<T, F>(&self, key: impl FnOnce() -> Option<u64>, compute: F) -> Result<T, AnalyticsError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, AnalyticsError>,
    {
        let Some(cache) = &self.cache else {
            return compute();
        };
        let Some(key) = key() else {
            return compute();
        };
        if let Some(hit) = cache.get::<T>(key) {
            return Ok(hit);
        }
        let value = compute()?;
        cache.insert(key, value.clone());
        Ok(value)
    }

    fn options_key<O: Serialize>(key: CacheKey, options: &O) -> Option<u64> {
        match key.options(options) {
            Ok(k) => Some(k.finish()),
            Err(e) => {
                warn!(error = %e, "options could not be hashed; result will not be cached");
                None
            }
        }
    }

    // ---===[ Single analyses ]===---

    pub fn forecast(&self, series: &TimeSeries, options: &ForecastOptions) -> Result<EnsembleForecast, AnalyticsError> {
        let engine = ForecastEngine::new(options.clone())?;
        self.cached(
            || Self::options_key(CacheKey::new("forecast").series(series), options),
            || engine.forecast(series),
        )
    }

    pub fn detect_patterns(&self, series: &TimeSeries, options: &PatternOptions) -> Result<Vec<Pattern>, AnalyticsError> {
        let detector = PatternDetector::new(options.clone())?;
        self.cached(
            || Self::options_key(CacheKey::new("patterns").series(series), options),
            || detector.detect(series),
        )
    }

    pub fn analyze_volatility(
        &self,
        series: &TimeSeries,
        options: &VolatilityOptions,
    ) -> Result<VolatilityEstimate, AnalyticsError> {
        let analyzer = VolatilityAnalyzer::new(options.clone())?;
        self.cached(
            || Self::options_key(CacheKey::new("volatility").series(series), options),
            || analyzer.analyze(series),
        )
    }

    pub fn analyze_correlations(
        &self,
        series: &[TimeSeries],
        options: &CorrelationOptions,
    ) -> Result<CorrelationMatrix, AnalyticsError> {
        let analyzer = CorrelationAnalyzer::new(options.clone())?;
        self.cached(
            || {
                let key = series
                    .iter()
                    .fold(CacheKey::new("correlation").values(&[series.len() as f64]), |k, s| k.series(s));
                Self::options_key(key, options)
            },
            || analyzer.analyze(series),
        )
    }

    pub fn cluster(&self, features: &[Vec<f64>], options: &ClusteringOptions) -> Result<ClusterAssignment, AnalyticsError> {
        let analyzer = ClusteringAnalyzer::new(options.clone())?;
        self.cached(
            || {
                analyzer
                    .is_deterministic()
                    .then(|| Self::options_key(CacheKey::new("clustering").rows(features), options))
                    .flatten()
            },
            || analyzer.cluster(features),
        )
    }

    pub fn detect_anomalies(
        &self,
        input: &AnomalyInput,
        options: &AnomalyOptions,
    ) -> Result<Vec<AnomalyRecord>, AnalyticsError> {
        let detector = AnomalyDetector::new(options.clone())?;
        self.cached(
            || {
                if !detector.is_deterministic() {
                    return None;
                }
                let key = match input {
                    AnomalyInput::Series(s) => CacheKey::new("anomaly_series").series(s),
                    AnomalyInput::Features(rows) => CacheKey::new("anomaly_features").rows(rows),
                };
                Self::options_key(key, options)
            },
            || detector.detect(input),
        )
    }

    // ---===[ Requests and batches ]===---

    /// Runs one request, filling missing options from the engine configuration.
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, AnalyticsError> {
        let config = &self.config;
        match request {
            AnalysisRequest::Forecast { series, options } => {
                let options = options.as_ref().unwrap_or(&config.forecast);
                self.forecast(series, options).map(AnalysisReport::from_forecast)
            }
            AnalysisRequest::Patterns { series, options } => {
                let options = options.as_ref().unwrap_or(&config.patterns);
                self.detect_patterns(series, options).map(AnalysisReport::from_patterns)
            }
            AnalysisRequest::Volatility { series, options } => {
                let options = options.as_ref().unwrap_or(&config.volatility);
                self.analyze_volatility(series, options).map(AnalysisReport::from_volatility)
            }
            AnalysisRequest::Correlation { series, options } => {
                let options = options.as_ref().unwrap_or(&config.correlation);
                self.analyze_correlations(series, options)
                    .map(|m| AnalysisReport::from_correlation(m, options.significance))
            }
            AnalysisRequest::Clustering { features, options } => {
                let options = options.as_ref().unwrap_or(&config.clustering);
                self.cluster(features, options).map(AnalysisReport::from_clustering)
            }
            AnalysisRequest::Anomaly { input, options } => {
                let options = options.as_ref().unwrap_or(&config.anomaly);
                self.detect_anomalies(input, options)
                    .map(|records| AnalysisReport::from_anomalies(records, input.len()))
            }
        }
    }

    /// Runs independent requests on the worker pool.
    ///
    /// The result has one entry per request, in request order. A failing
    /// request yields an error entry and never affects the others.
    pub fn analyze_batch(&self, requests: Vec<BatchRequest>) -> Vec<BatchEntry> {
        let entries: Vec<BatchEntry> = self.pool.install(|| {
            requests
                .into_par_iter()
                .map(|BatchRequest { id, request }| {
                    let outcome = match run_isolated(|| self.analyze(&request)) {
                        Ok(report) => BatchOutcome::Ok { report },
                        Err(e) => {
                            warn!(id = %id, kind = e.kind(), error = %e, "batch entry failed");
                            BatchOutcome::Error {
                                kind: e.kind().to_string(),
                                message: e.to_string(),
                            }
                        }
                    };
                    BatchEntry { id, outcome }
                })
                .collect()
        });
        debug!(
            total = entries.len(),
            failed = entries.iter().filter(|e| !e.is_ok()).count(),
            "batch finished"
        );
        entries
    }
}

/// Runs one batch entry, turning a panic into a worker-pool error so it
/// cannot take the rest of the batch down.
fn run_isolated<T>(f: impl FnOnce() -> Result<T, AnalyticsError>) -> Result<T, AnalyticsError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(AnalyticsError::WorkerPool(format!("analysis panicked: {}", message)))
    })
}
