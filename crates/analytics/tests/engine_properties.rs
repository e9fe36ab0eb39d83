//! End-to-end properties of the analytics engine.

use analytics::{AnalysisRequest, AnalyticsEngine, AnomalyInput, BatchOutcome, BatchRequest};
use chrono::{Duration, TimeZone, Utc};
use configuration::{
    AnomalyOptions, ClusteringOptions, CorrelationOptions, EngineConfig, ForecastOptions,
    PatternOptions, VolatilityOptions,
};
use core_types::{
    ClusteringAlgorithm, CorrelationMethod, PatternType, Severity, TimeSeries, VolatilityModel,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;

// ---===[ Helpers ]===---

fn create_engine() -> AnalyticsEngine {
    let mut config = EngineConfig::default();
    config.engine.worker_threads = Some(2);
    AnalyticsEngine::new(config).unwrap()
}

fn create_uncached_engine() -> AnalyticsEngine {
    let mut config = EngineConfig::default();
    config.engine.worker_threads = Some(2);
    config.engine.cache.enabled = false;
    AnalyticsEngine::new(config).unwrap()
}

/// A rating history: slow drift plus bounded noise.
fn create_rating_history(rng: &mut ChaCha8Rng, n: usize) -> TimeSeries {
    TimeSeries::new(
        (0..n)
            .map(|i| 1500.0 + 0.8 * i as f64 + rng.gen_range(-15.0..15.0))
            .collect(),
    )
}

fn create_blobs(rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let centers = [[1200.0, 5.0], [1600.0, 40.0], [2100.0, 15.0]];
    centers
        .iter()
        .flat_map(|c| {
            (0..15)
                .map(|_| vec![c[0] + rng.gen_range(-20.0..20.0), c[1] + rng.gen_range(-2.0..2.0)])
                .collect::<Vec<_>>()
        })
        .collect()
}

// ---===[ Forecasting ]===---

#[test]
fn test_forecast_bounds_contain_point_and_widen() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let series = create_rating_history(&mut rng, 80);
    let result = create_engine()
        .forecast(&series, &ForecastOptions::default())
        .unwrap();

    for forecast in result.members.iter().chain(std::iter::once(&result.combined)) {
        let mut previous_width = 0.0;
        for i in 0..forecast.point_forecast.len() {
            assert!(forecast.lower_bound[i] <= forecast.point_forecast[i]);
            assert!(forecast.point_forecast[i] <= forecast.upper_bound[i]);
            let width = forecast.upper_bound[i] - forecast.lower_bound[i];
            assert!(width >= previous_width - 1e-9);
            previous_width = width;
        }
    }

    let total: f64 = result.weights.values().sum();
    assert!((total - 1.0).abs() < 1e-6);
    assert!(result.weights.values().all(|w| *w >= 0.0));
}

#[test]
fn test_linear_trend_scenario() {
    let engine = create_engine();
    let series = TimeSeries::new((0..24).map(|i| 1500.0 + i as f64).collect());

    let result = engine
        .forecast(
            &series,
            &ForecastOptions {
                horizon: 6,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.combined.point_forecast.len(), 6);
    for (h, value) in result.combined.point_forecast.iter().enumerate() {
        let truth = 1524.0 + h as f64;
        assert!((value - truth).abs() / truth < 0.01, "step {}: {} vs {}", h, value, truth);
    }

    let patterns = engine.detect_patterns(&series, &PatternOptions::default()).unwrap();
    assert!(patterns.is_empty());
}

#[test]
fn test_daily_timestamps_classify_weekly_cycle() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let series = TimeSeries::with_timestamps(
        (0..70)
            .map(|i| 1500.0 + 25.0 * (TAU * i as f64 / 7.0).sin())
            .collect(),
        (0..70).map(|i| start + Duration::days(i)).collect(),
    );
    let patterns = create_engine()
        .detect_patterns(&series, &PatternOptions::default())
        .unwrap();
    let strongest = patterns.first().unwrap();
    assert_eq!(strongest.pattern_type, PatternType::Weekly);
    assert!((strongest.period - 7.0).abs() < 0.5);
}

// ---===[ Constant input ]===---

#[test]
fn test_constant_series_is_calm() {
    let engine = create_engine();
    let series = TimeSeries::new(vec![1500.0; 40]);

    for model in [VolatilityModel::Ewma, VolatilityModel::Historical, VolatilityModel::Garch] {
        let estimate = engine
            .analyze_volatility(
                &series,
                &VolatilityOptions {
                    model,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(estimate.series.len(), 40);
        assert!(estimate.series.iter().all(|v| *v < 1e-5), "{:?}", model);
    }

    let records = engine
        .detect_anomalies(
            &AnomalyInput::Series(series),
            &AnomalyOptions {
                seed: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(records.is_empty());
}

// ---===[ Correlation ]===---

#[test]
fn test_independent_series_are_uncorrelated() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let a = TimeSeries::new((0..1000).map(|_| rng.gen_range(-1.0..1.0)).collect());
    let b = TimeSeries::new((0..1000).map(|_| rng.gen_range(-1.0..1.0)).collect());
    let matrix = create_engine()
        .analyze_correlations(&[a, b], &CorrelationOptions::default())
        .unwrap();

    assert!(matrix.matrix[0][1].abs() < 0.15);
    for i in 0..2 {
        assert!((matrix.matrix[i][i] - 1.0).abs() < 1e-12);
        for j in 0..2 {
            assert_eq!(matrix.matrix[i][j], matrix.matrix[j][i]);
        }
    }
}

#[test]
fn test_anti_correlated_series() {
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let a = create_rating_history(&mut rng, 60);
    let b = TimeSeries::new(a.values.iter().map(|v| -v).collect());
    let engine = create_engine();

    for method in [CorrelationMethod::Pearson, CorrelationMethod::Spearman] {
        let matrix = engine
            .analyze_correlations(
                &[a.clone(), b.clone()],
                &CorrelationOptions {
                    method,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!((matrix.matrix[0][1] + 1.0).abs() < 1e-9);
        assert!(matrix.p_values[0][1] < 1e-6);
    }
}

// ---===[ Clustering and anomalies ]===---

#[test]
fn test_cluster_labels_are_bounded_and_reproducible() {
    let mut rng = ChaCha8Rng::seed_from_u64(21);
    let features = create_blobs(&mut rng);
    let engine = create_uncached_engine();

    for algorithm in [
        ClusteringAlgorithm::KMeans,
        ClusteringAlgorithm::Hierarchical,
        ClusteringAlgorithm::Density,
        ClusteringAlgorithm::Distribution,
    ] {
        let options = ClusteringOptions {
            algorithm,
            seed: Some(99),
            ..Default::default()
        };
        let first = engine.cluster(&features, &options).unwrap();
        let second = engine.cluster(&features, &options).unwrap();
        assert!(first.labels.iter().all(|l| *l < first.k), "{:?}", algorithm);
        assert_eq!(first.labels.len(), features.len());
        assert_eq!(first.labels, second.labels, "{:?}", algorithm);
    }
}

#[test]
fn test_injected_spike_is_high_severity() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut series = create_rating_history(&mut rng, 90);
    let mut sorted = series.values.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let iqr = sorted[67] - sorted[22];
    series.values[45] += 10.0 * iqr;

    let records = create_engine()
        .detect_anomalies(
            &AnomalyInput::Series(series),
            &AnomalyOptions {
                seed: Some(8),
                ..Default::default()
            },
        )
        .unwrap();
    let spike = records.iter().find(|r| r.index == 45).unwrap();
    assert!(spike.severity >= Severity::High);
}

// ---===[ Idempotence and batches ]===---

#[test]
fn test_seeded_analyses_are_byte_identical() {
    let mut rng = ChaCha8Rng::seed_from_u64(31);
    let series = create_rating_history(&mut rng, 70);
    let features = create_blobs(&mut rng);
    let engine = create_uncached_engine();

    let requests = vec![
        AnalysisRequest::Forecast {
            series: series.clone(),
            options: None,
        },
        AnalysisRequest::Volatility {
            series: series.clone(),
            options: Some(VolatilityOptions {
                model: VolatilityModel::Garch,
                regimes: true,
                ..Default::default()
            }),
        },
        AnalysisRequest::Clustering {
            features,
            options: Some(ClusteringOptions {
                seed: Some(4),
                ..Default::default()
            }),
        },
        AnalysisRequest::Anomaly {
            input: AnomalyInput::Series(series),
            options: Some(AnomalyOptions {
                seed: Some(4),
                ..Default::default()
            }),
        },
    ];
    for request in &requests {
        let first = serde_json::to_string(&engine.analyze(request).unwrap()).unwrap();
        let second = serde_json::to_string(&engine.analyze(request).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_batch_isolates_failures() {
    let mut rng = ChaCha8Rng::seed_from_u64(41);
    let engine = create_engine();
    let good = create_rating_history(&mut rng, 60);

    let requests = vec![
        BatchRequest {
            id: "player-1".to_string(),
            request: AnalysisRequest::Patterns {
                series: good.clone(),
                options: None,
            },
        },
        BatchRequest {
            id: "player-2".to_string(),
            request: AnalysisRequest::Forecast {
                series: TimeSeries::new(vec![1500.0, f64::NAN, 1510.0, 1520.0]),
                options: None,
            },
        },
        BatchRequest {
            id: "player-3".to_string(),
            request: AnalysisRequest::Clustering {
                features: vec![vec![1.0], vec![2.0], vec![3.0]],
                options: Some(ClusteringOptions {
                    k: Some(5),
                    ..Default::default()
                }),
            },
        },
        BatchRequest {
            id: "player-4".to_string(),
            request: AnalysisRequest::Volatility {
                series: good,
                options: None,
            },
        },
    ];

    let entries = engine.analyze_batch(requests);
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].id, "player-1");
    assert!(entries[0].is_ok());
    assert!(entries[3].is_ok());
    match &entries[1].outcome {
        BatchOutcome::Error { kind, .. } => assert_eq!(kind, "validation"),
        other => panic!("expected a validation marker, got {:?}", other),
    }
    match &entries[2].outcome {
        BatchOutcome::Error { kind, .. } => assert_eq!(kind, "configuration"),
        other => panic!("expected a configuration marker, got {:?}", other),
    }
}
