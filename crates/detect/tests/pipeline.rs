//! End-to-end smoke test: synthetic candle history with injected shocks,
//! trained and scored through the full pipeline.

use vigil_core::types::Candle;
use vigil_detect::classifier::{self, Severity, SeverityConfig};
use vigil_detect::ensemble::Ensemble;
use vigil_detect::threshold::{self, ThresholdConfig};
use vigil_detect::DetectError;
use vigil_features::{build_features, feature_matrix, MinMaxStats};
use vigil_model::{AnomalyModel, ModelError, ModelParams, TrainOptions};

/// Regular sideways market: gentle deterministic price wiggle, steady
/// volume, with a crash candle (price dump + volume surge) injected at
/// `shock_index`.
fn synthetic_candles(n: usize, shock_index: usize) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(n);
    let mut close = 100.0;
    for i in 0..n {
        let wiggle = ((i as f64) * 0.7).sin() * 0.2;
        let mut next_close = close + wiggle;
        let mut volume = 1000.0 + ((i as f64) * 0.3).cos() * 50.0;
        let mut trade_count = 500;

        if i == shock_index {
            next_close = close * 0.85; // 15% dump
            volume *= 12.0;
            trade_count = 5000;
        }

        let high = close.max(next_close) * 1.001;
        let low = close.min(next_close) * 0.999;
        candles.push(Candle {
            timestamp: 1_700_000_000_000 + i as i64 * 60_000,
            open: close,
            high,
            low,
            close: next_close,
            volume,
            trade_count,
        });
        close = next_close;
    }
    candles
}

struct Prepared {
    train: Vec<Vec<f64>>,
    val: Vec<Vec<f64>>,
    full: Vec<Vec<f64>>,
}

fn prepare(candles: &[Candle]) -> Prepared {
    let vectors = build_features(candles).unwrap();
    let raw = feature_matrix(&vectors);
    let split = (raw.len() as f64 * 0.8) as usize;
    let stats = MinMaxStats::fit(&raw[..split]).unwrap();
    Prepared {
        train: stats.transform_matrix(&raw[..split]),
        val: stats.transform_matrix(&raw[split..]),
        full: stats.transform_matrix(&raw),
    }
}

fn quick_opts() -> TrainOptions {
    TrainOptions {
        epochs: 40,
        batch_size: 32,
        patience: 40,
        ..TrainOptions::default()
    }
}

#[test]
fn smoke_shock_candle_ranks_on_top() {
    let shock_index = 150;
    let candles = synthetic_candles(200, shock_index);
    let data = prepare(&candles);

    let mut model = AnomalyModel::new(ModelParams::default()).unwrap();
    model.train(&data.train, &data.val, &quick_opts()).unwrap();
    threshold::calibrate(&mut model, &data.train, &ThresholdConfig::default()).unwrap();

    let report =
        classifier::score(&model, &data.full, &SeverityConfig::default(), None).unwrap();

    assert_eq!(report.total_samples, 200);
    assert_eq!(report.anomalies.len(), 200);
    assert_eq!(
        report.severity_counts.normal
            + report.severity_counts.warning
            + report.severity_counts.critical,
        200
    );

    // The crash candle must land among the very top reconstruction errors.
    let top_indices: Vec<usize> = report.anomalies.iter().take(5).map(|r| r.index).collect();
    assert!(
        top_indices.contains(&shock_index),
        "shock at {shock_index} missing from top ranks {top_indices:?}"
    );
    assert_ne!(report.anomalies[0].severity, Severity::Normal);

    // Records carry one contribution per feature, in canonical order.
    let first = &report.anomalies[0];
    assert_eq!(first.contributions.len(), 12);
    assert_eq!(first.contributions[0].feature, "price_change");
}

#[test]
fn smoke_anomaly_rate_matches_counts() {
    let candles = synthetic_candles(150, 100);
    let data = prepare(&candles);

    let mut model = AnomalyModel::new(ModelParams::default()).unwrap();
    model.train(&data.train, &data.val, &quick_opts()).unwrap();
    threshold::calibrate(&mut model, &data.train, &ThresholdConfig::default()).unwrap();

    let report =
        classifier::score(&model, &data.full, &SeverityConfig::default(), None).unwrap();
    let flagged = report.severity_counts.warning + report.severity_counts.critical;
    assert!((report.anomaly_rate - flagged as f64 / 150.0).abs() < 1e-12);
    // The sensitivity-biased threshold always flags something on real data.
    assert!(flagged > 0);
}

#[test]
fn smoke_score_before_calibrate_is_state_error() {
    let candles = synthetic_candles(80, 40);
    let data = prepare(&candles);

    let mut model = AnomalyModel::new(ModelParams::default()).unwrap();
    let opts = TrainOptions {
        epochs: 2,
        ..quick_opts()
    };
    model.train(&data.train, &data.val, &opts).unwrap();

    let err =
        classifier::score(&model, &data.full, &SeverityConfig::default(), None).unwrap_err();
    assert!(matches!(err, ModelError::NotCalibrated));
}

#[test]
fn smoke_metadata_passes_through_by_index() {
    let candles = synthetic_candles(60, 30);
    let data = prepare(&candles);

    let mut model = AnomalyModel::new(ModelParams::default()).unwrap();
    let opts = TrainOptions {
        epochs: 3,
        ..quick_opts()
    };
    model.train(&data.train, &data.val, &opts).unwrap();
    threshold::calibrate(&mut model, &data.train, &ThresholdConfig::default()).unwrap();

    let metadata: Vec<serde_json::Value> = candles
        .iter()
        .map(|c| serde_json::json!({ "timestamp": c.timestamp }))
        .collect();
    let report = classifier::score(
        &model,
        &data.full,
        &SeverityConfig::default(),
        Some(&metadata),
    )
    .unwrap();

    for record in &report.anomalies {
        let ts = record.metadata.as_ref().unwrap()["timestamp"].as_i64().unwrap();
        assert_eq!(ts, candles[record.index].timestamp);
    }
}

#[test]
fn smoke_ensemble_end_to_end() {
    let shock_index = 100;
    let candles = synthetic_candles(140, shock_index);
    let data = prepare(&candles);

    let mut ensemble = Ensemble::with_default_members(&ModelParams::default()).unwrap();
    let opts = TrainOptions {
        epochs: 15,
        batch_size: 32,
        patience: 15,
        ..TrainOptions::default()
    };
    let histories = ensemble.train(&data.train, &data.val, &opts).unwrap();
    assert_eq!(histories.len(), 3);

    let thresholds = ensemble
        .calibrate(&data.train, &ThresholdConfig::default())
        .unwrap();
    assert_eq!(thresholds.len(), 3);
    assert!(thresholds.iter().all(|t| *t > 0.0));

    let report = ensemble
        .score(&data.full, &SeverityConfig::default(), None)
        .unwrap();
    assert_eq!(report.total_samples, 140);
    // Reported threshold is the first member's.
    assert!((report.threshold - thresholds[0]).abs() < 1e-12);

    // Vote bookkeeping: tallies sum to the member count, confidence is a
    // valid share.
    for record in &report.anomalies {
        let votes =
            record.vote.normal_votes + record.vote.warning_votes + record.vote.critical_votes;
        assert_eq!(votes, 3);
        assert!(record.vote.confidence >= 1.0 / 3.0 && record.vote.confidence <= 1.0);
        assert!(record.vote.averaged_error >= 0.0);
    }

    let top_indices: Vec<usize> = report.anomalies.iter().take(5).map(|r| r.index).collect();
    assert!(
        top_indices.contains(&shock_index),
        "shock at {shock_index} missing from ensemble top ranks {top_indices:?}"
    );
}

#[test]
fn smoke_uncalibrated_ensemble_member_is_state_error() {
    let candles = synthetic_candles(60, 30);
    let data = prepare(&candles);

    let mut ensemble = Ensemble::with_default_members(&ModelParams::default()).unwrap();
    let opts = TrainOptions {
        epochs: 2,
        batch_size: 32,
        patience: 5,
        ..TrainOptions::default()
    };
    ensemble.train(&data.train, &data.val, &opts).unwrap();

    let err = ensemble
        .score(&data.full, &SeverityConfig::default(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        DetectError::Model(ModelError::NotCalibrated)
    ));
}
