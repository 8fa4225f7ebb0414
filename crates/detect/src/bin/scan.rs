//! Scan binary: trains an autoencoder on candle history and ranks anomalies.
//!
//! Pipeline:
//! 1. Load candles from a JSONL or JSONL.gz file and validate ordering
//! 2. Derive the 12-wide feature matrix
//! 3. Temporal train/validation split, min/max stats fitted on the train
//!    split and reused everywhere
//! 4. Train (single model or three-member ensemble), calibrate the
//!    anomaly threshold on the training matrix
//! 5. Score the full history, print the ranked anomaly table
//! 6. Save the model bundle + normalization stats sidecar

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;

use vigil_core::config::AppConfig;
use vigil_core::logging::init_tracing;
use vigil_core::types::{validate_series, Candle};
use vigil_detect::classifier::{self, ScoreReport, Severity, SeverityConfig};
use vigil_detect::ensemble::{Ensemble, EnsembleReport};
use vigil_detect::threshold::{self, ThresholdConfig};
use vigil_features::{build_features, feature_matrix, MinMaxStats};
use vigil_model::{AnomalyModel, ModelParams, TrainOptions};

#[derive(Parser)]
#[command(
    name = "vigil-scan",
    about = "Train an autoencoder on candle history and rank anomalies"
)]
struct Args {
    /// JSONL or JSONL.gz file of candles, strictly timestamp-ordered.
    #[arg(long)]
    data: PathBuf,

    /// Output path for the trained model bundle.
    #[arg(long, default_value = "models/vigil.bundle.json")]
    output: PathBuf,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Score with the three-member ensemble instead of a single model.
    #[arg(long)]
    ensemble: bool,

    /// Number of top-ranked rows to print.
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Emit JSON logs instead of pretty logs.
    #[arg(long)]
    json_logs: bool,
}

/// Load candles from a JSONL file, transparently decompressing `.gz`.
fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader: Box<dyn BufRead> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut candles = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let candle: Candle = serde_json::from_str(&line)
            .with_context(|| format!("parse candle at line {}", lineno + 1))?;
        candles.push(candle);
    }
    Ok(candles)
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Normal => "normal",
        Severity::Warning => "warning",
        Severity::Critical => "CRITICAL",
    }
}

fn format_timestamp(metadata: &Option<serde_json::Value>) -> String {
    metadata
        .as_ref()
        .and_then(|m| m.get("timestamp"))
        .and_then(|t| t.as_i64())
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Top contributions for display, largest first. Ranking happens only
/// here at the presentation edge — the records themselves stay in
/// feature order.
fn top_contributions(
    contributions: &[classifier::FeatureContribution],
    limit: usize,
) -> String {
    let mut ranked: Vec<_> = contributions.iter().collect();
    ranked.sort_by(|a, b| {
        b.contribution
            .partial_cmp(&a.contribution)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
        .iter()
        .take(limit)
        .map(|c| format!("{}={:.3}", c.feature, c.contribution))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_single_report(report: &ScoreReport, top: usize) {
    println!(
        "\nScored {} rows against threshold {:.6}",
        report.total_samples, report.threshold
    );
    println!(
        "Severity: {} normal, {} warning, {} critical ({:.1}% anomaly rate)",
        report.severity_counts.normal,
        report.severity_counts.warning,
        report.severity_counts.critical,
        report.anomaly_rate * 100.0
    );

    println!(
        "\n{:<6} {:<17} {:<12} {:<9} {:<6} top contributions",
        "#", "time", "error", "tier", "major"
    );
    println!("{}", "-".repeat(90));
    for record in report.anomalies.iter().take(top) {
        println!(
            "{:<6} {:<17} {:<12.6} {:<9} {:<6} {}",
            record.index,
            format_timestamp(&record.metadata),
            record.reconstruction_error,
            severity_label(record.severity),
            if record.is_major_event { "yes" } else { "" },
            top_contributions(&record.contributions, 3),
        );
    }
}

fn print_ensemble_report(report: &EnsembleReport, top: usize) {
    println!(
        "\nScored {} rows (ensemble), first-member threshold {:.6}",
        report.total_samples, report.threshold
    );
    println!(
        "Severity: {} normal, {} warning, {} critical ({:.1}% anomaly rate)",
        report.severity_counts.normal,
        report.severity_counts.warning,
        report.severity_counts.critical,
        report.anomaly_rate * 100.0
    );

    println!(
        "\n{:<6} {:<17} {:<12} {:<9} {:<7} votes (n/w/c)",
        "#", "time", "avg error", "tier", "conf"
    );
    println!("{}", "-".repeat(80));
    for record in report.anomalies.iter().take(top) {
        println!(
            "{:<6} {:<17} {:<12.6} {:<9} {:<7.2} {}/{}/{}",
            record.index,
            format_timestamp(&record.metadata),
            record.vote.averaged_error,
            severity_label(record.severity),
            record.vote.confidence,
            record.vote.normal_votes,
            record.vote.warning_votes,
            record.vote.critical_votes,
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let cfg = AppConfig::load(args.config.clone())?;

    // 1. Candles.
    let candles = load_candles(&args.data)?;
    if candles.is_empty() {
        bail!("no candles found in {}", args.data.display());
    }
    validate_series(&candles)?;
    println!("Loaded {} candles from {}", candles.len(), args.data.display());

    // 2. Features.
    let vectors = build_features(&candles)?;
    let raw_matrix = feature_matrix(&vectors);

    // 3. Temporal split + normalization stats from the train split only.
    let split = ((raw_matrix.len() as f64) * cfg.data.train_ratio) as usize;
    let (train_raw, val_raw) = raw_matrix.split_at(split);
    if train_raw.is_empty() || val_raw.is_empty() {
        bail!(
            "train/validation split {}:{} leaves an empty side; need more candles",
            train_raw.len(),
            val_raw.len()
        );
    }
    println!(
        "Train: {} rows, Val: {} rows",
        train_raw.len(),
        val_raw.len()
    );

    let stats = MinMaxStats::fit(train_raw)?;
    let train_matrix = stats.transform_matrix(train_raw);
    let val_matrix = stats.transform_matrix(val_raw);
    let full_matrix = stats.transform_matrix(&raw_matrix);

    let params = ModelParams {
        input_width: vigil_features::FeatureVector::NUM_FEATURES,
        encoder_units: cfg.model.encoder_units.clone(),
        latent_size: cfg.model.latent_size,
        decoder_units: cfg.model.decoder_units.clone(),
        dropout_rate: cfg.model.dropout_rate,
        learning_rate: cfg.model.learning_rate,
        seed: cfg.model.seed,
    };
    let opts = TrainOptions {
        epochs: cfg.training.epochs,
        batch_size: cfg.training.batch_size,
        patience: cfg.training.early_stopping_patience,
        shuffle_seed: cfg.model.seed,
        ..TrainOptions::default()
    };
    let threshold_cfg = ThresholdConfig {
        sigma_multiplier: cfg.threshold.sigma_multiplier,
        percentile: cfg.threshold.percentile,
    };
    let severity_cfg = SeverityConfig {
        warning_multiplier: cfg.severity.warning_multiplier,
        critical_multiplier: cfg.severity.critical_multiplier,
    };

    // Candle timestamps ride along as opaque per-row metadata.
    let metadata: Vec<serde_json::Value> = candles
        .iter()
        .map(|c| serde_json::json!({ "timestamp": c.timestamp }))
        .collect();

    // 4–6. Train, calibrate, score, persist.
    if args.ensemble || cfg.ensemble.enabled {
        let mut ensemble = Ensemble::with_default_members(&params)?;
        let histories = ensemble.train(&train_matrix, &val_matrix, &opts)?;
        for (i, history) in histories.iter().enumerate() {
            if let Some(last) = history.last() {
                println!(
                    "Member {i}: {} epochs, final val_loss={:.6}",
                    history.len(),
                    last.val_loss
                );
            }
        }
        let thresholds = ensemble.calibrate(&train_matrix, &threshold_cfg)?;
        println!("Member thresholds: {thresholds:?}");

        let report = ensemble.score(&full_matrix, &severity_cfg, Some(&metadata))?;
        print_ensemble_report(&report, args.top);

        save_bundle(&ensemble.members()[0], &stats, &args.output)?;
    } else {
        let mut model = AnomalyModel::new(params)?;
        let history = model.train_with_progress(&train_matrix, &val_matrix, &opts, |stats| {
            println!(
                "Epoch {:>3}: train_loss={:.6}, val_loss={:.6}",
                stats.epoch + 1,
                stats.train_loss,
                stats.val_loss
            );
        })?;
        println!("Trained for {} epochs", history.len());

        let threshold = threshold::calibrate(&mut model, &train_matrix, &threshold_cfg)?;
        println!("Calibrated threshold: {threshold:.6}");

        let report = classifier::score(&model, &full_matrix, &severity_cfg, Some(&metadata))?;
        print_single_report(&report, args.top);

        save_bundle(&model, &stats, &args.output)?;
    }

    Ok(())
}

fn save_bundle(model: &AnomalyModel, stats: &MinMaxStats, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    model.to_bundle()?.save(output)?;
    let norm_path = output.with_extension("norm.json");
    stats.save(&norm_path)?;
    println!("\nBundle saved to {}", output.display());
    println!("Norm stats saved to {}", norm_path.display());
    Ok(())
}
