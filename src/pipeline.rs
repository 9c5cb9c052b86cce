//! Offline learning branch: dataset, filtering, scaling, split, training,
//! evaluation and persistence, run once over the drained MAC samples.

use crate::collector::Sample;
use crate::config::XappConfig;
use crate::dataset::{Dataset, LABEL_SOURCE};
use crate::error::{Result, XappError};
use crate::matrix::Matrix;
use crate::model::{mean_squared_error, MlpRegressor, TrainReport};
use crate::persist::{self, ArtifactPaths, ModelSummary};
use crate::preprocess::{drop_constant_features, StandardScaler};
use crate::split::train_test_split_indices;

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub dataset_rows: usize,
    pub dropped_rows: usize,
    pub retained_features: Vec<String>,
    pub dropped_features: Vec<String>,
    pub n_train: usize,
    pub n_test: usize,
    pub test_mse: f64,
    pub report: TrainReport,
    pub artifacts: ArtifactPaths,
}

fn log_dataset(ds: &Dataset) {
    tracing::info!("X matrix shape: ({}, {}), Y length: {}", ds.len(), ds.n_features(), ds.labels.len());
    if let Some(x_rssi) = ds.column(LABEL_SOURCE) {
        for i in 0..ds.len().min(5) {
            tracing::info!("  sample {:<3} X[t] rssi={:<10.2} Y[t] future rssi={:.2}", i, x_rssi[i], ds.labels[i]);
        }
    }
    tracing::info!("dropped samples without future label: {}", ds.dropped_rows);
    for s in ds.describe() {
        tracing::info!(
            "  {:<20} count={:<5} mean={:>12.4} std={:>10.4} min={:>12.4} max={:>12.4}",
            s.name, s.count, s.mean, s.std, s.min, s.max
        );
    }
}

/// Smallest row count whose test split, and early-stopping validation split
/// when enabled, leaves every side non-empty.
pub fn min_rows(cfg: &XappConfig) -> usize {
    let valid = |f: f64| f > 0.0 && f < 1.0;
    if !valid(cfg.test_fraction) || (cfg.mlp.early_stopping && !valid(cfg.mlp.validation_fraction)) {
        // the split itself reports the bad fraction
        return 2;
    }
    let splits = |n: usize, fraction: f64| {
        let held_out = (fraction * n as f64).ceil() as usize;
        (held_out > 0 && held_out < n).then(|| n - held_out)
    };
    (2..)
        .find(|&n| match splits(n, cfg.test_fraction) {
            Some(train) if cfg.mlp.early_stopping => splits(train, cfg.mlp.validation_fraction).is_some(),
            Some(_) => true,
            None => false,
        })
        .unwrap_or(usize::MAX)
}

fn ensure_finite(names: &[String], x: &Matrix) -> Result<()> {
    for (j, name) in names.iter().enumerate() {
        if x.column(j).iter().any(|v| !v.is_finite()) {
            return Err(XappError::NonFinite(format!("feature '{}'", name)));
        }
    }
    Ok(())
}

pub fn run(samples: &[Sample], cfg: &XappConfig) -> Result<PipelineOutcome> {
    tracing::info!("processing {} MAC samples for learning", samples.len());
    let paths = ArtifactPaths::new(&cfg.output_dir);

    // dataset + label
    let ds = Dataset::from_mac_samples(samples)?;
    log_dataset(&ds);
    persist::write_dataset(&paths, &ds)?;
    let needed = min_rows(cfg);
    if ds.len() < needed {
        return Err(XappError::NotEnoughSamples { needed, got: ds.len() });
    }

    // constant features
    let filtered = drop_constant_features(&ds.feature_names, &ds.features, cfg.variance_threshold);
    for (name, var) in ds.feature_names.iter().zip(&filtered.variances) {
        tracing::info!("  {:<20} variance: {:.6}", name, var);
    }
    if filtered.dropped.is_empty() {
        tracing::info!("no constant features detected");
    } else {
        tracing::warn!(
            "constant features detected (variance < {}): {:?}",
            cfg.variance_threshold,
            filtered.dropped
        );
    }
    if filtered.names.is_empty() {
        return Err(XappError::NoFeatures);
    }
    tracing::info!("remaining features: {:?}", filtered.names);

    // scale over the full dataset, before the split
    let (scaler, x_scaled) = StandardScaler::fit_transform(&filtered.features)?;
    for (i, name) in filtered.names.iter().enumerate() {
        tracing::info!("  {:<20} mean: {:>10.4}  std: {:>10.4}", name, scaler.mean[i], scaler.scale[i]);
    }
    ensure_finite(&filtered.names, &x_scaled)?;

    // split
    let split = train_test_split_indices(x_scaled.n_rows(), cfg.test_fraction, cfg.seed)?;
    let x_train = x_scaled.select_rows(&split.train);
    let x_test = x_scaled.select_rows(&split.test);
    let y_train: Vec<f64> = split.train.iter().map(|&i| ds.labels[i]).collect();
    let y_test: Vec<f64> = split.test.iter().map(|&i| ds.labels[i]).collect();
    let total = x_scaled.n_rows() as f64;
    tracing::info!(
        "train samples: {} ({:.1}%), test samples: {} ({:.1}%)",
        y_train.len(),
        y_train.len() as f64 / total * 100.0,
        y_test.len(),
        y_test.len() as f64 / total * 100.0
    );

    // train
    let mut mlp = MlpRegressor::new(filtered.names.len(), cfg.mlp.clone())?;
    let arch: Vec<String> = cfg.mlp.hidden_layers.iter().map(|h| format!("Hidden({})", h)).collect();
    tracing::info!("model architecture: Input({}) -> {} -> Output(1)", filtered.names.len(), arch.join(" -> "));
    let report = mlp.fit(&x_train, &y_train)?;
    tracing::info!(
        "training completed in {:.2}s: iterations={} loss={:.6} early_stop={}",
        report.elapsed.as_secs_f64(),
        report.n_iter,
        report.final_loss,
        report.stopped_early
    );
    if report.n_iter == cfg.mlp.max_iter && !report.stopped_early {
        tracing::warn!("maximum iterations ({}) reached before convergence", cfg.mlp.max_iter);
    }

    // evaluate
    let y_pred = mlp.predict(&x_test)?;
    let test_mse = mean_squared_error(&y_test, &y_pred);
    tracing::info!("test MSE: {:.6}", test_mse);
    tracing::info!("{:<8} {:<15} {:<18} {:<12}", "sample", "actual rssi", "predicted rssi", "error");
    for (i, (a, p)) in y_test.iter().zip(&y_pred).take(10).enumerate() {
        tracing::info!("{:<8} {:<15.4} {:<18.4} {:<12.4}", i, a, p, a - p);
    }

    // persist
    let summary = ModelSummary {
        features: filtered.names.clone(),
        params: cfg.mlp.clone(),
        test_fraction: cfg.test_fraction,
        n_iter: report.n_iter,
        final_loss: report.final_loss,
        test_mse,
    };
    persist::write_model(&paths, &mlp, &scaler, &summary)?;

    Ok(PipelineOutcome {
        dataset_rows: ds.len(),
        dropped_rows: ds.dropped_rows,
        retained_features: filtered.names,
        dropped_features: filtered.dropped,
        n_train: y_train.len(),
        n_test: y_test.len(),
        test_mse,
        report,
        artifacts: paths,
    })
}
