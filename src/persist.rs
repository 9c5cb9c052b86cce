use std::{
    fmt,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tch::{Kind, Tensor};

use crate::dataset::{Dataset, LABEL_COLUMN};
use crate::error::Result;
use crate::model::{MlpParams, MlpRegressor};
use crate::predictor::ModelMeta;
use crate::preprocess::StandardScaler;

/// Fixed artifact locations under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub dataset_csv: PathBuf,
    pub x_features: PathBuf,
    pub y_target: PathBuf,
    pub feature_names: PathBuf,
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub meta: PathBuf,
    pub config: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            dataset_csv: dir.join("mac_ml_dataset.csv"),
            x_features: dir.join("X_features.npy"),
            y_target: dir.join("Y_target.npy"),
            feature_names: dir.join("feature_names.txt"),
            model: dir.join("mlp_model.ot"),
            scaler: dir.join("scaler.ot"),
            meta: dir.join("meta.json"),
            config: dir.join("model_config.txt"),
        }
    }
}

fn fmt_cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Writes the labelled table, raw arrays and feature names.
pub fn write_dataset(paths: &ArtifactPaths, ds: &Dataset) -> Result<()> {
    fs::create_dir_all(&paths.dir)?;

    let mut csv = BufWriter::new(File::create(&paths.dataset_csv)?);
    let mut header = ds.feature_names.join(",");
    if !header.is_empty() {
        header.push(',');
    }
    header.push_str(LABEL_COLUMN);
    writeln!(csv, "{}", header)?;
    for i in 0..ds.len() {
        let mut cells: Vec<String> = ds.features.row(i).iter().map(|v| fmt_cell(*v)).collect();
        cells.push(fmt_cell(ds.labels[i]));
        writeln!(csv, "{}", cells.join(","))?;
    }
    csv.flush()?;
    tracing::info!("saved CSV: {}", paths.dataset_csv.display());

    ds.features.to_tensor(Kind::Double).write_npy(&paths.x_features)?;
    Tensor::from_slice(&ds.labels).write_npy(&paths.y_target)?;
    tracing::info!("saved X array: {}", paths.x_features.display());
    tracing::info!("saved Y array: {}", paths.y_target.display());

    fs::write(&paths.feature_names, ds.feature_names.join("\n"))?;
    tracing::info!("saved feature names: {}", paths.feature_names.display());
    Ok(())
}

/// Everything the human-readable model report states.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub features: Vec<String>,
    pub params: MlpParams,
    pub test_fraction: f64,
    pub n_iter: usize,
    pub final_loss: f64,
    pub test_mse: f64,
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.params;
        let train_pct = ((1.0 - self.test_fraction) * 100.0).round();
        let test_pct = (self.test_fraction * 100.0).round();

        writeln!(f, "Model Configuration")?;
        writeln!(f, "{}\n", "=".repeat(60))?;
        writeln!(f, "Input Features ({}):", self.features.len())?;
        for (i, name) in self.features.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, name)?;
        }
        writeln!(f, "\nTarget: Future RSSI (ul_rssi at t+1)")?;
        writeln!(f, "\nModel Architecture:")?;
        writeln!(f, "  Input layer: {} neurons", self.features.len())?;
        for (i, units) in p.hidden_layers.iter().enumerate() {
            writeln!(f, "  Hidden layer {}: {} neurons (ReLU)", i + 1, units)?;
        }
        writeln!(f, "  Output layer: 1 neuron (linear)")?;
        writeln!(f, "\nTraining Configuration:")?;
        writeln!(f, "  Solver: adam (lr={})", p.learning_rate)?;
        writeln!(f, "  L2 alpha: {}", p.alpha)?;
        writeln!(f, "  Batch size: {}", p.batch_size)?;
        writeln!(f, "  Max iterations: {}", p.max_iter)?;
        writeln!(f, "  Iterations run: {}", self.n_iter)?;
        if p.early_stopping {
            writeln!(
                f,
                "  Early stopping: Yes (validation {}, patience {})",
                p.validation_fraction, p.n_iter_no_change
            )?;
        } else {
            writeln!(f, "  Early stopping: No")?;
        }
        writeln!(f, "  Train/Test split: {}/{}", train_pct, test_pct)?;
        writeln!(f, "  Seed: {}", p.seed)?;
        writeln!(f, "\nPerformance Metrics:")?;
        writeln!(f, "  Final training loss: {:.6}", self.final_loss)?;
        writeln!(f, "  Test MSE: {:.6}", self.test_mse)
    }
}

/// Text of `model_config.txt`.
pub fn render_config(summary: &ModelSummary) -> String {
    summary.to_string()
}

/// Writes model weights, scaler, `meta.json` and the text report.
pub fn write_model(
    paths: &ArtifactPaths,
    model: &MlpRegressor,
    scaler: &StandardScaler,
    summary: &ModelSummary,
) -> Result<()> {
    fs::create_dir_all(&paths.dir)?;

    model.save(&paths.model)?;
    tracing::info!("saved MLP model: {}", paths.model.display());

    scaler.save(&paths.scaler)?;
    tracing::info!("saved scaler: {}", paths.scaler.display());

    let meta = ModelMeta {
        feat_list: summary.features.clone(),
        in_dim: Some(model.in_dim()),
        hidden_layers: model.params().hidden_layers.clone(),
        target: "ul_rssi(t+1)".to_string(),
    };
    fs::write(&paths.meta, serde_json::to_string_pretty(&meta)?)?;

    fs::write(&paths.config, render_config(summary))?;
    tracing::info!("saved model config: {}", paths.config.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Sample;
    use crate::types::StatFamily;

    fn small_dataset() -> Dataset {
        let samples: Vec<Sample> = (0..5)
            .map(|i| {
                Sample::new(StatFamily::Mac, i as f64)
                    .with("phr", 10.0 + i as f64)
                    .with("ul_rssi", -60.0 - i as f64 * 0.5)
            })
            .collect();
        Dataset::from_mac_samples(&samples).unwrap()
    }

    #[test]
    fn test_write_dataset_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(&dir.path().join("ml_data"));
        let ds = small_dataset();
        write_dataset(&paths, &ds).unwrap();

        let csv = fs::read_to_string(&paths.dataset_csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "phr,ul_rssi,target_future_rssi");
        assert_eq!(lines.len(), ds.len() + 1);
        assert_eq!(lines[1], "10,-60,-60.5");

        let names = fs::read_to_string(&paths.feature_names).unwrap();
        assert_eq!(names, "phr\nul_rssi");

        let x = Tensor::read_npy(&paths.x_features).unwrap();
        assert_eq!(x.size(), vec![4, 2]);
        assert_eq!(x.kind(), Kind::Double);
        let y = Tensor::read_npy(&paths.y_target).unwrap();
        assert_eq!(y.size(), vec![4]);
        assert!((y.double_value(&[3]) - -62.0).abs() < 1e-12);
        println!("✓ dataset artifacts written to {}", paths.dir.display());
    }

    #[test]
    fn test_nan_cells_written_empty() {
        assert_eq!(fmt_cell(f64::NAN), "");
        assert_eq!(fmt_cell(-61.25), "-61.25");
    }

    #[test]
    fn test_render_config() {
        let summary = ModelSummary {
            features: vec!["phr".into(), "ul_rssi".into()],
            params: MlpParams::default(),
            test_fraction: 0.1,
            n_iter: 42,
            final_loss: 0.5,
            test_mse: 1.234567,
        };
        let text = render_config(&summary);
        assert!(text.contains("Input Features (2):"));
        assert!(text.contains("  2. ul_rssi"));
        assert!(text.contains("Hidden layer 1: 64 neurons (ReLU)"));
        assert!(text.contains("Hidden layer 2: 32 neurons (ReLU)"));
        assert!(text.contains("Max iterations: 500"));
        assert!(text.contains("Train/Test split: 90/10"));
        assert!(text.contains("Test MSE: 1.234567"));
        assert!(text.contains("Early stopping: Yes (validation 0.1, patience 10)"));
        assert!(text.ends_with('\n'));

        let plain = ModelSummary {
            params: MlpParams { early_stopping: false, ..Default::default() },
            ..summary
        };
        assert!(render_config(&plain).contains("Early stopping: No"));
    }
}
