use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::Tensor;

use crate::error::{Result, XappError};
use crate::matrix::Matrix;
use crate::stats;

/// Features whose sample variance falls below this carry no information.
pub const CONSTANT_VARIANCE_THRESHOLD: f64 = 1e-10;

// ---------- Constant feature filter ----------

#[derive(Debug, Clone)]
pub struct FilteredFeatures {
    pub names: Vec<String>,
    pub features: Matrix,
    pub dropped: Vec<String>,
    /// Sample variance (ddof = 1) of every input column, in input order.
    pub variances: Vec<f64>,
}

/// Drops columns whose variance is below `threshold`. Undefined (NaN) variance keeps the column.
pub fn drop_constant_features(names: &[String], features: &Matrix, threshold: f64) -> FilteredFeatures {
    let variances: Vec<f64> = (0..features.n_cols())
        .map(|j| stats::variance(&features.column(j), 1))
        .collect();

    let mut keep = Vec::new();
    let mut dropped = Vec::new();
    for (j, var) in variances.iter().enumerate() {
        if *var < threshold {
            dropped.push(names[j].clone());
        } else {
            keep.push(j);
        }
    }

    FilteredFeatures {
        names: keep.iter().map(|&j| names[j].clone()).collect(),
        features: features.select_columns(&keep),
        dropped,
        variances,
    }
}

// ---------- Standard scaler ----------

/// Per-column standardization, `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub var: Vec<f64>,
    pub n_samples_seen: usize,
}

impl StandardScaler {
    pub fn fit(x: &Matrix) -> Self {
        let mut mean = Vec::with_capacity(x.n_cols());
        let mut var = Vec::with_capacity(x.n_cols());
        for j in 0..x.n_cols() {
            let col = x.column(j);
            mean.push(stats::mean(&col));
            var.push(stats::variance(&col, 0));
        }
        let scale = var
            .iter()
            .map(|v| {
                let s = v.sqrt();
                if s.is_nan() || s < 10.0 * f64::EPSILON {
                    1.0
                } else {
                    s
                }
            })
            .collect();

        Self {
            mean,
            scale,
            var,
            n_samples_seen: x.n_rows(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        if x.n_cols() != self.n_features() {
            return Err(XappError::ShapeMismatch {
                got: x.n_cols(),
                expected: self.n_features(),
            });
        }
        let mut data = Vec::with_capacity(x.n_rows() * x.n_cols());
        for i in 0..x.n_rows() {
            data.extend(
                x.row(i)
                    .iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(v, (m, s))| (v - m) / s),
            );
        }
        Ok(Matrix::new(x.n_rows(), x.n_cols(), data))
    }

    pub fn fit_transform(x: &Matrix) -> Result<(Self, Matrix)> {
        let scaler = Self::fit(x);
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mean = Tensor::from_slice(&self.mean);
        let scale = Tensor::from_slice(&self.scale);
        let var = Tensor::from_slice(&self.var);
        let seen = Tensor::from_slice(&[self.n_samples_seen as i64]);
        Tensor::save_multi(
            &[("mean", &mean), ("scale", &scale), ("var", &var), ("n_samples_seen", &seen)],
            path,
        )?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut scaler = Self {
            mean: Vec::new(),
            scale: Vec::new(),
            var: Vec::new(),
            n_samples_seen: 0,
        };
        for (name, t) in Tensor::load_multi(path)? {
            match name.as_str() {
                "mean" => scaler.mean = Vec::<f64>::try_from(&t)?,
                "scale" => scaler.scale = Vec::<f64>::try_from(&t)?,
                "var" => scaler.var = Vec::<f64>::try_from(&t)?,
                "n_samples_seen" => scaler.n_samples_seen = t.int64_value(&[0]) as usize,
                other => tracing::warn!("ignoring unknown scaler entry '{}'", other),
            }
        }
        if scaler.mean.len() != scaler.scale.len() {
            return Err(XappError::ShapeMismatch {
                got: scaler.scale.len(),
                expected: scaler.mean.len(),
            });
        }
        Ok(scaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_constant_columns_dropped() {
        let x = Matrix::from_rows(&[
            vec![17921.0, 1.0, -60.0],
            vec![17921.0, 2.0, -61.0],
            vec![17921.0, 4.0, -59.5],
        ]);
        let f = drop_constant_features(&names(&["rnti", "phr", "ul_rssi"]), &x, CONSTANT_VARIANCE_THRESHOLD);

        assert_eq!(f.dropped, vec!["rnti"]);
        assert_eq!(f.names, vec!["phr", "ul_rssi"]);
        assert_eq!(f.features.shape(), (3, 2));
        assert_eq!(f.features.column(0), vec![1.0, 2.0, 4.0]);
        assert_eq!(f.variances[0], 0.0);
    }

    #[test]
    fn test_tiny_variance_dropped() {
        let x = Matrix::from_rows(&[vec![1.0, 0.0], vec![1.0 + 1e-8, 1.0]]);
        let f = drop_constant_features(&names(&["a", "b"]), &x, CONSTANT_VARIANCE_THRESHOLD);
        assert_eq!(f.names, vec!["b"], "variance 5e-17 is below threshold");
    }

    #[test]
    fn test_single_row_keeps_columns() {
        let x = Matrix::from_rows(&[vec![1.0, 2.0]]);
        let f = drop_constant_features(&names(&["a", "b"]), &x, CONSTANT_VARIANCE_THRESHOLD);
        assert!(f.dropped.is_empty());
        assert!(f.variances.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_scaled_columns_are_standardized() {
        let x = Matrix::from_rows(&[
            vec![1.0, -60.0, 100.0],
            vec![2.0, -65.0, 300.0],
            vec![3.0, -58.0, 250.0],
            vec![5.0, -70.0, 120.0],
            vec![8.0, -62.0, 900.0],
        ]);
        let (scaler, scaled) = StandardScaler::fit_transform(&x).unwrap();
        assert_eq!(scaler.n_samples_seen, 5);

        for j in 0..scaled.n_cols() {
            let col = scaled.column(j);
            assert!(stats::mean(&col).abs() < 1e-12, "column {} mean not ~0", j);
            assert!((stats::variance(&col, 0) - 1.0).abs() < 1e-12, "column {} variance not ~1", j);
        }
        println!("✓ scaled {} columns to zero mean / unit variance", scaled.n_cols());
    }

    #[test]
    fn test_zero_variance_scale_is_one() {
        let x = Matrix::from_rows(&[vec![3.0], vec![3.0]]);
        let (scaler, scaled) = StandardScaler::fit_transform(&x).unwrap();
        assert_eq!(scaler.scale, vec![1.0]);
        assert_eq!(scaled.column(0), vec![0.0, 0.0]);
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = StandardScaler::fit(&Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 5.0]]));
        let err = scaler.transform(&Matrix::from_rows(&[vec![1.0]])).unwrap_err();
        assert!(matches!(err, XappError::ShapeMismatch { got: 1, expected: 2 }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.ot");
        let scaler = StandardScaler::fit(&Matrix::from_rows(&[vec![1.0, 10.0], vec![3.0, 30.0], vec![8.0, 20.0]]));
        scaler.save(&path).unwrap();

        let loaded = StandardScaler::load(&path).unwrap();
        assert_eq!(loaded, scaler);
    }
}
