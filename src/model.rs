use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::Path,
    time::{Duration, Instant},
};
use tch::{
    nn::{self, Module, OptimizerConfig},
    Device, Kind, Tensor,
};

use crate::error::{Result, XappError};
use crate::matrix::Matrix;
use crate::split::train_test_split_indices;
use crate::stats;

// ---------- Hyper-parameters ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpParams {
    pub hidden_layers: Vec<i64>,
    pub learning_rate: f64,
    /// L2 penalty strength.
    pub alpha: f64,
    pub batch_size: usize,
    /// Epoch cap.
    pub max_iter: usize,
    pub early_stopping: bool,
    pub validation_fraction: f64,
    pub n_iter_no_change: usize,
    pub tol: f64,
    pub seed: u64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32],
            learning_rate: 1e-3,
            alpha: 1e-4,
            batch_size: 200,
            max_iter: 500,
            early_stopping: true,
            validation_fraction: 0.1,
            n_iter_no_change: 10,
            tol: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub n_iter: usize,
    /// Mean training loss of the last epoch.
    pub final_loss: f64,
    pub best_validation_mse: Option<f64>,
    pub loss_curve: Vec<f64>,
    pub stopped_early: bool,
    pub n_fit: usize,
    pub n_validation: usize,
    pub elapsed: Duration,
}

// ---------- Network ----------

fn build_net(p: &nn::Path, in_dim: i64, hidden: &[i64]) -> nn::Sequential {
    let mut net = nn::seq();
    let mut fan_in = in_dim;
    for (i, &units) in hidden.iter().enumerate() {
        net = net
            .add(nn::linear(p / format!("hidden{}", i), fan_in, units, Default::default()))
            .add_fn(|xs| xs.relu());
        fan_in = units;
    }
    net.add(nn::linear(p / "out", fan_in, 1, Default::default()))
}

/// Feed-forward regressor with ReLU hidden layers and a linear output.
pub struct MlpRegressor {
    vs: nn::VarStore,
    net: nn::Sequential,
    in_dim: usize,
    params: MlpParams,
}

impl MlpRegressor {
    pub fn new(in_dim: usize, params: MlpParams) -> Result<Self> {
        if in_dim == 0 {
            return Err(XappError::NoFeatures);
        }
        if params.hidden_layers.is_empty() || params.hidden_layers.iter().any(|&h| h <= 0) {
            return Err(XappError::Config(format!(
                "hidden layers must be non-empty and positive, got {:?}",
                params.hidden_layers
            )));
        }
        tch::manual_seed(params.seed as i64);
        let vs = nn::VarStore::new(Device::Cpu);
        let net = build_net(&vs.root(), in_dim as i64, &params.hidden_layers);
        Ok(Self { vs, net, in_dim, params })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn params(&self) -> &MlpParams {
        &self.params
    }

    /// Trains with Adam on shuffled minibatches. With early stopping, the best
    /// validation weights are restored before returning.
    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<TrainReport> {
        if x.n_cols() != self.in_dim {
            return Err(XappError::ShapeMismatch { got: x.n_cols(), expected: self.in_dim });
        }
        if x.n_rows() != y.len() {
            return Err(XappError::ShapeMismatch { got: y.len(), expected: x.n_rows() });
        }
        check_finite(x, y)?;

        let started = Instant::now();
        let p = self.params.clone();

        let (x_fit, y_fit, validation) = if p.early_stopping {
            let s = train_test_split_indices(x.n_rows(), p.validation_fraction, p.seed)?;
            let y_tr: Vec<f64> = s.train.iter().map(|&i| y[i]).collect();
            let y_va: Vec<f64> = s.test.iter().map(|&i| y[i]).collect();
            (x.select_rows(&s.train), y_tr, Some((x.select_rows(&s.test), y_va)))
        } else {
            if x.n_rows() == 0 {
                return Err(XappError::NotEnoughSamples { needed: 1, got: 0 });
            }
            (x.clone(), y.to_vec(), None)
        };

        let xs = x_fit.to_tensor(Kind::Float);
        let ys = Tensor::from_slice(&y_fit).to_kind(Kind::Float).view([-1, 1]);
        let n = xs.size()[0];
        let batch = (p.batch_size.max(1) as i64).min(n);

        let weights: Vec<Tensor> = self
            .vs
            .variables()
            .into_iter()
            .filter(|(name, _)| name.ends_with("weight"))
            .map(|(_, t)| t)
            .collect();

        let mut opt = nn::Adam::default().build(&self.vs, p.learning_rate)?;
        let val_tol = validation
            .as_ref()
            .map_or(p.tol, |(_, y_val)| validation_tol(p.tol, y_val));

        let mut loss_curve = Vec::with_capacity(p.max_iter);
        let mut no_improvement = 0usize;
        let mut best_loss = f64::INFINITY;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_weights: Option<HashMap<String, Tensor>> = None;
        let mut stopped_early = false;

        for epoch in 0..p.max_iter {
            let perm = Tensor::randperm(n, (Kind::Int64, Device::Cpu));
            let mut accumulated = 0.0;
            let mut start = 0i64;
            while start < n {
                let len = batch.min(n - start);
                let idx = perm.narrow(0, start, len);
                let xb = xs.index_select(0, &idx);
                let yb = ys.index_select(0, &idx);

                let pred = self.net.forward(&xb);
                let mse = (pred - yb).square().mean(Kind::Float);
                let norms: Vec<Tensor> = weights.iter().map(|w| w.square().sum(Kind::Float)).collect();
                let l2 = Tensor::stack(&norms, 0).sum(Kind::Float);
                let loss = mse * 0.5 + l2 * (0.5 * p.alpha / len as f64);
                opt.backward_step(&loss);

                accumulated += loss.double_value(&[]) * len as f64;
                start += len;
            }
            let epoch_loss = accumulated / n as f64;
            loss_curve.push(epoch_loss);

            if let Some((x_val, y_val)) = &validation {
                let score = -mean_squared_error(y_val, &self.predict(x_val)?);
                if score < best_score + val_tol {
                    no_improvement += 1;
                } else {
                    no_improvement = 0;
                }
                if score > best_score {
                    best_score = score;
                    best_weights = Some(self.snapshot());
                }
            } else {
                if epoch_loss > best_loss - p.tol {
                    no_improvement += 1;
                } else {
                    no_improvement = 0;
                }
                if epoch_loss < best_loss {
                    best_loss = epoch_loss;
                }
            }

            tracing::debug!("epoch {} loss={:.6} no_improvement={}", epoch + 1, epoch_loss, no_improvement);

            if no_improvement > p.n_iter_no_change {
                stopped_early = true;
                break;
            }
        }

        if let Some(best) = &best_weights {
            self.restore(best);
        }

        Ok(TrainReport {
            n_iter: loss_curve.len(),
            final_loss: loss_curve.last().copied().unwrap_or(f64::NAN),
            best_validation_mse: validation.as_ref().map(|_| -best_score),
            loss_curve,
            stopped_early,
            n_fit: n as usize,
            n_validation: validation.as_ref().map_or(0, |(_, v)| v.len()),
            elapsed: started.elapsed(),
        })
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        if x.n_cols() != self.in_dim {
            return Err(XappError::ShapeMismatch { got: x.n_cols(), expected: self.in_dim });
        }
        if x.n_rows() == 0 {
            return Ok(Vec::new());
        }
        let xs = x.to_tensor(Kind::Float);
        let out = tch::no_grad(|| self.net.forward(&xs));
        let flat = Vec::<f32>::try_from(&out.view([-1]))?;
        Ok(flat.into_iter().map(f64::from).collect())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    /// Rebuilds the architecture described by `params` and loads weights into it.
    pub fn load<P: AsRef<Path>>(path: P, in_dim: usize, params: MlpParams) -> Result<Self> {
        let mut model = Self::new(in_dim, params)?;
        model.vs.load(path)?;
        Ok(model)
    }

    fn snapshot(&self) -> HashMap<String, Tensor> {
        self.vs
            .variables()
            .into_iter()
            .map(|(name, t)| (name, t.detach().copy()))
            .collect()
    }

    fn restore(&mut self, weights: &HashMap<String, Tensor>) {
        tch::no_grad(|| {
            for (name, mut var) in self.vs.variables() {
                if let Some(src) = weights.get(&name) {
                    var.copy_(src);
                }
            }
        });
    }
}

/// `tol` is an R² step; the score is negative MSE, so the step scales by the
/// validation target variance. A constant target keeps `tol` as is.
fn validation_tol(tol: f64, y_val: &[f64]) -> f64 {
    let var = stats::variance(y_val, 0);
    if var.is_finite() && var > 0.0 {
        tol * var
    } else {
        tol
    }
}

fn check_finite(x: &Matrix, y: &[f64]) -> Result<()> {
    for j in 0..x.n_cols() {
        if x.column(j).iter().any(|v| !v.is_finite()) {
            return Err(XappError::NonFinite(format!("feature #{}", j)));
        }
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(XappError::NonFinite("target".to_string()));
    }
    Ok(())
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>()
        / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn linear_data(n: usize) -> (Matrix, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rows = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let a: f64 = rng.gen_range(-1.5..1.5);
            let b: f64 = rng.gen_range(-1.5..1.5);
            rows.push(vec![a, b]);
            y.push(3.0 * a - 2.0 * b);
        }
        (Matrix::from_rows(&rows), y)
    }

    #[test]
    fn test_mse() {
        assert_eq!(mean_squared_error(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]), 4.0 / 3.0);
        assert!(mean_squared_error(&[], &[]).is_nan());
    }

    #[test]
    fn test_validation_tol_scales_with_target_variance() {
        // population variance of [-62, -60, -58] is 8/3
        let tol = validation_tol(1e-4, &[-62.0, -60.0, -58.0]);
        assert!((tol - 1e-4 * 8.0 / 3.0).abs() < 1e-15);
        assert_eq!(validation_tol(1e-4, &[-60.0, -60.0]), 1e-4);
        assert_eq!(validation_tol(1e-4, &[-60.0]), 1e-4);
    }

    #[test]
    fn test_fit_beats_mean_baseline() {
        let (x, y) = linear_data(240);
        let mut mlp = MlpRegressor::new(2, MlpParams::default()).unwrap();
        let report = mlp.fit(&x, &y).unwrap();

        assert!(report.n_iter >= 1 && report.n_iter <= 500);
        assert!(report.n_validation > 0);
        assert_eq!(report.n_fit + report.n_validation, 240);
        assert!(report.final_loss.is_finite());

        let pred = mlp.predict(&x).unwrap();
        let y_mean = y.iter().sum::<f64>() / y.len() as f64;
        let baseline = mean_squared_error(&y, &vec![y_mean; y.len()]);
        let mse = mean_squared_error(&y, &pred);
        println!("✓ mse={:.4} baseline={:.4} after {} epochs", mse, baseline, report.n_iter);
        assert!(mse < baseline, "trained model should beat predicting the mean");
    }

    #[test]
    fn test_fit_without_early_stopping() {
        let (x, y) = linear_data(30);
        let params = MlpParams { early_stopping: false, max_iter: 20, ..Default::default() };
        let mut mlp = MlpRegressor::new(2, params).unwrap();
        let report = mlp.fit(&x, &y).unwrap();
        assert!(report.best_validation_mse.is_none());
        assert_eq!(report.n_validation, 0);
        assert!(report.n_iter <= 20);
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let x = Matrix::from_rows(&[vec![1.0], vec![f64::NAN], vec![2.0]]);
        let mut mlp = MlpRegressor::new(1, MlpParams::default()).unwrap();
        let err = mlp.fit(&x, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, XappError::NonFinite(_)));
        assert_eq!(err.to_string(), "input contains non-finite values in feature #0");
    }

    #[test]
    fn test_rejects_zero_features() {
        assert!(matches!(MlpRegressor::new(0, MlpParams::default()), Err(XappError::NoFeatures)));
    }

    #[test]
    fn test_save_and_load_reproduces_predictions() {
        let (x, y) = linear_data(50);
        let params = MlpParams { max_iter: 30, ..Default::default() };
        let mut mlp = MlpRegressor::new(2, params.clone()).unwrap();
        mlp.fit(&x, &y).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mlp_model.ot");
        mlp.save(&path).unwrap();

        let loaded = MlpRegressor::load(&path, 2, params).unwrap();
        let a = mlp.predict(&x).unwrap();
        let b = loaded.predict(&x).unwrap();
        assert_eq!(a, b);
    }
}
