use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};

use crate::error::{Result, XappError};
use crate::matrix::Matrix;
use crate::model::{MlpParams, MlpRegressor};
use crate::persist::ArtifactPaths;
use crate::preprocess::StandardScaler;

/// Contents of `meta.json`: what the persisted model expects as input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub feat_list: Vec<String>,
    pub in_dim: Option<usize>,
    pub hidden_layers: Vec<i64>,
    pub target: String,
}

/// Reloaded scaler + regressor for one-step-ahead RSSI inference.
pub struct Predictor {
    model: MlpRegressor,
    scaler: StandardScaler,
    feat_list: Vec<String>,
}

// ---------- Feature ordering utility ----------

/// Orders a flat `name -> value` map by `feat_list`; missing names become NaN.
fn order_from_flat(map: &HashMap<String, f64>, feat_list: &[String]) -> Vec<f64> {
    feat_list
        .iter()
        .map(|k| map.get(k).copied().unwrap_or(f64::NAN))
        .collect()
}

impl Predictor {
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let paths = ArtifactPaths::new(dir.as_ref());

        let meta_txt = fs::read_to_string(&paths.meta)?;
        let meta: ModelMeta = serde_json::from_str(&meta_txt)?;
        let feat_list = meta.feat_list;
        let in_dim = meta.in_dim.unwrap_or(feat_list.len());
        if in_dim != feat_list.len() {
            tracing::warn!(
                "meta.in_dim ({}) != feat_list.len() ({}); using feat_list.len()",
                in_dim,
                feat_list.len()
            );
        }

        let scaler = StandardScaler::load(&paths.scaler)?;
        if scaler.n_features() != feat_list.len() {
            return Err(XappError::ShapeMismatch {
                got: scaler.n_features(),
                expected: feat_list.len(),
            });
        }

        let params = MlpParams {
            hidden_layers: meta.hidden_layers,
            ..Default::default()
        };
        let model = MlpRegressor::load(&paths.model, feat_list.len(), params)?;
        tracing::info!("loaded model; feat_list[{}]: {:?}", feat_list.len(), &feat_list);

        Ok(Self { model, scaler, feat_list })
    }

    pub fn feat_list(&self) -> &[String] {
        &self.feat_list
    }

    /// Predicts `ul_rssi` of the next report from the current raw statistics.
    /// A feature absent from `features`, or NaN, is fed as its training mean.
    /// Infinite values are rejected.
    pub fn predict(&self, features: &HashMap<String, f64>) -> Result<f64> {
        let raw = order_from_flat(features, &self.feat_list);
        if let Some(j) = raw.iter().position(|v| v.is_infinite()) {
            return Err(XappError::NonFinite(format!("feature '{}'", self.feat_list[j])));
        }
        let row = Matrix::new(1, raw.len(), raw);
        let scaled = self.scaler.transform(&row)?;
        let filled: Vec<f64> = scaled.as_slice().iter().map(|v| if v.is_nan() { 0.0 } else { *v }).collect();
        let out = self.model.predict(&Matrix::new(1, filled.len(), filled))?;
        out.first().copied().ok_or(XappError::NotEnoughSamples { needed: 1, got: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_from_flat() {
        let feat_list = vec!["phr".to_string(), "ul_rssi".to_string(), "wb_cqi".to_string()];
        let map = HashMap::from([("ul_rssi".to_string(), -60.0), ("phr".to_string(), 12.0)]);
        let v = order_from_flat(&map, &feat_list);
        assert_eq!(&v[..2], &[12.0, -60.0]);
        assert!(v[2].is_nan());
    }

    fn small_predictor() -> Predictor {
        let x = Matrix::from_rows(&[vec![10.0, -60.0], vec![12.0, -62.0], vec![14.0, -58.0]]);
        Predictor {
            model: MlpRegressor::new(2, MlpParams::default()).unwrap(),
            scaler: StandardScaler::fit(&x),
            feat_list: vec!["phr".to_string(), "ul_rssi".to_string()],
        }
    }

    #[test]
    fn test_predict_fills_missing_and_rejects_infinite() {
        let p = small_predictor();

        let partial = HashMap::from([("ul_rssi".to_string(), -61.0)]);
        assert!(p.predict(&partial).unwrap().is_finite());

        let nan = HashMap::from([("phr".to_string(), f64::NAN), ("ul_rssi".to_string(), -61.0)]);
        assert_eq!(p.predict(&nan).unwrap(), p.predict(&partial).unwrap());

        let inf = HashMap::from([("phr".to_string(), 11.0), ("ul_rssi".to_string(), f64::NEG_INFINITY)]);
        match p.predict(&inf) {
            Err(XappError::NonFinite(what)) => assert_eq!(what, "feature 'ul_rssi'"),
            other => panic!("expected NonFinite, got {:?}", other),
        }
    }

    #[test]
    fn test_meta_without_in_dim() {
        let meta: ModelMeta = serde_json::from_str(
            r#"{"feat_list":["phr","ul_rssi"],"hidden_layers":[64,32],"target":"ul_rssi(t+1)"}"#,
        )
        .unwrap();
        assert_eq!(meta.in_dim, None);
        assert_eq!(meta.feat_list.len(), 2);
    }
}
