use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::error::{Result, XappError};
use crate::model::MlpParams;
use crate::preprocess::CONSTANT_VARIANCE_THRESHOLD;
use crate::sim::SimConfig;
use crate::types::{Interval, StatFamily};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XappConfig {
    pub output_dir: PathBuf,
    /// Length of the collection window.
    pub runtime_ms: u64,
    pub interval_ms: u64,
    /// Pause after each subscription request.
    pub registration_gap_ms: u64,
    pub progress_every_secs: u64,
    pub families: Vec<StatFamily>,
    pub variance_threshold: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub mlp: MlpParams,
    pub sim: SimConfig,
}

impl Default for XappConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("ml_data"),
            runtime_ms: 5_000,
            interval_ms: 10,
            registration_gap_ms: 1_000,
            progress_every_secs: 10,
            families: vec![StatFamily::Mac, StatFamily::Rlc, StatFamily::Pdcp],
            variance_threshold: CONSTANT_VARIANCE_THRESHOLD,
            test_fraction: 0.1,
            seed: 42,
            mlp: MlpParams::default(),
            sim: SimConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map(Some)
            .map_err(|_| XappError::Config(format!("{} has an invalid value '{}'", key, v))),
        Err(_) => Ok(None),
    }
}

impl XappConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, then the JSON file in `XAPP_CONFIG`, then single-value overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("XAPP_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        if let Some(dir) = env_parse::<PathBuf>("XAPP_OUTPUT_DIR")? {
            cfg.output_dir = dir;
        }
        if let Some(ms) = env_parse("XAPP_RUNTIME_MS")? {
            cfg.runtime_ms = ms;
        }
        if let Some(nodes) = env_parse("XAPP_NODES")? {
            cfg.sim.nodes = nodes;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.interval()?;
        if self.families.is_empty() {
            return Err(XappError::Config("at least one statistic family is required".into()));
        }
        for (name, f) in [
            ("test_fraction", self.test_fraction),
            ("mlp.validation_fraction", self.mlp.validation_fraction),
        ] {
            if !(f > 0.0 && f < 1.0) {
                return Err(XappError::Config(format!("{} must be in (0, 1), got {}", name, f)));
            }
        }
        if self.mlp.hidden_layers.is_empty() {
            return Err(XappError::Config("mlp.hidden_layers must not be empty".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Result<Interval> {
        Interval::from_millis(self.interval_ms).ok_or_else(|| {
            XappError::Config(format!(
                "interval_ms must be one of 1, 2, 5, 10; got {}",
                self.interval_ms
            ))
        })
    }

    pub fn runtime(&self) -> Duration {
        Duration::from_millis(self.runtime_ms)
    }

    pub fn registration_gap(&self) -> Duration {
        Duration::from_millis(self.registration_gap_ms)
    }
}
