use std::collections::BTreeSet;

use crate::collector::Sample;
use crate::error::{Result, XappError};
use crate::matrix::Matrix;
use crate::stats::ColumnSummary;
use crate::types::StatFamily;

/// Candidate model inputs, in column order. `timestamp` is kept for reference only.
pub const FEATURE_COLUMNS: [&str; 13] = [
    "rnti",
    "phr",
    "dl_tbs",
    "ul_tbs",
    "dl_aggr_prb",
    "wb_cqi",
    "pusch_snr",
    "pucch_snr",
    "ul_rssi",
    "dl_bler",
    "ul_bler",
    "dl_mcs",
    "ul_mcs",
];

/// Field whose next value becomes the label.
pub const LABEL_SOURCE: &str = "ul_rssi";

/// Column name of the label in the persisted table.
pub const LABEL_COLUMN: &str = "target_future_rssi";

/// Supervised snapshot: row `i` predicts `ul_rssi` of the sample after it.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Matrix,
    pub labels: Vec<f64>,
    /// Rows removed because their future label was undefined.
    pub dropped_rows: usize,
}

impl Dataset {
    pub fn from_mac_samples(samples: &[Sample]) -> Result<Self> {
        if samples.is_empty() {
            return Err(XappError::NoSamples(StatFamily::Mac));
        }

        let present: BTreeSet<&str> = samples
            .iter()
            .flat_map(|s| s.fields.keys().map(String::as_str))
            .collect();
        let available: Vec<&str> = FEATURE_COLUMNS
            .iter()
            .copied()
            .filter(|c| present.contains(c))
            .collect();
        tracing::info!("selected features: {:?}", available);

        if !present.contains(LABEL_SOURCE) {
            return Err(XappError::MissingLabelField(LABEL_SOURCE.to_string()));
        }

        // Y[t] = ul_rssi[t+1]
        let future: Vec<f64> = (0..samples.len())
            .map(|i| {
                samples
                    .get(i + 1)
                    .and_then(|s| s.get(LABEL_SOURCE))
                    .unwrap_or(f64::NAN)
            })
            .collect();

        let mut rows = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());
        for (sample, y) in samples.iter().zip(&future) {
            if y.is_nan() {
                continue;
            }
            rows.push(
                available
                    .iter()
                    .map(|c| sample.get(c).unwrap_or(f64::NAN))
                    .collect::<Vec<f64>>(),
            );
            labels.push(*y);
        }

        let features = if rows.is_empty() {
            Matrix::new(0, available.len(), Vec::new())
        } else {
            Matrix::from_rows(&rows)
        };

        Ok(Self {
            feature_names: available.iter().map(|c| c.to_string()).collect(),
            features,
            dropped_rows: samples.len() - labels.len(),
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.feature_names.iter().position(|n| n == name)?;
        Some(self.features.column(j))
    }

    /// Per-feature summaries followed by the label summary.
    pub fn describe(&self) -> Vec<ColumnSummary> {
        let mut out: Vec<ColumnSummary> = self
            .feature_names
            .iter()
            .enumerate()
            .map(|(j, name)| ColumnSummary::of(name, &self.features.column(j)))
            .collect();
        out.push(ColumnSummary::of(LABEL_COLUMN, &self.labels));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac_sample(t: f64, rssi: f64) -> Sample {
        Sample::new(StatFamily::Mac, t)
            .with("rnti", 17921.0)
            .with("phr", 40.0 + t)
            .with("wb_cqi", 12.0)
            .with("ul_rssi", rssi)
    }

    #[test]
    fn test_six_samples_shift_labels() {
        let samples: Vec<Sample> = (1..=6).map(|r| mac_sample(r as f64, r as f64)).collect();
        let ds = Dataset::from_mac_samples(&samples).unwrap();

        assert_eq!(ds.len(), 5, "last row has no future label");
        assert_eq!(ds.dropped_rows, 1);
        assert_eq!(ds.labels, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(ds.column("ul_rssi").unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ds.column("phr").unwrap(), vec![41.0, 42.0, 43.0, 44.0, 45.0]);
    }

    #[test]
    fn test_label_is_next_rssi() {
        let rssi = [-61.0, -62.5, -60.25, -70.0, -65.5, -64.0, -63.0];
        let samples: Vec<Sample> = rssi.iter().enumerate().map(|(i, r)| mac_sample(i as f64, *r)).collect();
        let ds = Dataset::from_mac_samples(&samples).unwrap();

        assert_eq!(ds.len(), samples.len() - 1);
        let x_rssi = ds.column("ul_rssi").unwrap();
        for i in 0..ds.len() - 1 {
            assert_eq!(ds.labels[i], x_rssi[i + 1]);
        }
    }

    #[test]
    fn test_feature_order_follows_fixed_list() {
        let samples = vec![mac_sample(0.0, 1.0), mac_sample(1.0, 2.0)];
        let ds = Dataset::from_mac_samples(&samples).unwrap();
        assert_eq!(ds.feature_names, vec!["rnti", "phr", "wb_cqi", "ul_rssi"]);
        assert!(ds.column("timestamp").is_none(), "timestamp is never a feature");
    }

    #[test]
    fn test_missing_label_field() {
        let samples = vec![
            Sample::new(StatFamily::Mac, 0.0).with("phr", 1.0),
            Sample::new(StatFamily::Mac, 1.0).with("phr", 2.0),
        ];
        match Dataset::from_mac_samples(&samples) {
            Err(XappError::MissingLabelField(f)) => assert_eq!(f, "ul_rssi"),
            other => panic!("expected MissingLabelField, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn test_no_samples() {
        assert!(matches!(
            Dataset::from_mac_samples(&[]),
            Err(XappError::NoSamples(StatFamily::Mac))
        ));
    }

    #[test]
    fn test_single_sample_yields_empty_dataset() {
        let ds = Dataset::from_mac_samples(&[mac_sample(0.0, -60.0)]).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.features.shape(), (0, 4));
    }

    #[test]
    fn test_gap_in_label_drops_preceding_row() {
        let samples = vec![
            mac_sample(0.0, 1.0),
            Sample::new(StatFamily::Mac, 1.0).with("rnti", 17921.0),
            mac_sample(2.0, 3.0),
            mac_sample(3.0, 4.0),
        ];
        let ds = Dataset::from_mac_samples(&samples).unwrap();
        // row 0 (next has no rssi) and row 3 (last) are dropped
        assert_eq!(ds.labels, vec![3.0, 4.0]);
        assert_eq!(ds.dropped_rows, 2);
        let x_rssi = ds.column("ul_rssi").unwrap();
        assert!(x_rssi[0].is_nan(), "missing cells become NaN");
    }

    #[test]
    fn test_describe_includes_label() {
        let samples: Vec<Sample> = (1..=4).map(|r| mac_sample(r as f64, r as f64)).collect();
        let ds = Dataset::from_mac_samples(&samples).unwrap();
        let summary = ds.describe();
        assert_eq!(summary.len(), ds.n_features() + 1);
        let last = summary.last().unwrap();
        assert_eq!(last.name, LABEL_COLUMN);
        assert_eq!(last.mean, 3.0);
    }
}
