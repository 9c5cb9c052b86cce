//! NaN-aware column statistics.

use serde::Serialize;

fn present(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

pub fn count(values: &[f64]) -> usize {
    present(values).count()
}

pub fn mean(values: &[f64]) -> f64 {
    let n = count(values);
    if n == 0 {
        return f64::NAN;
    }
    present(values).sum::<f64>() / n as f64
}

/// Variance with `ddof` delta degrees of freedom; NaN when too few values.
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    let n = count(values);
    if n <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    present(values).map(|v| (v - m) * (v - m)).sum::<f64>() / (n - ddof) as f64
}

pub fn min(values: &[f64]) -> f64 {
    present(values).fold(f64::NAN, f64::min)
}

pub fn max(values: &[f64]) -> f64 {
    present(values).fold(f64::NAN, f64::max)
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl ColumnSummary {
    pub fn of(name: &str, values: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            count: count(values),
            mean: mean(values),
            std: variance(values, 1).sqrt(),
            min: min(values),
            max: max(values),
        }
    }
}
