//! Aggregate statistics over a metric series

use serde::{Deserialize, Serialize};

/// Summary of a set of samples
///
/// All fields are zero for an empty input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub p95: f64,
    pub p99: f64,
}

impl MetricStats {
    /// Compute statistics over `values`
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Self {
            avg: sum / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            count,
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }
}

/// Nearest-rank percentile of `values` for `p` in `0..=100`
///
/// Sorts a copy ascending and takes index `ceil(p / 100 * n) - 1`, clamped to
/// the valid range. No interpolation. Returns `0.0` for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    nearest_rank(&sorted, p)
}

fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p * n as f64 / 100.0).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    sorted[index]
}
