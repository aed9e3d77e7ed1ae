//! Outlier fences for unit price and quantity.

use crate::config::OutlierMethod;

/// Inclusive acceptance band. Values outside it are outliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fence {
    pub lower: f64,
    pub upper: f64,
}

impl Fence {
    pub fn admits(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Compute the fence for `values`. Returns `None` for an empty sample.
pub fn fence(values: &[f64], method: OutlierMethod, threshold: f64) -> Option<Fence> {
    if values.is_empty() {
        return None;
    }
    match method {
        OutlierMethod::Iqr => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let iqr = q3 - q1;
            Some(Fence {
                lower: q1 - threshold * iqr,
                upper: q3 + threshold * iqr,
            })
        }
        OutlierMethod::Zscore => {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let spread = threshold * variance.sqrt();
            Some(Fence {
                lower: mean - spread,
                upper: mean + spread,
            })
        }
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let weight = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * weight
}
