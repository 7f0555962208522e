//! Fold scoring and cross-fold aggregation.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Total weight is zero")]
    ZeroWeight,
}

/// Predictions and targets for one validation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreFrame {
    pub preds: Vec<f64>,
    pub target: Vec<f64>,
}

impl ScoreFrame {
    pub fn new(preds: Vec<f64>, target: Vec<f64>) -> Result<Self, MetricsError> {
        if preds.len() != target.len() {
            return Err(MetricsError::LengthMismatch {
                left: preds.len(),
                right: target.len(),
            });
        }
        Ok(Self { preds, target })
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }
}

/// Correlation between the target and the percentile rank of predictions.
///
/// Ties in `preds` are ranked by position. Returns 0.0 when fewer than two
/// rows are present or either column is constant.
pub fn score(frame: &ScoreFrame) -> f64 {
    if frame.len() < 2 {
        return 0.0;
    }
    let ranks = percentile_rank(&frame.preds);
    pearson(&frame.target, &ranks)
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sse / n as f64).sqrt()
}

/// `sum(score_i * size_i) / sum(size_i)`.
pub fn weighted_mean(scores: &[f64], sizes: &[usize]) -> Result<f64, MetricsError> {
    if scores.len() != sizes.len() {
        return Err(MetricsError::LengthMismatch {
            left: scores.len(),
            right: sizes.len(),
        });
    }

    let total: usize = sizes.iter().sum();
    if total == 0 {
        return Err(MetricsError::ZeroWeight);
    }

    let weighted: f64 = scores
        .iter()
        .zip(sizes)
        .map(|(s, &n)| s * n as f64)
        .sum();
    Ok(weighted / total as f64)
}

/// Percentile ranks in (0, 1], ties broken by first occurrence.
fn percentile_rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let n = values.len() as f64;
    let mut ranks = vec![0.0; values.len()];
    for (rank, &idx) in order.iter().enumerate() {
        ranks[idx] = (rank + 1) as f64 / n;
    }
    ranks
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let sx = x.iter().std_dev();
    let sy = y.iter().std_dev();
    if !(sx > 0.0 && sy > 0.0) {
        return 0.0;
    }
    x.iter().covariance(y.iter()) / (sx * sy)
}
