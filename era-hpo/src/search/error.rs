use thiserror::Error;

use crate::metrics::MetricsError;
use crate::split::{DegenerateFold, SplitError};
use crate::tracker::TrackerError;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid search space: {0}")]
    InvalidSpace(String),

    #[error("Missing parameter: {0}")]
    MissingParam(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Fold {fold} is degenerate: {reason}")]
    DegenerateFold { fold: usize, reason: DegenerateFold },

    #[error("Pruned after fold {fold} (intermediate value {value:.5})")]
    Pruned { fold: usize, value: f64 },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("No completed trials in study '{0}'")]
    NoCompletedTrials(String),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn invalid_param(name: &str, reason: &str) -> Self {
        Self::InvalidParam {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
