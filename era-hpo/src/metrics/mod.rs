//! Scoring module.
//!
//! Provides the per-fold score and the cross-fold aggregate:
//! - Rank correlation between predictions and targets
//! - RMSE for regression diagnostics
//! - Sample-weighted mean over folds

pub mod calculator;

pub use calculator::{rmse, score, weighted_mean, MetricsError, ScoreFrame};
