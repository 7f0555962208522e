//! Purged group time-series cross-validation.
//!
//! Splits an era-tagged sample sequence into forward-chaining folds:
//! - Validation windows walk forward through the eras
//! - Training always precedes validation in era order
//! - A gap of eras before each validation window is purged from training

pub mod fold;
pub mod groups;
pub mod purged;

pub use fold::{DegenerateFold, Fold, FoldWindow};
pub use groups::GroupIndex;
pub use purged::{PurgedGroupSplits, PurgedGroupTimeSeriesSplit, PurgedSplitConfig, SplitError};
