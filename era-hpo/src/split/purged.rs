//! Purged group time-series splitter.
//!
//! Validation windows are sized as `groups / (n_splits + 1)` so that
//! `n_splits` windows plus one leading training-only segment fit into the
//! group count. The last window absorbs any remainder groups.

use std::hash::Hash;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::fold::{Fold, FoldWindow};
use super::groups::GroupIndex;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error("Invalid split configuration: {0}")]
    InvalidConfig(String),

    #[error("Insufficient groups: need at least {required}, found {found}")]
    InsufficientGroups { required: usize, found: usize },
}

/// Configuration for the purged splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgedSplitConfig {
    /// Number of folds to produce.
    pub n_splits: usize,
    /// Groups purged immediately before each validation window.
    pub group_gap: usize,
    /// Keep only this many of the most recent training groups.
    pub max_train_group_size: Option<usize>,
    /// Keep only this many of the earliest validation groups.
    pub max_val_group_size: Option<usize>,
}

impl Default for PurgedSplitConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            group_gap: 10,
            max_train_group_size: None,
            max_val_group_size: None,
        }
    }
}

impl PurgedSplitConfig {
    pub fn new(n_splits: usize, group_gap: usize) -> Self {
        Self {
            n_splits,
            group_gap,
            ..Self::default()
        }
    }

    pub fn with_max_train_group_size(mut self, groups: usize) -> Self {
        self.max_train_group_size = Some(groups);
        self
    }

    pub fn with_max_val_group_size(mut self, groups: usize) -> Self {
        self.max_val_group_size = Some(groups);
        self
    }

    /// Check the configuration independently of any data.
    pub fn validate(&self) -> Result<(), SplitError> {
        if self.n_splits < 2 {
            return Err(SplitError::InvalidConfig(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if self.max_train_group_size == Some(0) {
            return Err(SplitError::InvalidConfig(
                "max_train_group_size must be positive".to_string(),
            ));
        }
        if self.max_val_group_size == Some(0) {
            return Err(SplitError::InvalidConfig(
                "max_val_group_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum number of distinct groups this configuration can split.
    ///
    /// Saturates at `usize::MAX`, which no sequence can satisfy.
    pub fn required_groups(&self) -> usize {
        self.n_splits.saturating_add(1)
    }
}

/// Forward-chaining group splitter with a purge gap.
///
/// Stateless: every call to [`split`](Self::split) recomputes from its input.
#[derive(Debug, Clone)]
pub struct PurgedGroupTimeSeriesSplit {
    config: PurgedSplitConfig,
}

impl PurgedGroupTimeSeriesSplit {
    /// Create a splitter, rejecting invalid configurations up front.
    pub fn new(config: PurgedSplitConfig) -> Result<Self, SplitError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PurgedSplitConfig {
        &self.config
    }

    pub fn n_splits(&self) -> usize {
        self.config.n_splits
    }

    /// Group-level fold layout for a sequence with `n_groups` distinct groups.
    pub fn windows(&self, n_groups: usize) -> Result<Vec<FoldWindow>, SplitError> {
        let required = self.config.required_groups();
        if n_groups < required {
            return Err(SplitError::InsufficientGroups {
                required,
                found: n_groups,
            });
        }

        let n_splits = self.config.n_splits;
        let validation_size = n_groups / required;

        let windows = (0..n_splits)
            .map(|k| {
                let val_start = validation_size * (k + 1);
                let mut val_end = if k + 1 == n_splits {
                    n_groups
                } else {
                    val_start + validation_size
                };
                if let Some(cap) = self.config.max_val_group_size {
                    val_end = val_end.min(val_start.saturating_add(cap));
                }

                let train_end = val_start.saturating_sub(self.config.group_gap);
                let train_start = match self.config.max_train_group_size {
                    Some(cap) => train_end.saturating_sub(cap),
                    None => 0,
                };

                FoldWindow {
                    fold: k,
                    train_groups: train_start..train_end,
                    purged_groups: train_end..val_start,
                    validation_groups: val_start..val_end,
                }
            })
            .collect();

        Ok(windows)
    }

    /// Group-level fold layout for a label sequence.
    pub fn plan<G>(&self, groups: &[G]) -> Result<Vec<FoldWindow>, SplitError>
    where
        G: Eq + Hash + Clone,
    {
        self.windows(GroupIndex::build(groups).len())
    }

    /// Produce the folds for a label sequence.
    ///
    /// Group counting happens here, so an unsplittable sequence fails before
    /// the first fold is requested. Index sets are materialized lazily, one
    /// fold per `next()`.
    pub fn split<G>(&self, groups: &[G]) -> Result<PurgedGroupSplits, SplitError>
    where
        G: Eq + Hash + Clone + std::fmt::Debug,
    {
        let index = GroupIndex::build(groups);

        let broken = index.non_contiguous_groups();
        if !broken.is_empty() {
            warn!(
                "{} group(s) are not contiguous in sample order (first: {:?}); folds may leak",
                broken.len(),
                broken[0]
            );
        }

        let windows = self.windows(index.len())?;
        debug!(
            "Splitting {} samples across {} groups into {} folds",
            groups.len(),
            index.len(),
            windows.len()
        );

        Ok(PurgedGroupSplits {
            members: index.into_members(),
            windows: windows.into_iter(),
        })
    }
}

/// Lazy fold sequence returned by [`PurgedGroupTimeSeriesSplit::split`].
#[derive(Debug)]
pub struct PurgedGroupSplits {
    members: Vec<Vec<usize>>,
    windows: std::vec::IntoIter<FoldWindow>,
}

impl PurgedGroupSplits {
    fn gather(&self, range: std::ops::Range<usize>) -> Vec<usize> {
        self.members[range].iter().flatten().copied().collect()
    }
}

impl Iterator for PurgedGroupSplits {
    type Item = Fold;

    fn next(&mut self) -> Option<Fold> {
        let window = self.windows.next()?;

        let fold = Fold {
            train_indices: self.gather(window.train_groups.clone()),
            validation_indices: self.gather(window.validation_groups.clone()),
            window,
        };

        // Emitted anyway so fold numbering stays aligned with n_splits.
        if let Some(reason) = fold.degeneracy() {
            warn!(
                "Fold {} is degenerate ({}): train groups {:?}, purged {:?}, validation {:?}",
                fold.number(),
                reason,
                fold.window.train_groups,
                fold.window.purged_groups,
                fold.window.validation_groups
            );
        }

        Some(fold)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.windows.size_hint()
    }
}

impl ExactSizeIterator for PurgedGroupSplits {}
