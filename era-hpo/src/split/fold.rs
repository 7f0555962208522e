//! Fold types produced by the splitter.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Group-level layout of a single fold.
///
/// Ranges are positions in first-occurrence group order, not sample indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldWindow {
    /// Fold number (0-indexed).
    pub fold: usize,
    /// Groups used for training.
    pub train_groups: Range<usize>,
    /// Groups dropped between training and validation.
    pub purged_groups: Range<usize>,
    /// Groups used for validation.
    pub validation_groups: Range<usize>,
}

impl FoldWindow {
    pub fn train_group_count(&self) -> usize {
        self.train_groups.len()
    }

    pub fn purged_group_count(&self) -> usize {
        self.purged_groups.len()
    }

    pub fn validation_group_count(&self) -> usize {
        self.validation_groups.len()
    }
}

/// Why a fold cannot be trained or scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegenerateFold {
    /// The purge gap consumed the whole training window.
    EmptyTrain,
    /// No validation samples were retained.
    EmptyValidation,
}

impl fmt::Display for DegenerateFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTrain => write!(f, "empty training set"),
            Self::EmptyValidation => write!(f, "empty validation set"),
        }
    }
}

/// A single train/validation partition of sample indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Group-level layout this fold was built from.
    pub window: FoldWindow,
    /// Sample indices for training.
    pub train_indices: Vec<usize>,
    /// Sample indices for validation.
    pub validation_indices: Vec<usize>,
}

impl Fold {
    pub fn number(&self) -> usize {
        self.window.fold
    }

    pub fn train_len(&self) -> usize {
        self.train_indices.len()
    }

    pub fn validation_len(&self) -> usize {
        self.validation_indices.len()
    }

    /// Total samples touched by this fold.
    pub fn total_len(&self) -> usize {
        self.train_len() + self.validation_len()
    }

    /// Report an empty side, if any. Empty training takes precedence.
    pub fn degeneracy(&self) -> Option<DegenerateFold> {
        if self.train_indices.is_empty() {
            Some(DegenerateFold::EmptyTrain)
        } else if self.validation_indices.is_empty() {
            Some(DegenerateFold::EmptyValidation)
        } else {
            None
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.degeneracy().is_some()
    }
}
