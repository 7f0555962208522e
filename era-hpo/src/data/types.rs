//! In-memory dataset types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::loader::LoaderError;

/// Era-tagged tabular dataset with row-aligned features, targets and eras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraDataset {
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    target: Vec<f64>,
    eras: Vec<u32>,
}

impl EraDataset {
    /// Build a dataset, rejecting misaligned arrays or ragged rows.
    pub fn new(
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        target: Vec<f64>,
        eras: Vec<u32>,
    ) -> Result<Self, LoaderError> {
        if features.len() != target.len() || target.len() != eras.len() {
            return Err(LoaderError::InvalidData(format!(
                "Misaligned columns: {} feature rows, {} targets, {} eras",
                features.len(),
                target.len(),
                eras.len()
            )));
        }
        if let Some(row) = features.iter().position(|r| r.len() != feature_names.len()) {
            return Err(LoaderError::InvalidData(format!(
                "Row {} has {} features, expected {}",
                row,
                features[row].len(),
                feature_names.len()
            )));
        }

        Ok(Self {
            feature_names,
            features,
            target,
            eras,
        })
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn eras(&self) -> &[u32] {
        &self.eras
    }

    /// Sample counts per era, in first-occurrence order.
    pub fn era_counts(&self) -> Vec<(u32, usize)> {
        let mut position: HashMap<u32, usize> = HashMap::new();
        let mut counts: Vec<(u32, usize)> = Vec::new();
        for &era in &self.eras {
            let pos = *position.entry(era).or_insert_with(|| {
                counts.push((era, 0));
                counts.len() - 1
            });
            counts[pos].1 += 1;
        }
        counts
    }

    /// Copy the given rows into a standalone fold dataset.
    pub fn gather(&self, indices: &[usize]) -> FoldData {
        let mut features = Vec::with_capacity(indices.len());
        let mut target = Vec::with_capacity(indices.len());
        let mut eras = Vec::with_capacity(indices.len());

        for &i in indices {
            features.push(self.features[i].clone());
            target.push(self.target[i]);
            eras.push(self.eras[i]);
        }

        FoldData {
            features,
            target,
            eras,
        }
    }
}

/// Rows of an [`EraDataset`] selected for one side of one fold.
#[derive(Debug, Clone, Default)]
pub struct FoldData {
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
    pub eras: Vec<u32>,
}

impl FoldData {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.first().map(Vec::len).unwrap_or(0)
    }
}
