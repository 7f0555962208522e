//! Dataset loader for era-tagged tournament files.
//!
//! Reads CSV or Parquet files with one row per sample:
//! - an era column (`era12` style strings or plain integers)
//! - a target column
//! - feature columns sharing a common name prefix
//!
//! Any other columns are ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::types::EraDataset;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Column naming conventions for a dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub era_column: String,
    pub target_column: String,
    pub feature_prefix: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            era_column: "era".to_string(),
            target_column: "target".to_string(),
            feature_prefix: "feature".to_string(),
        }
    }
}

/// Loads an [`EraDataset`] from disk.
pub struct DataLoader {
    path: PathBuf,
    options: LoadOptions,
}

impl DataLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Read the raw file as a DataFrame.
    pub fn load_dataframe(&self) -> Result<DataFrame, LoaderError> {
        if !self.path.exists() {
            return Err(LoaderError::FileNotFound(self.path.display().to_string()));
        }

        let extension = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let df = match extension.as_str() {
            "parquet" => LazyFrame::scan_parquet(&self.path, ScanArgsParquet::default())?.collect()?,
            "csv" => LazyCsvReader::new(&self.path)
                .with_has_header(true)
                .finish()?
                .collect()?,
            other => return Err(LoaderError::UnsupportedFormat(other.to_string())),
        };

        Ok(df)
    }

    /// Load and preprocess the dataset.
    pub fn load(&self) -> Result<EraDataset, LoaderError> {
        let df = self.load_dataframe()?;
        let dataset = dataframe_to_dataset(&df, &self.options)?;

        info!(
            "Loaded {} rows, {} features, {} eras from {}",
            dataset.len(),
            dataset.n_features(),
            dataset.era_counts().len(),
            self.path.display()
        );

        Ok(dataset)
    }
}

/// Convert a DataFrame into an [`EraDataset`].
///
/// Rows with a missing target are dropped. Missing feature values are
/// filled with the column mean over the retained rows.
pub fn dataframe_to_dataset(df: &DataFrame, options: &LoadOptions) -> Result<EraDataset, LoaderError> {
    let feature_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str().starts_with(&options.feature_prefix))
        .map(|name| name.to_string())
        .collect();

    if feature_names.is_empty() {
        return Err(LoaderError::InvalidData(format!(
            "No columns with prefix '{}'",
            options.feature_prefix
        )));
    }

    let target = float_column(df, &options.target_column)?;
    let era_labels = era_column(df, &options.era_column)?;
    let eras = era_ordinals(&era_labels);

    let mut kept = Vec::with_capacity(df.height());
    let mut targets = Vec::with_capacity(df.height());
    for (row, value) in target.into_iter().enumerate() {
        if let Some(y) = value.filter(|y| !y.is_nan()) {
            kept.push(row);
            targets.push(y);
        }
    }

    let dropped = df.height() - kept.len();
    if dropped > 0 {
        warn!("Dropped {} rows with missing target", dropped);
    }

    let columns = feature_names
        .iter()
        .map(|name| {
            float_column(df, name).map(|values| fill_with_mean(kept.iter().map(|&row| values[row]).collect()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let features = (0..kept.len())
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect();
    let row_eras = kept.iter().map(|&row| eras[row]).collect();

    EraDataset::new(feature_names, features, targets, row_eras)
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, LoaderError> {
    let column = df
        .column(name)
        .map_err(|_| LoaderError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn era_column(df: &DataFrame, name: &str) -> Result<Vec<String>, LoaderError> {
    let column = df
        .column(name)
        .map_err(|_| LoaderError::MissingColumn(name.to_string()))?;

    let labels: Vec<Option<String>> = if let Ok(ca) = column.str() {
        ca.into_iter().map(|s| s.map(str::to_string)).collect()
    } else {
        let ints = column.cast(&DataType::Int64)?;
        ints.i64()?.into_iter().map(|v| v.map(|v| v.to_string())).collect()
    };

    labels
        .into_iter()
        .enumerate()
        .map(|(row, label)| {
            label.ok_or_else(|| LoaderError::InvalidData(format!("Missing era at row {}", row)))
        })
        .collect()
}

fn fill_with_mean(values: Vec<Option<f64>>) -> Vec<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().filter(|v| !v.is_nan()).collect();
    let mean = if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    };

    values
        .into_iter()
        .map(|v| match v {
            Some(v) if !v.is_nan() => v,
            _ => mean,
        })
        .collect()
}

/// Parse an era label such as `era12`, `ERA12` or `12`.
pub fn parse_era(label: &str) -> Option<u32> {
    let trimmed = label.trim();
    let digits = match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("era") => &trimmed[3..],
        _ => trimmed,
    };
    digits.parse().ok()
}

/// Map era labels to ordinals.
///
/// Parseable labels keep their numeric value. If any label cannot be
/// parsed, every label is numbered by first occurrence instead.
pub fn era_ordinals(labels: &[String]) -> Vec<u32> {
    let parsed: Option<Vec<u32>> = labels.iter().map(|l| parse_era(l)).collect();
    if let Some(parsed) = parsed {
        return parsed;
    }

    warn!("Era labels are not numeric; numbering eras by first occurrence");
    let mut seen: HashMap<&str, u32> = HashMap::new();
    labels
        .iter()
        .map(|l| {
            let next = seen.len() as u32;
            *seen.entry(l.as_str()).or_insert(next)
        })
        .collect()
}
