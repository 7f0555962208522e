//! Search configuration loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::LoadOptions;
use crate::search::{
    Direction, FoldSizePolicy, ModelKind, ObjectiveMetric, SearchError, SearchSpace, StudyResult,
    StudySettings,
};
use crate::split::{PurgedSplitConfig, SplitError};
use crate::tracker::TrackerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid split configuration: {0}")]
    Split(#[from] SplitError),

    #[error("Invalid search configuration: {0}")]
    Search(#[from] SearchError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Dataset location and column naming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub columns: LoadOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveConfig {
    pub metric: ObjectiveMetric,
    pub size_policy: FoldSizePolicy,
}

/// Seed a study from an earlier study's best parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmStart {
    pub checkpoint: PathBuf,
    /// Parameters that stay searched; the rest are pinned.
    #[serde(default)]
    pub resample: Vec<String>,
}

/// Everything a `search` run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub model: ModelKind,
    pub study: StudySettings,
    pub split: PurgedSplitConfig,
    pub data: DataConfig,
    pub objective: ObjectiveConfig,
    pub tracker: TrackerConfig,
    /// Checkpoints and tracker files land here.
    pub output_dir: PathBuf,
    pub warm_start: Option<WarmStart>,
    /// Replaces the model preset space when set.
    pub space: Option<SearchSpace>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::for_model(ModelKind::Linear)
    }
}

impl SearchConfig {
    /// Preset matching the run scripts for each model family.
    pub fn for_model(model: ModelKind) -> Self {
        let (name, group_gap, direction, metric, size_policy) = match model {
            ModelKind::XGBoost => (
                "xgb",
                10,
                Direction::Maximize,
                ObjectiveMetric::Correlation,
                FoldSizePolicy::TrainAndValidation,
            ),
            ModelKind::LightGBM => (
                "lgb",
                10,
                Direction::Maximize,
                ObjectiveMetric::Correlation,
                FoldSizePolicy::TrainAndValidation,
            ),
            ModelKind::ResNet => (
                "nn",
                5,
                Direction::Minimize,
                ObjectiveMetric::Rmse,
                FoldSizePolicy::TrainOnly,
            ),
            ModelKind::Linear => (
                "linear",
                10,
                Direction::Maximize,
                ObjectiveMetric::Correlation,
                FoldSizePolicy::TrainAndValidation,
            ),
        };

        Self {
            model,
            study: StudySettings {
                name: name.to_string(),
                direction,
                ..StudySettings::default()
            },
            split: PurgedSplitConfig {
                group_gap,
                ..PurgedSplitConfig::default()
            },
            data: DataConfig::default(),
            objective: ObjectiveConfig {
                metric,
                size_policy,
            },
            tracker: TrackerConfig::default(),
            output_dir: PathBuf::from("hpo/params"),
            warm_start: None,
            space: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.split.validate()?;
        if self.study.name.trim().is_empty() {
            return Err(ConfigError::Invalid("study.name must not be empty".to_string()));
        }
        if self.study.n_trials == 0 {
            return Err(ConfigError::Invalid("study.n_trials must be positive".to_string()));
        }
        if self.study.parallelism == 0 {
            return Err(ConfigError::Invalid("study.parallelism must be positive".to_string()));
        }
        if self.study.pruner.is_enabled() && self.study.parallelism > 1 {
            return Err(ConfigError::Invalid(
                "study.pruner requires study.parallelism = 1".to_string(),
            ));
        }
        if let Some(space) = &self.space {
            space.validate()?;
        }
        Ok(())
    }

    /// Search space for this run, warm-started when configured.
    pub fn search_space(&self) -> Result<SearchSpace, ConfigError> {
        let space = match &self.space {
            Some(space) => space.clone().for_model(self.model),
            None => self.model.search_space(),
        };

        match &self.warm_start {
            Some(warm) => {
                let prior = StudyResult::load_checkpoint(&warm.checkpoint)?;
                let best = prior.best_params().ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "checkpoint {} has no completed trials",
                        warm.checkpoint.display()
                    ))
                })?;
                Ok(space.warm_started(best, &warm.resample))
            }
            None => Ok(space),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{ParamSpec, Pruner};
    use crate::tracker::TrackerKind;

    #[test]
    fn test_model_presets() {
        let xgb = SearchConfig::for_model(ModelKind::XGBoost);
        assert_eq!(xgb.split.n_splits, 5);
        assert_eq!(xgb.split.group_gap, 10);
        assert_eq!(xgb.study.n_trials, 100);
        assert_eq!(xgb.study.direction, Direction::Maximize);

        let nn = SearchConfig::for_model(ModelKind::ResNet);
        assert_eq!(nn.split.group_gap, 5);
        assert_eq!(nn.study.direction, Direction::Minimize);
        assert_eq!(nn.objective.size_policy, FoldSizePolicy::TrainOnly);
        assert_eq!(nn.objective.metric, ObjectiveMetric::Rmse);
    }

    #[test]
    fn test_missing_model_defaults_to_linear() {
        let config = SearchConfig::from_toml_str("output_dir = \"out\"\n").unwrap();
        assert_eq!(config.model, ModelKind::Linear);
        assert_eq!(config.study.name, "linear");
        assert_eq!(config.objective.metric, ObjectiveMetric::Correlation);
        assert_eq!(SearchConfig::default().model, ModelKind::Linear);
    }

    #[test]
    fn test_parse_toml() {
        let config = SearchConfig::from_toml_str(
            r#"
            model = "linear"
            output_dir = "out"

            [study]
            name = "baseline"
            n_trials = 12
            seed = 7
            parallelism = 2

            [split]
            n_splits = 4
            group_gap = 2
            max_train_group_size = 30

            [data]
            path = "data/train.csv"
            era_column = "era_id"

            [objective]
            size_policy = "train_only"

            [tracker]
            kind = "jsonl"
            required_token_env = "TRACKER_TOKEN"
            "#,
        )
        .unwrap();

        assert_eq!(config.model, ModelKind::Linear);
        assert_eq!(config.study.name, "baseline");
        assert_eq!(config.study.direction, Direction::Maximize);
        assert_eq!(config.split.n_splits, 4);
        assert_eq!(config.split.max_train_group_size, Some(30));
        assert_eq!(config.split.max_val_group_size, None);
        assert_eq!(config.data.columns.era_column, "era_id");
        assert_eq!(config.data.columns.target_column, "target");
        assert_eq!(config.objective.size_policy, FoldSizePolicy::TrainOnly);
        assert_eq!(config.tracker.kind, TrackerKind::Jsonl);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_parse_median_pruner() {
        let config = SearchConfig::from_toml_str(
            r#"
            [study.pruner]
            kind = "median"
            startup_trials = 5
            warmup_folds = 1
            "#,
        )
        .unwrap();
        assert_eq!(
            config.study.pruner,
            Pruner::Median {
                startup_trials: 5,
                warmup_folds: 1
            }
        );

        let err = SearchConfig::from_toml_str(
            "[study]\nparallelism = 4\n[study.pruner]\nkind = \"median\"\nstartup_trials = 1\nwarmup_folds = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_split() {
        let err = SearchConfig::from_toml_str("[split]\nn_splits = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Split(SplitError::InvalidConfig(_))));

        let err = SearchConfig::from_toml_str("[split]\nmax_val_group_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Split(_)));

        assert!(SearchConfig::from_toml_str("[split]\ngroup_gap = -1\n").is_err());
    }

    #[test]
    fn test_custom_space() {
        let config = SearchConfig::from_toml_str(
            r#"
            model = "lightgbm"

            [space.params.learning_rate]
            kind = "continuous"
            low = 0.01
            high = 0.1

            [space.params.boosting]
            kind = "categorical"
            choices = ["goss"]
            "#,
        )
        .unwrap();

        let space = config.search_space().unwrap();
        assert_eq!(space.dimensions(), 2);
        assert_eq!(space.model, Some(ModelKind::LightGBM));
        assert!(matches!(
            space.params.get("learning_rate"),
            Some(ParamSpec::Continuous { .. })
        ));
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let config = SearchConfig::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml"))
            .unwrap();
        assert_eq!(config.model, ModelKind::Linear);
    }
}
