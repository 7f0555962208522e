use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::search::{StudyResult, Trial, TrialState};

use super::jsonl::JsonlTracker;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Tracker token not set: environment variable {0} is missing or empty")]
    MissingToken(String),

    #[error("Tracker used before start()")]
    NotStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives study progress.
pub trait TrackerSink {
    fn start(&mut self, study: &str) -> Result<(), TrackerError>;

    fn log_trial(&mut self, trial: &Trial) -> Result<(), TrackerError>;

    fn finish(&mut self, result: &StudyResult) -> Result<(), TrackerError>;
}

/// Name of the experiment a study is reported under.
pub(crate) fn experiment_name(experiment: Option<&str>, study: &str) -> String {
    experiment
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_HPO", study))
}

/// Reports through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogTracker {
    project: String,
    experiment: Option<String>,
}

impl LogTracker {
    pub fn new(project: &str, experiment: Option<&str>) -> Self {
        Self {
            project: project.to_string(),
            experiment: experiment.map(str::to_string),
        }
    }
}

impl TrackerSink for LogTracker {
    fn start(&mut self, study: &str) -> Result<(), TrackerError> {
        let name = experiment_name(self.experiment.as_deref(), study);
        info!("Tracking experiment '{}' in project '{}'", name, self.project);
        self.experiment = Some(name);
        Ok(())
    }

    fn log_trial(&mut self, trial: &Trial) -> Result<(), TrackerError> {
        match trial.value {
            None if trial.state == TrialState::Pruned => info!(
                "Trial {} pruned ({}) params {}",
                trial.number,
                trial.error.as_deref().unwrap_or("no reason recorded"),
                trial.params.key()
            ),
            Some(value) => info!(
                "Trial {} value {:.5} params {}",
                trial.number,
                value,
                trial.params.key()
            ),
            None => info!(
                "Trial {} failed ({}) params {}",
                trial.number,
                trial.error.as_deref().unwrap_or("unknown error"),
                trial.params.key()
            ),
        }
        debug!("Trial {} fold scores {:?}", trial.number, trial.fold_scores());
        Ok(())
    }

    fn finish(&mut self, result: &StudyResult) -> Result<(), TrackerError> {
        info!(
            "Experiment '{}' finished: {} completed, {} pruned, {} failed",
            self.experiment.as_deref().unwrap_or(&result.name),
            result.completed(),
            result.pruned(),
            result.failed()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    #[default]
    Log,
    Jsonl,
}

/// Tracker section of the search configuration.
///
/// Credentials are never stored here. `required_token_env` names an
/// environment variable that must be set before the study starts; the local
/// sinks check it but never read or write its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub kind: TrackerKind,
    pub project: String,
    /// Defaults to `<study>_HPO`.
    pub experiment: Option<String>,
    /// JSONL output path; defaults to `<output_dir>/<study>_trials.jsonl`.
    pub path: Option<PathBuf>,
    pub required_token_env: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            kind: TrackerKind::Log,
            project: "era-hpo".to_string(),
            experiment: None,
            path: None,
            required_token_env: None,
        }
    }
}

impl TrackerConfig {
    /// Read the API token from the configured environment variable.
    ///
    /// Returns `Ok(None)` when no variable is configured.
    pub fn resolve_token(&self) -> Result<Option<String>, TrackerError> {
        let Some(var) = &self.required_token_env else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(Some(token)),
            _ => Err(TrackerError::MissingToken(var.clone())),
        }
    }

    /// Fail early when a required token variable is unset.
    pub fn preflight(&self) -> Result<(), TrackerError> {
        if self.resolve_token()?.is_some() {
            debug!("Required tracker token present for project '{}'", self.project);
        }
        Ok(())
    }

    /// Build the configured sink for `study`, writing files under `output_dir`.
    pub fn build(&self, study: &str, output_dir: &std::path::Path) -> Result<Box<dyn TrackerSink>, TrackerError> {
        self.preflight()?;

        match self.kind {
            TrackerKind::Log => Ok(Box::new(LogTracker::new(
                &self.project,
                self.experiment.as_deref(),
            ))),
            TrackerKind::Jsonl => {
                let path = self
                    .path
                    .clone()
                    .unwrap_or_else(|| output_dir.join(format!("{}_trials.jsonl", study)));
                Ok(Box::new(JsonlTracker::create(
                    &path,
                    &self.project,
                    self.experiment.as_deref(),
                )?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_name() {
        assert_eq!(experiment_name(None, "xgb"), "xgb_HPO");
        assert_eq!(experiment_name(Some("custom"), "xgb"), "custom");
    }

    #[test]
    fn test_resolve_token() {
        let none = TrackerConfig::default();
        assert_eq!(none.resolve_token().unwrap(), None);

        let var = "ERA_HPO_TEST_TOKEN_RESOLVE";
        let config = TrackerConfig {
            required_token_env: Some(var.to_string()),
            ..TrackerConfig::default()
        };

        std::env::remove_var(var);
        assert!(matches!(config.resolve_token(), Err(TrackerError::MissingToken(v)) if v == var));

        std::env::set_var(var, "secret");
        assert_eq!(config.resolve_token().unwrap().as_deref(), Some("secret"));
        std::env::remove_var(var);
    }

    #[test]
    fn test_build_requires_token_variable() {
        let dir = tempfile::tempdir().unwrap();
        let var = "ERA_HPO_TEST_TOKEN_BUILD";
        let config = TrackerConfig {
            required_token_env: Some(var.to_string()),
            ..TrackerConfig::default()
        };

        std::env::remove_var(var);
        assert!(matches!(
            config.build("xgb", dir.path()),
            Err(TrackerError::MissingToken(_))
        ));

        std::env::set_var(var, "secret");
        assert!(config.preflight().is_ok());
        assert!(config.build("xgb", dir.path()).is_ok());
        std::env::remove_var(var);
    }

    #[test]
    fn test_build_jsonl_default_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig {
            kind: TrackerKind::Jsonl,
            ..TrackerConfig::default()
        };

        let mut sink = config.build("xgb", dir.path()).unwrap();
        sink.start("xgb").unwrap();
        assert!(dir.path().join("xgb_trials.jsonl").exists());
    }

    #[test]
    fn test_log_tracker_records_experiment() {
        let mut tracker = LogTracker::new("proj", None);
        tracker.start("lgb").unwrap();
        assert_eq!(tracker.experiment.as_deref(), Some("lgb_HPO"));
    }
}
