//! Study driver: sample trials, evaluate them, keep the best.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::EraDataset;
use crate::tracker::TrackerSink;

use super::error::SearchError;
use super::models::ModelKind;
use super::objective::{running_mean, CvObjective, FoldEvaluation};
use super::space::{ParamSet, SearchSpace};

/// Whether larger or smaller objective values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Maximize,
    Minimize,
}

impl Direction {
    /// True when `candidate` strictly improves on `incumbent`.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Complete,
    /// Stopped early by the study's pruner.
    Pruned,
    Failed,
}

/// Early stopping of weak trials from per-fold intermediate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pruner {
    #[default]
    None,
    /// Stop a trial whose running value after a fold is worse than the
    /// median of completed trials at the same fold.
    Median {
        /// Completed trials required before pruning starts.
        startup_trials: usize,
        /// Folds always evaluated before pruning is considered.
        warmup_folds: usize,
    },
}

impl Pruner {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn should_prune(&self, direction: Direction, history: &[Trial], fold: usize, value: f64) -> bool {
        let Self::Median {
            startup_trials,
            warmup_folds,
        } = *self
        else {
            return false;
        };
        if fold < warmup_folds {
            return false;
        }

        let mut prior: Vec<f64> = history
            .iter()
            .filter(|t| t.is_complete())
            .filter_map(|t| t.intermediate(fold))
            .filter(|v| v.is_finite())
            .collect();
        if prior.is_empty() || prior.len() < startup_trials {
            return false;
        }

        prior.sort_by(f64::total_cmp);
        let mid = prior.len() / 2;
        let median = if prior.len() % 2 == 0 {
            (prior[mid - 1] + prior[mid]) / 2.0
        } else {
            prior[mid]
        };
        direction.is_better(median, value)
    }
}

/// One evaluated parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub number: usize,
    pub params: ParamSet,
    pub state: TrialState,
    pub value: Option<f64>,
    #[serde(default)]
    pub folds: Vec<FoldEvaluation>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Trial {
    fn run(
        number: usize,
        params: ParamSet,
        objective: &CvObjective,
        dataset: &EraDataset,
        should_prune: &mut dyn FnMut(usize, f64) -> bool,
    ) -> Self {
        let outcome = objective
            .evaluate_with_pruning(&params, dataset, should_prune)
            .and_then(|eval| {
                if eval.value.is_finite() {
                    Ok(eval)
                } else {
                    Err(SearchError::Training(format!("objective value is {}", eval.value)))
                }
            });

        match outcome {
            Ok(eval) => Self {
                number,
                params,
                state: TrialState::Complete,
                value: Some(eval.value),
                folds: eval.folds,
                error: None,
            },
            Err(e @ SearchError::Pruned { .. }) => {
                info!("Trial {} pruned: {}", number, e);
                Self {
                    number,
                    params,
                    state: TrialState::Pruned,
                    value: None,
                    folds: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
            Err(e) => {
                warn!("Trial {} failed: {}", number, e);
                Self {
                    number,
                    params,
                    state: TrialState::Failed,
                    value: None,
                    folds: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete
    }

    /// Running weighted mean after `fold`, if that fold was evaluated.
    pub fn intermediate(&self, fold: usize) -> Option<f64> {
        self.folds
            .get(..=fold)
            .and_then(|folds| running_mean(folds).ok())
    }

    pub fn fold_scores(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.score).collect()
    }

    pub fn fold_sizes(&self) -> Vec<usize> {
        self.folds.iter().map(|f| f.weight).collect()
    }
}

/// Study-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudySettings {
    /// Study name, also the checkpoint file prefix.
    pub name: String,
    pub direction: Direction,
    pub n_trials: usize,
    /// Seed for parameter sampling.
    pub seed: u64,
    /// Trials evaluated concurrently. 1 runs serially.
    pub parallelism: usize,
    /// Pruning needs earlier trials' results, so it requires serial runs.
    pub pruner: Pruner,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            name: "study".to_string(),
            direction: Direction::Maximize,
            n_trials: 100,
            seed: 0,
            parallelism: 1,
            pruner: Pruner::None,
        }
    }
}

/// Random-search study over a [`SearchSpace`].
pub struct Study {
    settings: StudySettings,
    space: SearchSpace,
}

impl Study {
    pub fn new(settings: StudySettings, space: SearchSpace) -> Result<Self, SearchError> {
        space.validate()?;
        if settings.n_trials == 0 {
            return Err(SearchError::invalid_param("n_trials", "must be positive"));
        }
        if settings.parallelism == 0 {
            return Err(SearchError::invalid_param("parallelism", "must be positive"));
        }
        if settings.pruner.is_enabled() && settings.parallelism > 1 {
            return Err(SearchError::invalid_param(
                "pruner",
                "pruning requires parallelism = 1",
            ));
        }
        Ok(Self { settings, space })
    }

    pub fn settings(&self) -> &StudySettings {
        &self.settings
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Draw every trial's parameters up front from the seeded RNG.
    pub fn sample_trials(&self) -> Vec<ParamSet> {
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        (0..self.settings.n_trials)
            .map(|_| self.space.sample(&mut rng))
            .collect()
    }

    /// Run the study.
    pub fn optimize(
        &self,
        objective: &CvObjective,
        dataset: &EraDataset,
        tracker: &mut dyn TrackerSink,
    ) -> Result<StudyResult, SearchError> {
        self.optimize_with_progress(objective, dataset, tracker, &|_| {})
    }

    /// Run the study, calling `on_trial` as each trial finishes.
    pub fn optimize_with_progress(
        &self,
        objective: &CvObjective,
        dataset: &EraDataset,
        tracker: &mut dyn TrackerSink,
        on_trial: &(dyn Fn(&Trial) + Sync),
    ) -> Result<StudyResult, SearchError> {
        let started = Utc::now();
        let draws = self.sample_trials();

        info!(
            "Study '{}': {} trials over {} parameters, {} folds per trial, trainer {}",
            self.settings.name,
            draws.len(),
            self.space.dimensions(),
            objective.splitter().n_splits(),
            objective.trainer_name()
        );

        tracker.start(&self.settings.name)?;

        let trials: Vec<Trial> = if self.settings.parallelism <= 1 {
            let mut trials = Vec::with_capacity(draws.len());
            let pruner = self.settings.pruner;
            let direction = self.settings.direction;
            for (number, params) in draws.into_iter().enumerate() {
                let trial = Trial::run(number, params, objective, dataset, &mut |fold, value| {
                    pruner.should_prune(direction, &trials, fold, value)
                });
                on_trial(&trial);
                tracker.log_trial(&trial)?;
                trials.push(trial);
            }
            trials
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.parallelism)
                .build()
                .map_err(|e| SearchError::invalid_param("parallelism", &e.to_string()))?;

            let trials: Vec<Trial> = pool.install(|| {
                draws
                    .into_par_iter()
                    .enumerate()
                    .map(|(number, params)| {
                        let trial = Trial::run(number, params, objective, dataset, &mut |_, _| false);
                        on_trial(&trial);
                        trial
                    })
                    .collect()
            });

            for trial in &trials {
                tracker.log_trial(trial)?;
            }
            trials
        };

        let result = StudyResult {
            name: self.settings.name.clone(),
            direction: self.settings.direction,
            model: self.space.model,
            started,
            finished: Utc::now(),
            trials,
        };

        tracker.finish(&result)?;

        match result.best_trial() {
            Some(best) => info!(
                "Study '{}' complete: best trial {} value {:.5} ({}/{} trials completed)",
                result.name,
                best.number,
                best.value.unwrap_or(f64::NAN),
                result.completed(),
                result.trials.len()
            ),
            None => return Err(SearchError::NoCompletedTrials(result.name)),
        }

        Ok(result)
    }
}

/// Finished study, also the on-disk checkpoint format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyResult {
    pub name: String,
    pub direction: Direction,
    #[serde(default)]
    pub model: Option<ModelKind>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub trials: Vec<Trial>,
}

impl StudyResult {
    /// Best completed trial; ties keep the earlier trial.
    pub fn best_trial(&self) -> Option<&Trial> {
        self.trials
            .iter()
            .filter(|t| t.is_complete())
            .filter_map(|t| t.value.filter(|v| v.is_finite()).map(|v| (t, v)))
            .fold(None, |best: Option<(&Trial, f64)>, (t, v)| match best {
                Some((_, b)) if !self.direction.is_better(v, b) => best,
                _ => Some((t, v)),
            })
            .map(|(t, _)| t)
    }

    pub fn best_params(&self) -> Option<&ParamSet> {
        self.best_trial().map(|t| &t.params)
    }

    pub fn completed(&self) -> usize {
        self.trials.iter().filter(|t| t.is_complete()).count()
    }

    pub fn pruned(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.state == TrialState::Pruned)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.state == TrialState::Failed)
            .count()
    }

    /// Get summary string.
    pub fn summary(&self) -> String {
        let best = self.best_trial();
        format!(
            "Study: {}\n\
             Direction: {:?}\n\
             Trials: {} ({} completed, {} pruned, {} failed)\n\
             Best Trial: {}\n\
             Best Value: {}\n\
             Best Params: {}",
            self.name,
            self.direction,
            self.trials.len(),
            self.completed(),
            self.pruned(),
            self.failed(),
            best.map(|t| t.number.to_string()).unwrap_or_else(|| "-".to_string()),
            best.and_then(|t| t.value)
                .map(|v| format!("{:.5}", v))
                .unwrap_or_else(|| "-".to_string()),
            best.map(|t| t.params.key()).unwrap_or_else(|| "-".to_string()),
        )
    }

    /// `<dir>/<name>_hpo_<YYYY-MM-DD>.json`, dated by study start.
    pub fn checkpoint_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_hpo_{}.json", self.name, self.started.date_naive()))
    }

    pub fn save_checkpoint(&self, dir: &Path) -> Result<PathBuf, SearchError> {
        fs::create_dir_all(dir)?;
        let path = self.checkpoint_path(dir);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, self)?;
        info!("Saved study checkpoint to {}", path.display());
        Ok(path)
    }

    pub fn load_checkpoint(path: &Path) -> Result<Self, SearchError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::data::FoldData;
    use crate::search::objective::ObjectiveMetric;
    use crate::search::trainer::Trainer;
    use crate::split::{PurgedGroupTimeSeriesSplit, PurgedSplitConfig};
    use crate::tracker::LogTracker;

    /// Predicts `x * slope` so the objective rewards larger slopes.
    struct SlopeTrainer;

    impl Trainer for SlopeTrainer {
        fn name(&self) -> &str {
            "slope"
        }

        fn fit_predict(
            &self,
            params: &ParamSet,
            _train: &FoldData,
            validation: &FoldData,
        ) -> Result<Vec<f64>, SearchError> {
            let slope = params.f64("slope")?;
            if slope < 0.0 {
                return Err(SearchError::Training("negative slope".to_string()));
            }
            Ok(validation
                .features
                .iter()
                .zip(&validation.target)
                .map(|(x, y)| y - (1.0 - slope) * x[0])
                .collect())
        }
    }

    fn dataset() -> EraDataset {
        let mut features = Vec::new();
        let mut target = Vec::new();
        let mut eras = Vec::new();
        for era in 0..8u32 {
            for i in 0..5 {
                let x = ((i * 7 + era as usize * 3) % 11) as f64;
                features.push(vec![x]);
                target.push(x * 0.5 + i as f64);
                eras.push(era);
            }
        }
        EraDataset::new(vec!["feature_x".to_string()], features, target, eras).unwrap()
    }

    fn objective() -> CvObjective {
        let splitter = PurgedGroupTimeSeriesSplit::new(PurgedSplitConfig::new(3, 1)).unwrap();
        CvObjective::new(splitter, Arc::new(SlopeTrainer)).with_metric(ObjectiveMetric::Rmse)
    }

    fn settings(n_trials: usize, direction: Direction) -> StudySettings {
        StudySettings {
            name: "unit".to_string(),
            direction,
            n_trials,
            seed: 9,
            parallelism: 1,
            pruner: Pruner::None,
        }
    }

    #[test]
    fn test_direction() {
        assert!(Direction::Maximize.is_better(0.2, 0.1));
        assert!(!Direction::Maximize.is_better(0.1, 0.1));
        assert!(Direction::Minimize.is_better(0.1, 0.2));
    }

    #[test]
    fn test_rejects_bad_settings() {
        let space = SearchSpace::new().uniform("slope", 0.0, 1.0);
        assert!(Study::new(settings(0, Direction::Minimize), space.clone()).is_err());

        let mut s = settings(1, Direction::Minimize);
        s.parallelism = 0;
        assert!(Study::new(s, space).is_err());

        assert!(Study::new(settings(1, Direction::Minimize), SearchSpace::new()).is_err());
    }

    #[test]
    fn test_minimize_finds_best() {
        let space = SearchSpace::new().uniform("slope", 0.0, 1.0);
        let study = Study::new(settings(20, Direction::Minimize), space).unwrap();
        let result = study.optimize(&objective(), &dataset(), &mut LogTracker::default()).unwrap();

        assert_eq!(result.trials.len(), 20);
        assert_eq!(result.completed(), 20);

        let best = result.best_trial().unwrap();
        let best_slope = best.params.f64("slope").unwrap();
        for trial in &result.trials {
            assert!(trial.params.f64("slope").unwrap() <= best_slope + 1e-12);
            assert!(best.value.unwrap() <= trial.value.unwrap());
        }
    }

    #[test]
    fn test_failed_trials_are_recorded() {
        let space = SearchSpace::new().uniform("slope", -1.0, 1.0);
        let study = Study::new(settings(30, Direction::Minimize), space).unwrap();
        let result = study.optimize(&objective(), &dataset(), &mut LogTracker::default()).unwrap();

        assert!(result.failed() > 0);
        assert!(result.completed() > 0);
        let failed = result.trials.iter().find(|t| !t.is_complete()).unwrap();
        assert!(failed.value.is_none());
        assert!(failed.error.as_deref().unwrap().contains("negative slope"));
    }

    #[test]
    fn test_all_failed_is_an_error() {
        let space = SearchSpace::new().uniform("slope", -2.0, -1.0);
        let study = Study::new(settings(3, Direction::Minimize), space).unwrap();
        let err = study
            .optimize(&objective(), &dataset(), &mut LogTracker::default())
            .unwrap_err();
        assert!(matches!(err, SearchError::NoCompletedTrials(_)));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let space = SearchSpace::new().uniform("slope", 0.0, 1.0);
        let serial = Study::new(settings(8, Direction::Minimize), space.clone())
            .unwrap()
            .optimize(&objective(), &dataset(), &mut LogTracker::default())
            .unwrap();

        let mut parallel_settings = settings(8, Direction::Minimize);
        parallel_settings.parallelism = 4;
        let seen = AtomicUsize::new(0);
        let parallel = Study::new(parallel_settings, space)
            .unwrap()
            .optimize_with_progress(&objective(), &dataset(), &mut LogTracker::default(), &|_| {
                seen.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        assert_eq!(seen.load(Ordering::Relaxed), 8);
        assert_eq!(serial.trials, parallel.trials);
    }

    #[test]
    fn test_median_pruner_stops_weak_trials() {
        let space = SearchSpace::new().uniform("slope", 0.0, 1.0);
        let full = Study::new(settings(20, Direction::Minimize), space.clone())
            .unwrap()
            .optimize(&objective(), &dataset(), &mut LogTracker::default())
            .unwrap();

        let mut pruned_settings = settings(20, Direction::Minimize);
        pruned_settings.pruner = Pruner::Median {
            startup_trials: 1,
            warmup_folds: 0,
        };
        let pruned = Study::new(pruned_settings, space)
            .unwrap()
            .optimize(&objective(), &dataset(), &mut LogTracker::default())
            .unwrap();

        assert_eq!(pruned.trials.len(), 20);
        assert!(pruned.pruned() > 0);
        assert_eq!(pruned.failed(), 0);
        assert_eq!(pruned.completed() + pruned.pruned(), 20);
        assert_eq!(pruned.trials[0].state, TrialState::Complete);

        let stopped = pruned
            .trials
            .iter()
            .find(|t| t.state == TrialState::Pruned)
            .unwrap();
        assert!(stopped.value.is_none());
        assert!(stopped.error.as_deref().unwrap().starts_with("Pruned after fold"));

        assert_eq!(
            pruned.best_trial().map(|t| t.number),
            full.best_trial().map(|t| t.number)
        );
        assert!(pruned.summary().contains("pruned"));
    }

    #[test]
    fn test_median_pruner_respects_warmup_and_startup() {
        let history = vec![Trial {
            number: 0,
            params: ParamSet::new(),
            state: TrialState::Complete,
            value: Some(0.5),
            folds: vec![
                FoldEvaluation {
                    fold: 0,
                    score: 0.5,
                    train_len: 10,
                    validation_len: 10,
                    weight: 20,
                },
                FoldEvaluation {
                    fold: 1,
                    score: 0.5,
                    train_len: 10,
                    validation_len: 10,
                    weight: 20,
                },
            ],
            error: None,
        }];

        let pruner = Pruner::Median {
            startup_trials: 1,
            warmup_folds: 1,
        };
        assert!(!pruner.should_prune(Direction::Maximize, &history, 0, 0.1));
        assert!(pruner.should_prune(Direction::Maximize, &history, 1, 0.1));
        assert!(!pruner.should_prune(Direction::Maximize, &history, 1, 0.9));
        assert!(!pruner.should_prune(Direction::Minimize, &history, 1, 0.1));

        let patient = Pruner::Median {
            startup_trials: 2,
            warmup_folds: 0,
        };
        assert!(!patient.should_prune(Direction::Maximize, &history, 1, 0.1));
        assert!(!Pruner::None.should_prune(Direction::Maximize, &history, 1, 0.1));
    }

    #[test]
    fn test_pruner_requires_serial_study() {
        let space = SearchSpace::new().uniform("slope", 0.0, 1.0);
        let mut s = settings(4, Direction::Minimize);
        s.parallelism = 2;
        s.pruner = Pruner::Median {
            startup_trials: 1,
            warmup_folds: 0,
        };
        assert!(matches!(
            Study::new(s, space),
            Err(SearchError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_best_trial_tie_keeps_earliest() {
        let trial = |number, value| Trial {
            number,
            params: ParamSet::new(),
            state: TrialState::Complete,
            value: Some(value),
            folds: vec![],
            error: None,
        };
        let result = StudyResult {
            name: "tie".to_string(),
            direction: Direction::Maximize,
            model: None,
            started: Utc::now(),
            finished: Utc::now(),
            trials: vec![trial(0, 0.1), trial(1, 0.3), trial(2, 0.3), trial(3, f64::NAN)],
        };

        assert_eq!(result.best_trial().unwrap().number, 1);
        assert!(result.summary().contains("Best Trial: 1"));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let space = ModelKind::Linear.search_space();
        let study = Study::new(settings(2, Direction::Maximize), space).unwrap();
        let splitter = PurgedGroupTimeSeriesSplit::new(PurgedSplitConfig::new(2, 0)).unwrap();
        let objective = CvObjective::new(splitter, Arc::new(crate::search::LinearTrainer));

        let result = study
            .optimize(&objective, &dataset(), &mut LogTracker::default())
            .unwrap();
        let path = result.save_checkpoint(dir.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("unit_hpo_"));
        assert!(name.ends_with(".json"));

        let loaded = StudyResult::load_checkpoint(&path).unwrap();
        assert_eq!(loaded.name, result.name);
        assert_eq!(loaded.model, Some(ModelKind::Linear));
        assert_eq!(loaded.trials.len(), 2);
        assert_eq!(loaded.best_trial().map(|t| t.number), result.best_trial().map(|t| t.number));
    }
}
