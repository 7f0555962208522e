//! Cross-validated objective over purged group folds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::EraDataset;
use crate::metrics::{rmse, score, weighted_mean, ScoreFrame};
use crate::split::PurgedGroupTimeSeriesSplit;

use super::error::SearchError;
use super::space::ParamSet;
use super::trainer::Trainer;

/// Which samples count toward a fold's weight in the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldSizePolicy {
    /// Training plus validation samples.
    #[default]
    TrainAndValidation,
    /// Training samples only.
    TrainOnly,
}

impl FoldSizePolicy {
    fn weight(&self, train_len: usize, validation_len: usize) -> usize {
        match self {
            Self::TrainAndValidation => train_len + validation_len,
            Self::TrainOnly => train_len,
        }
    }
}

/// Per-fold score function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveMetric {
    /// Rank correlation of predictions with the target (maximize).
    #[default]
    Correlation,
    /// Root mean squared error (minimize).
    Rmse,
}

impl ObjectiveMetric {
    fn evaluate(&self, frame: &ScoreFrame) -> f64 {
        match self {
            Self::Correlation => score(frame),
            Self::Rmse => rmse(&frame.target, &frame.preds),
        }
    }
}

/// Score of a single fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldEvaluation {
    pub fold: usize,
    pub score: f64,
    pub weight: usize,
    pub train_len: usize,
    pub validation_len: usize,
}

/// Aggregate score of one parameter set across all folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub value: f64,
    pub folds: Vec<FoldEvaluation>,
}

/// Trains and scores one parameter set on every fold.
#[derive(Clone)]
pub struct CvObjective {
    splitter: PurgedGroupTimeSeriesSplit,
    trainer: Arc<dyn Trainer>,
    metric: ObjectiveMetric,
    size_policy: FoldSizePolicy,
}

impl CvObjective {
    pub fn new(splitter: PurgedGroupTimeSeriesSplit, trainer: Arc<dyn Trainer>) -> Self {
        Self {
            splitter,
            trainer,
            metric: ObjectiveMetric::default(),
            size_policy: FoldSizePolicy::default(),
        }
    }

    pub fn with_metric(mut self, metric: ObjectiveMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_size_policy(mut self, policy: FoldSizePolicy) -> Self {
        self.size_policy = policy;
        self
    }

    pub fn splitter(&self) -> &PurgedGroupTimeSeriesSplit {
        &self.splitter
    }

    pub fn trainer_name(&self) -> &str {
        self.trainer.name()
    }

    /// Evaluate `params` on every fold, serially.
    ///
    /// Each fold's datasets live only for its loop iteration, so at most one
    /// fold's copies are in memory at a time. A degenerate fold aborts the
    /// evaluation.
    pub fn evaluate(&self, params: &ParamSet, dataset: &EraDataset) -> Result<Evaluation, SearchError> {
        self.evaluate_with_pruning(params, dataset, &mut |_, _| false)
    }

    /// Like [`evaluate`](Self::evaluate), reporting the running weighted
    /// mean after every fold but the last.
    ///
    /// When `should_prune(fold, intermediate)` returns true the evaluation
    /// stops with [`SearchError::Pruned`].
    pub fn evaluate_with_pruning(
        &self,
        params: &ParamSet,
        dataset: &EraDataset,
        should_prune: &mut dyn FnMut(usize, f64) -> bool,
    ) -> Result<Evaluation, SearchError> {
        let splits = self.splitter.split(dataset.eras())?;
        let n_folds = splits.len();

        let mut folds = Vec::with_capacity(splits.len());
        for fold in splits {
            if let Some(reason) = fold.degeneracy() {
                return Err(SearchError::DegenerateFold {
                    fold: fold.number(),
                    reason,
                });
            }

            let train = dataset.gather(&fold.train_indices);
            let validation = dataset.gather(&fold.validation_indices);

            let preds = self.trainer.fit_predict(params, &train, &validation)?;
            let frame = ScoreFrame::new(preds, validation.target)?;
            let fold_score = self.metric.evaluate(&frame);

            debug!(
                "Fold {}: train {} rows, validation {} rows, score {:.5}",
                fold.number(),
                fold.train_len(),
                fold.validation_len(),
                fold_score
            );

            folds.push(FoldEvaluation {
                fold: fold.number(),
                score: fold_score,
                weight: self.size_policy.weight(fold.train_len(), fold.validation_len()),
                train_len: fold.train_len(),
                validation_len: fold.validation_len(),
            });

            if folds.len() < n_folds {
                let intermediate = running_mean(&folds)?;
                if should_prune(fold.number(), intermediate) {
                    return Err(SearchError::Pruned {
                        fold: fold.number(),
                        value: intermediate,
                    });
                }
            }
        }

        let value = running_mean(&folds)?;
        Ok(Evaluation { value, folds })
    }
}

/// Weighted mean of the fold scores so far.
pub(crate) fn running_mean(folds: &[FoldEvaluation]) -> Result<f64, SearchError> {
    let scores: Vec<f64> = folds.iter().map(|f| f.score).collect();
    let weights: Vec<usize> = folds.iter().map(|f| f.weight).collect();
    Ok(weighted_mean(&scores, &weights)?)
}
