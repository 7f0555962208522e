//! Hyperparameter search module.
//!
//! Provides:
//! - Typed search spaces and seeded sampling
//! - Per-family presets and parameter extraction
//! - Cross-validated objective over purged era folds
//! - Study driver with checkpointing

pub mod error;
pub mod models;
pub mod objective;
pub mod space;
pub mod study;
pub mod trainer;

pub use error::SearchError;
pub use models::{
    Activation, Boosting, LgbParams, LinearParams, ModelKind, NeuralParams, XgbParams,
    EARLY_STOPPING_ROUNDS, NUM_BOOST_ROUND,
};
pub use objective::{CvObjective, Evaluation, FoldEvaluation, FoldSizePolicy, ObjectiveMetric};
pub use space::{ParamSet, ParamSpec, ParamValue, SearchSpace};
pub use study::{Direction, Pruner, Study, StudyResult, StudySettings, Trial, TrialState};
pub use trainer::{LinearTrainer, Trainer};
