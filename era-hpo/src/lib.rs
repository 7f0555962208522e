pub mod config;
pub mod data;
pub mod metrics;
pub mod search;
pub mod split;
pub mod tracker;

// Re-export commonly used types
pub use config::{ConfigError, SearchConfig};
pub use data::{DataLoader, EraDataset, FoldData};
pub use metrics::{score, weighted_mean, ScoreFrame};
pub use search::{CvObjective, Direction, ModelKind, ParamSet, SearchSpace, Study, StudyResult, Trainer};
pub use split::{Fold, PurgedGroupTimeSeriesSplit, PurgedSplitConfig, SplitError};
pub use tracker::{JsonlTracker, LogTracker, TrackerSink};
