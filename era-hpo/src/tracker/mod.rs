//! Experiment tracker module.
//!
//! Provides:
//! - `TrackerSink` trait the study reports to
//! - JSON-lines file sink and tracing log sink
//! - Tracker configuration with environment-sourced credentials

pub mod jsonl;
pub mod sink;

pub use jsonl::JsonlTracker;
pub use sink::{LogTracker, TrackerConfig, TrackerError, TrackerKind, TrackerSink};
