use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::search::{StudyResult, Trial};

use super::sink::{experiment_name, TrackerError, TrackerSink};

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event<'a> {
    Start {
        project: &'a str,
        experiment: &'a str,
        timestamp: DateTime<Utc>,
    },
    Trial {
        experiment: &'a str,
        timestamp: DateTime<Utc>,
        trial: &'a Trial,
    },
    Finish {
        experiment: &'a str,
        timestamp: DateTime<Utc>,
        completed: usize,
        pruned: usize,
        failed: usize,
        best_trial: Option<&'a Trial>,
    },
}

/// Appends one JSON object per event to a file.
pub struct JsonlTracker {
    path: PathBuf,
    writer: BufWriter<File>,
    project: String,
    experiment: Option<String>,
    started: bool,
}

impl JsonlTracker {
    pub fn create(path: &Path, project: &str, experiment: Option<&str>) -> Result<Self, TrackerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            project: project.to_string(),
            experiment: experiment.map(str::to_string),
            started: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn experiment(&self) -> Result<&str, TrackerError> {
        match (&self.experiment, self.started) {
            (Some(name), true) => Ok(name),
            _ => Err(TrackerError::NotStarted),
        }
    }

    fn write(&mut self, event: &Event<'_>) -> Result<(), TrackerError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl TrackerSink for JsonlTracker {
    fn start(&mut self, study: &str) -> Result<(), TrackerError> {
        let experiment = experiment_name(self.experiment.as_deref(), study);
        let project = self.project.clone();
        self.write(&Event::Start {
            project: &project,
            experiment: &experiment,
            timestamp: Utc::now(),
        })?;

        info!("Logging trials of '{}' to {}", experiment, self.path.display());
        self.experiment = Some(experiment);
        self.started = true;
        Ok(())
    }

    fn log_trial(&mut self, trial: &Trial) -> Result<(), TrackerError> {
        let experiment = self.experiment()?.to_string();
        self.write(&Event::Trial {
            experiment: &experiment,
            timestamp: Utc::now(),
            trial,
        })
    }

    fn finish(&mut self, result: &StudyResult) -> Result<(), TrackerError> {
        let experiment = self.experiment()?.to_string();
        self.write(&Event::Finish {
            experiment: &experiment,
            timestamp: Utc::now(),
            completed: result.completed(),
            pruned: result.pruned(),
            failed: result.failed(),
            best_trial: result.best_trial(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{Direction, ParamSet, TrialState};

    fn trial(number: usize, value: Option<f64>) -> Trial {
        let mut params = ParamSet::new();
        params.insert("eta", 0.1);
        Trial {
            number,
            params,
            state: if value.is_some() {
                TrialState::Complete
            } else {
                TrialState::Failed
            },
            value,
            folds: vec![],
            error: value.is_none().then(|| "boom".to_string()),
        }
    }

    fn lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trials.jsonl");
        let mut tracker = JsonlTracker::create(&path, "numerai", None).unwrap();

        let trials = vec![trial(0, Some(0.02)), trial(1, None), trial(2, Some(0.03))];
        let result = StudyResult {
            name: "xgb".to_string(),
            direction: Direction::Maximize,
            model: None,
            started: Utc::now(),
            finished: Utc::now(),
            trials: trials.clone(),
        };

        tracker.start("xgb").unwrap();
        for t in &trials {
            tracker.log_trial(t).unwrap();
        }
        tracker.finish(&result).unwrap();

        let events = lines(&path);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0]["event"], "start");
        assert_eq!(events[0]["experiment"], "xgb_HPO");
        assert_eq!(events[0]["project"], "numerai");
        assert_eq!(events[2]["event"], "trial");
        assert_eq!(events[2]["trial"]["state"], "failed");
        assert_eq!(events[4]["event"], "finish");
        assert_eq!(events[4]["completed"], 2);
        assert_eq!(events[4]["pruned"], 0);
        assert_eq!(events[4]["best_trial"]["number"], 2);
    }

    #[test]
    fn test_log_before_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = JsonlTracker::create(&dir.path().join("t.jsonl"), "p", Some("exp")).unwrap();
        assert!(matches!(
            tracker.log_trial(&trial(0, Some(1.0))),
            Err(TrackerError::NotStarted)
        ));
    }
}
