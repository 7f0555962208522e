//! Era-HPO CLI
//!
//! Usage:
//! ```bash
//! # Inspect the folds a configuration produces
//! era-hpo split --data data/train.parquet --n-splits 5 --group-gap 10
//!
//! # Run a hyperparameter study
//! era-hpo search --config config/default.toml
//!
//! # Show a model family's search space and a few draws
//! era-hpo space --model lightgbm --samples 3
//! ```

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use era_hpo::config::SearchConfig;
use era_hpo::data::{DataLoader, EraDataset};
use era_hpo::search::{CvObjective, LinearTrainer, ModelKind, Study, Trainer};
use era_hpo::split::{GroupIndex, PurgedGroupTimeSeriesSplit, PurgedSplitConfig};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "era-hpo")]
#[command(about = "Hyperparameter search over purged era cross-validation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the folds a split configuration produces for a dataset
    Split {
        /// Dataset file (.parquet or .csv)
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long, default_value_t = 5)]
        n_splits: usize,

        #[arg(long, default_value_t = 10)]
        group_gap: usize,

        /// Keep only the most recent N training eras
        #[arg(long)]
        max_train_groups: Option<usize>,

        /// Keep only the first N validation eras
        #[arg(long)]
        max_val_groups: Option<usize>,
    },

    /// Run a hyperparameter study
    Search {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/default.toml")]
        config: PathBuf,

        /// Dataset file, overrides data.path
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Number of trials, overrides study.n_trials
        #[arg(short, long)]
        trials: Option<usize>,

        /// Output directory, overrides output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a model family's search space
    Space {
        /// xgboost, lightgbm, resnet or linear
        #[arg(short, long)]
        model: ModelKind,

        /// Number of sample draws to print
        #[arg(short, long, default_value_t = 3)]
        samples: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn load_dataset(path: &Path, config: Option<&SearchConfig>) -> Result<EraDataset> {
    let mut loader = DataLoader::new(path);
    if let Some(config) = config {
        loader = loader.with_options(config.data.columns.clone());
    }
    loader
        .load()
        .with_context(|| format!("Failed to load dataset {}", path.display()))
}

fn trainer_for(model: ModelKind) -> Result<Arc<dyn Trainer>> {
    match model {
        ModelKind::Linear => Ok(Arc::new(LinearTrainer)),
        other => bail!(
            "No built-in trainer for '{}'; use model = \"linear\" or plug a Trainer in through the library",
            other
        ),
    }
}

fn era_span(labels: &[u32], range: &Range<usize>) -> String {
    match (labels.get(range.start), range.end.checked_sub(1).and_then(|i| labels.get(i))) {
        (Some(first), Some(last)) if !range.is_empty() => format!("{:>4}-{:<4}", first, last),
        _ => format!("{:^9}", "-"),
    }
}

fn cmd_split(data: PathBuf, config: PurgedSplitConfig) -> Result<()> {
    let dataset = load_dataset(&data, None)?;
    let splitter = PurgedGroupTimeSeriesSplit::new(config).context("Invalid split configuration")?;
    let splits = splitter.split(dataset.eras())?;
    let index = GroupIndex::build(dataset.eras());

    println!("{}", SEPARATOR);
    println!(
        "{} rows, {} eras, {} folds, gap {}",
        dataset.len(),
        index.len(),
        splits.len(),
        splitter.config().group_gap
    );
    println!("{}", SEPARATOR);
    println!(
        "{:>4}  {:>9}  {:>9}  {:>9}  {:>10}  {:>10}",
        "fold", "train", "purged", "valid", "train_rows", "valid_rows"
    );

    for fold in splits {
        let w = &fold.window;
        println!(
            "{:>4}  {}  {}  {}  {:>10}  {:>10}{}",
            w.fold,
            era_span(index.labels(), &w.train_groups),
            era_span(index.labels(), &w.purged_groups),
            era_span(index.labels(), &w.validation_groups),
            fold.train_len(),
            fold.validation_len(),
            fold.degeneracy()
                .map(|d| format!("  ({})", d))
                .unwrap_or_default()
        );
    }

    Ok(())
}

fn cmd_search(
    config_path: PathBuf,
    data: Option<PathBuf>,
    trials: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = SearchConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    if let Some(path) = data {
        config.data.path = Some(path);
    }
    if let Some(n) = trials {
        config.study.n_trials = n;
    }
    if let Some(dir) = output {
        config.output_dir = dir;
    }
    config.validate()?;

    let trainer = trainer_for(config.model)?;
    let data_path = config
        .data
        .path
        .clone()
        .context("No dataset configured: set data.path or pass --data")?;
    let dataset = load_dataset(&data_path, Some(&config))?;

    let space = config.search_space()?;
    let study = Study::new(config.study.clone(), space)?;
    let splitter = PurgedGroupTimeSeriesSplit::new(config.split.clone())?;
    let objective = CvObjective::new(splitter, trainer)
        .with_metric(config.objective.metric)
        .with_size_policy(config.objective.size_policy);
    let mut tracker = config
        .tracker
        .build(&config.study.name, &config.output_dir)
        .context("Failed to set up experiment tracker")?;

    let pb = ProgressBar::new(config.study.n_trials as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let result = study.optimize_with_progress(&objective, &dataset, tracker.as_mut(), &|trial| {
        pb.inc(1);
        if let Some(value) = trial.value {
            pb.set_message(format!("trial {} = {:.5}", trial.number, value));
        }
    })?;
    pb.finish_with_message("study complete");

    let checkpoint = result
        .save_checkpoint(&config.output_dir)
        .context("Failed to save study checkpoint")?;

    println!("{}", SEPARATOR);
    println!("{}", result.summary());
    println!("Checkpoint: {}", checkpoint.display());
    println!("{}", SEPARATOR);

    Ok(())
}

fn cmd_space(model: ModelKind, samples: usize, seed: u64) -> Result<()> {
    let space = model.search_space();

    println!("{}", SEPARATOR);
    println!("{} search space ({} parameters)", model, space.dimensions());
    println!("{}", SEPARATOR);
    println!("{}", serde_json::to_string_pretty(&space)?);

    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..samples {
        println!("sample {}: {}", i, space.sample(&mut rng).key());
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("era_hpo=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Split {
            data,
            n_splits,
            group_gap,
            max_train_groups,
            max_val_groups,
        } => {
            let config = PurgedSplitConfig {
                n_splits,
                group_gap,
                max_train_group_size: max_train_groups,
                max_val_group_size: max_val_groups,
            };
            cmd_split(data, config)?;
        }
        Commands::Search {
            config,
            data,
            trials,
            output,
        } => cmd_search(config, data, trials, output)?,
        Commands::Space {
            model,
            samples,
            seed,
        } => cmd_space(model, samples, seed)?,
    }

    Ok(())
}
