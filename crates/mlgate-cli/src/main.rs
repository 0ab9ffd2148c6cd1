//! mlgate - train, gate and serve a breast-cancer classifier
//!
//! ## Commands
//!
//! - `train`: cross-validate, evaluate on a held-out split and promote if the
//!   recall gate passes
//! - `current` / `history`: inspect promoted models
//! - `runs` / `show`: inspect training runs, including rejected ones
//! - `rollback`: serve the previously promoted model again
//! - `predict`: score one feature vector with the promoted model
//! - `compare`: cross-validate logistic regression against tree baselines

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, Level};

use mlgate_core::reporting::{render_model_comparison, write_comparison_json};
use mlgate_core::{
    run_comparison, ArtifactStore, ModelKind, PipelineConfig, Predictor, Promotion, RunId,
    RunRecord, TrainingPipeline,
};

#[derive(Parser)]
#[command(name = "mlgate")]
#[command(version = mlgate_core::VERSION)]
#[command(about = "Cross-validated training with a recall-gated promotion step", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Artifact store directory (default: .mlgate)
    #[arg(long, env = "MLGATE_STORE")]
    store: Option<PathBuf>,
}

impl StoreArgs {
    fn open(&self) -> Result<ArtifactStore> {
        let root = self
            .store
            .clone()
            .unwrap_or_else(|| PipelineConfig::default().store.root);
        ArtifactStore::open(&root).with_context(|| format!("open store {:?}", root))
    }
}

/// Dataset and cross-validation settings shared by `train` and `compare`.
#[derive(Args)]
struct DataArgs {
    /// TOML config file; flags override it
    #[arg(short, long, env = "MLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset CSV
    #[arg(long, env = "MLGATE_DATASET")]
    dataset: Option<PathBuf>,

    /// Number of cross-validation folds
    #[arg(short, long, env = "MLGATE_K_FOLDS")]
    k_folds: Option<usize>,

    /// Seed for the split and fold shuffles
    #[arg(long, env = "MLGATE_SEED")]
    seed: Option<u64>,

    /// Use a stratified subsample with at most 3 folds
    #[arg(long)]
    smoke: bool,

    /// Evaluate folds in parallel
    #[arg(long)]
    parallel: bool,
}

impl DataArgs {
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("load config {:?}", path))?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = &self.dataset {
            cfg.data.path = v.clone();
        }
        if let Some(v) = self.k_folds {
            cfg.cv.k_folds = v;
        }
        if let Some(v) = self.seed {
            cfg.split.seed = v;
        }
        cfg.split.smoke |= self.smoke;
        cfg.cv.parallel |= self.parallel;
        Ok(cfg)
    }
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    store: StoreArgs,

    /// Held-out fraction
    #[arg(long, env = "MLGATE_TEST_SIZE")]
    test_size: Option<f64>,

    /// Minimum mean CV recall to promote
    #[arg(long, env = "MLGATE_MIN_RECALL")]
    min_recall: Option<f64>,

    /// Maximum CV recall standard deviation to promote
    #[arg(long, env = "MLGATE_MAX_RECALL_STD")]
    max_recall_std: Option<f64>,

    /// Exit non-zero when the gate rejects the model
    #[arg(long)]
    fail_on_reject: bool,
}

impl TrainArgs {
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut cfg = self.data.resolve_config()?;
        if let Some(v) = &self.store.store {
            cfg.store.root = v.clone();
        }
        if let Some(v) = self.test_size {
            cfg.split.test_size = v;
        }
        if let Some(v) = self.min_recall {
            cfg.thresholds.min_recall = v;
        }
        if let Some(v) = self.max_recall_std {
            cfg.thresholds.max_recall_std = v;
        }
        Ok(cfg)
    }
}

#[derive(Args)]
struct CompareArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Models to compare, e.g. `lr,tree,forest` (default: all)
    #[arg(long, value_delimiter = ',')]
    models: Vec<ModelKind>,

    /// Also write the comparison as JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

impl CompareArgs {
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut cfg = self.data.resolve_config()?;
        if !self.models.is_empty() {
            cfg.compare.models = self.models.clone();
        }
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full training pipeline
    Train(TrainArgs),

    /// Cross-validate model families side by side (nothing is promoted)
    Compare(CompareArgs),

    /// Show the currently promoted model
    Current {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show promotion history (newest first)
    History {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// List training runs (oldest first)
    Runs {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print one run record as JSON
    Show {
        /// Run ID
        run_id: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Serve the previously promoted model again
    Rollback {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Predict with the promoted model
    Predict {
        /// Comma-separated feature values, in training column order
        #[arg(
            long,
            value_delimiter = ',',
            allow_hyphen_values = true,
            conflicts_with = "input",
            required_unless_present = "input"
        )]
        features: Option<Vec<f64>>,

        /// JSON file: an array, `{"features": [...]}`, or `{name: value}`
        #[arg(long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        store: StoreArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    mlgate_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Train(args) => cmd_train(&args),
        Commands::Compare(args) => cmd_compare(&args),
        Commands::Current { store } => cmd_current(&store.open()?),
        Commands::History { store } => cmd_history(&store.open()?),
        Commands::Runs { store } => cmd_runs(&store.open()?),
        Commands::Show { run_id, store } => cmd_show(&store.open()?, &run_id),
        Commands::Rollback { store } => cmd_rollback(&store.open()?),
        Commands::Predict {
            features,
            input,
            store,
        } => {
            let features = match (features, input) {
                (Some(f), _) => FeatureInput::List(f),
                (None, Some(path)) => read_feature_input(&path)?,
                (None, None) => bail!("either --features or --input is required"),
            };
            cmd_predict(&store.open()?, features)
        }
    }
}

// ========== Training ==========

fn cmd_train(args: &TrainArgs) -> Result<()> {
    let cfg = args.resolve_config()?;
    info!(
        dataset = %cfg.data.path.display(),
        store = %cfg.store.root.display(),
        k_folds = cfg.cv.k_folds,
        "starting training run"
    );

    let pipeline = TrainingPipeline::new(cfg).context("invalid configuration")?;
    let outcome = pipeline.run().context("training run failed")?;
    let cv = &outcome.verdict.metrics.cv;
    let test = &outcome.verdict.metrics.test;

    println!("Run:        {}", outcome.run_id);
    println!("Status:     {:?}", outcome.status);
    println!(
        "CV recall:  {:.4} ± {:.4} over {} folds",
        cv.recall.mean, cv.recall.std, cv.k
    );
    println!(
        "Test:       accuracy {:.4}  recall {:.4}  roc_auc {:.4}",
        test.accuracy, test.recall, test.roc_auc
    );
    println!("Model:      {}", outcome.model_digest);
    for v in &outcome.verdict.violations {
        println!("Violation:  {}", v.reason);
    }
    for path in &outcome.reports {
        println!("Report:     {}", path.display());
    }

    if !outcome.promoted() && args.fail_on_reject {
        bail!("run {} was rejected by the promotion gate", outcome.run_id);
    }
    Ok(())
}

fn cmd_compare(args: &CompareArgs) -> Result<()> {
    let cfg = args.resolve_config()?;
    info!(
        dataset = %cfg.data.path.display(),
        models = cfg.compare.models.len(),
        k_folds = cfg.cv.k_folds,
        "starting model comparison"
    );

    let comparison = run_comparison(&cfg).context("model comparison failed")?;
    print!("{}", render_model_comparison(&comparison));
    if let Some(path) = &args.output {
        write_comparison_json(path, &comparison)?;
        println!("\nReport:     {}", path.display());
    }
    Ok(())
}

// ========== Promotion store ==========

fn print_promotion(p: &Promotion) {
    println!(
        "{} run={} model={} recall={:.4}±{:.4}",
        p.metadata.promoted_at.to_rfc3339(),
        p.metadata.run_id,
        p.metadata.model_digest.short(),
        p.metadata.metrics.cv.recall.mean,
        p.metadata.metrics.cv.recall.std,
    );
}

fn cmd_current(store: &ArtifactStore) -> Result<()> {
    match store.current()? {
        Some(p) => {
            println!("Current -> {}", p.digest);
            print_promotion(&p);
        }
        None => println!("No promoted model"),
    }
    Ok(())
}

fn cmd_history(store: &ArtifactStore) -> Result<()> {
    let history = store.history()?;
    if history.is_empty() {
        println!("No promotion history");
        return Ok(());
    }
    for p in &history {
        print_promotion(p);
    }
    Ok(())
}

fn print_run(r: &RunRecord) {
    let recall = r
        .metrics
        .as_ref()
        .map(|m| format!("{:.4}", m.cv.recall.mean))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} {} {:?} recall={}",
        r.created_at.to_rfc3339(),
        r.run_id,
        r.status,
        recall
    );
}

fn cmd_runs(store: &ArtifactStore) -> Result<()> {
    let runs = store.runs()?;
    if runs.is_empty() {
        println!("No runs");
    }
    for r in &runs {
        print_run(r);
    }
    Ok(())
}

fn cmd_show(store: &ArtifactStore, run_id: &str) -> Result<()> {
    let record = store.run(&RunId::from(run_id))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_rollback(store: &ArtifactStore) -> Result<()> {
    let restored = store.rollback().context("rollback failed")?;
    println!("Rolled back -> {}", restored.digest);
    print_promotion(&restored);
    Ok(())
}

// ========== Serving ==========

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureInput {
    List(Vec<f64>),
    Wrapped { features: Vec<f64> },
    Named(BTreeMap<String, f64>),
}

fn read_feature_input(path: &Path) -> Result<FeatureInput> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

fn resolve_features(input: FeatureInput, names: &[String]) -> Result<Vec<f64>> {
    match input {
        FeatureInput::List(v) | FeatureInput::Wrapped { features: v } => Ok(v),
        FeatureInput::Named(map) => {
            if let Some(extra) = map.keys().find(|k| !names.contains(k)) {
                bail!("unknown feature {:?}", extra);
            }
            names
                .iter()
                .map(|n| {
                    map.get(n)
                        .copied()
                        .with_context(|| format!("missing feature {:?}", n))
                })
                .collect()
        }
    }
}

fn cmd_predict(store: &ArtifactStore, input: FeatureInput) -> Result<()> {
    let predictor = Predictor::load(store).context("load promoted model")?;
    let features = resolve_features(input, predictor.feature_names())?;
    let prediction = predictor.predict(&features)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}
