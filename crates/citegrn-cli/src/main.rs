//! citegrn - train graph recurrent networks on citation datasets.
//!
//! # Usage
//!
//! ```bash
//! # Dataset statistics
//! citegrn stats --data-dir data/cora --dataset cora
//!
//! # Train with the default hyperparameters
//! citegrn train --data-dir data/cora --dataset cora
//!
//! # Override hyperparameters, keep the curves and the weights
//! citegrn train --data-dir data/citeseer --dataset citeseer \
//!     --lr 0.005 --n-hid 64 --ps 10 --history curves.json --save grn.safetensors
//!
//! # Start from a JSON config; flags still win
//! citegrn train --data-dir data/pubmed --dataset pubmed --config pubmed.json --epochs 300
//!
//! # Inspect feature diffusion
//! citegrn propagate --data-dir data/cora --n-iter 12
//! ```
//!
//! Logging goes to stderr and follows `RUST_LOG` (default `info`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use candle_core::Device;
use candle_nn::VarMap;
use citegrn_core::{Dataset, DatasetName, LoadOptions};
use citegrn_nn::propagate::{array_to_tensor, snapshot_norms};
use citegrn_nn::{run, save_weights, unroll, EpochMetrics, ProgressCallback, TrainingConfig};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "citegrn")]
#[command(about = "Graph recurrent networks for citation node classification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Directory holding the dataset files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Dataset: cora, citeseer or pubmed
    #[arg(long, default_value = "cora")]
    dataset: DatasetName,

    /// Keep raw feature values instead of row-normalizing them
    #[arg(long)]
    no_normalize: bool,
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    data: DataArgs,

    /// JSON training config; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Weight decay
    #[arg(long)]
    wd: Option<f64>,

    /// Hidden size of the GRU
    #[arg(long)]
    n_hid: Option<usize>,

    /// Diffusion steps (GRN sequence length)
    #[arg(long)]
    n_iter: Option<usize>,

    /// Maximum training epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Early stopping patience
    #[arg(long)]
    ps: Option<usize>,

    /// Dropout on the GRU outputs
    #[arg(long)]
    d1: Option<f32>,

    /// Dropout before the attention scores
    #[arg(long)]
    d2: Option<f32>,

    /// Dropout before the classifier
    #[arg(long)]
    d3: Option<f32>,

    /// Training nodes
    #[arg(long)]
    n_train: Option<usize>,

    /// Validation nodes
    #[arg(long)]
    n_val: Option<usize>,

    /// Test nodes
    #[arg(long)]
    n_test: Option<usize>,

    /// Build the propagation operator without self-loops
    #[arg(long)]
    no_self_loops: bool,

    /// Shuffle nodes before splitting
    #[arg(long)]
    shuffle_split: bool,

    /// Seed for the split shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Write loss/accuracy curves as JSON
    #[arg(long)]
    history: Option<PathBuf>,

    /// Save trained weights (safetensors)
    #[arg(long)]
    save: Option<PathBuf>,

    /// Use CUDA device 0 when available
    #[arg(long)]
    cuda: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a GRN and evaluate it on the test split
    Train(TrainArgs),

    /// Show statistics about a dataset
    Stats {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Report how features smooth out over diffusion steps
    Propagate {
        #[command(flatten)]
        data: DataArgs,

        /// Diffusion steps
        #[arg(long, default_value = "9")]
        n_iter: usize,

        /// Build the propagation operator without self-loops
        #[arg(long)]
        no_self_loops: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => cmd_train(args),
        Commands::Stats { data } => cmd_stats(&data),
        Commands::Propagate {
            data,
            n_iter,
            no_self_loops,
        } => cmd_propagate(&data, n_iter, !no_self_loops),
    }
}

fn load_dataset(data: &DataArgs, options: &LoadOptions) -> Result<Dataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {} from {}...", data.dataset, data.data_dir.display()));

    let dataset = Dataset::load(&data.data_dir, data.dataset, options).with_context(|| {
        format!(
            "Failed to load {} from {}",
            data.dataset,
            data.data_dir.display()
        )
    })?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(dataset)
}

fn build_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => TrainingConfig::default(),
    };

    if let Some(lr) = args.lr {
        config.learning_rate = lr;
    }
    if let Some(wd) = args.wd {
        config.weight_decay = wd;
    }
    if let Some(n) = args.n_hid {
        config.n_hidden = n;
    }
    if let Some(n) = args.n_iter {
        config.n_iters = n;
    }
    if let Some(n) = args.epochs {
        config.epochs = n;
    }
    if let Some(p) = args.ps {
        config.patience = p;
    }
    if let Some(d) = args.d1 {
        config.rnn_dropout = d;
    }
    if let Some(d) = args.d2 {
        config.attention_dropout = d;
    }
    if let Some(d) = args.d3 {
        config.dense_dropout = d;
    }
    if let Some(n) = args.n_train {
        config.n_train = n;
    }
    if let Some(n) = args.n_val {
        config.n_val = n;
    }
    if let Some(n) = args.n_test {
        config.n_test = n;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.no_self_loops {
        config.self_loops = false;
    }
    if args.shuffle_split {
        config.shuffle_split = true;
    }
    if args.data.no_normalize {
        config.normalize_features = false;
    }

    config.validate().context("Invalid training config")?;
    Ok(config)
}

fn epoch_progress(epochs: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(epochs as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} epoch {pos}/{len} {bar:30} {msg}")
            .context("Invalid progress template")?,
    );
    Ok(pb)
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = build_config(&args)?;
    let dataset = load_dataset(&args.data, &config.load_options())?;

    let device = if args.cuda {
        Device::cuda_if_available(0)?
    } else {
        Device::Cpu
    };
    info!(device = ?device, "training on");

    let pb = epoch_progress(config.epochs)?;
    let bar = pb.clone();
    let callback: ProgressCallback = Box::new(move |_epoch, m: &EpochMetrics| {
        bar.inc(1);
        bar.set_message(format!(
            "train {:.4} val {:.4} acc {:.4}",
            m.train_loss, m.val_loss, m.val_accuracy
        ));
    });

    let varmap = VarMap::new();
    let report = run(&dataset, &config, &varmap, &device, Some(&callback))
        .context("Training failed")?;
    pb.finish_and_clear();

    let history = &report.history;
    println!("Training Summary");
    println!("================");
    println!("Dataset:        {}", dataset.name);
    println!("Epochs run:     {}", history.epochs_run);
    println!("Stopped early:  {}", history.stopped_early);
    println!("Best epoch:     {}", history.best_epoch);
    println!("Best val loss:  {:.4}", history.best_val_loss);
    println!("Training time:  {:.2}s", history.elapsed_secs);
    println!("Test loss:      {:.4}", report.test.loss);
    println!("Test accuracy:  {:.4}", report.test.accuracy);
    println!(
        "{} {} {} {} {} {} {} {}",
        config.learning_rate,
        config.weight_decay,
        config.patience,
        config.n_hidden,
        config.rnn_dropout,
        config.attention_dropout,
        config.dense_dropout,
        config.n_iters
    );

    if let Some(path) = &args.history {
        write_json(path, history)?;
        info!(path = %path.display(), "wrote training history");
    }
    if let Some(path) = &args.save {
        save_weights(&varmap, path)
            .with_context(|| format!("Failed to save weights to {}", path.display()))?;
        info!(path = %path.display(), "saved weights");
    }

    Ok(())
}

fn cmd_stats(data: &DataArgs) -> Result<()> {
    let options = LoadOptions {
        normalize_features: !data.no_normalize,
    };
    let dataset = load_dataset(data, &options)?;

    println!("Dataset Statistics");
    println!("==================");
    println!("Nodes:          {}", dataset.num_nodes());
    println!("Edges:          {}", dataset.graph.num_edges());
    println!("Features:       {}", dataset.num_features());
    println!("Classes:        {}", dataset.num_classes());
    let isolated: Vec<&str> = (0..dataset.num_nodes())
        .filter(|&i| dataset.graph.degree(i) == 0)
        .map(|i| dataset.paper_ids[i].as_str())
        .collect();
    println!("Isolated nodes: {}", isolated.len());
    if !isolated.is_empty() {
        let shown = isolated.len().min(5);
        println!("  e.g. {}", isolated[..shown].join(", "));
    }

    println!("\nClass sizes:");
    for (name, count) in dataset.classes.iter().zip(dataset.class_histogram()) {
        println!("  {} ({})", name, count);
    }

    Ok(())
}

fn cmd_propagate(data: &DataArgs, n_iter: usize, self_loops: bool) -> Result<()> {
    let options = LoadOptions {
        normalize_features: !data.no_normalize,
    };
    let dataset = load_dataset(data, &options)?;

    let device = Device::Cpu;
    let start = Instant::now();
    let p = array_to_tensor(&dataset.graph.propagation_matrix(self_loops), &device)?;
    let x = array_to_tensor(&dataset.features, &device)?;
    let snapshots = unroll(&x, &p, n_iter)?;
    let norms = snapshot_norms(&snapshots)?;
    println!("Unrolled {} steps in {:.2?}", n_iter, start.elapsed());

    println!("Mean feature norm per step:");
    for (step, norm) in norms.iter().enumerate() {
        println!("  P^{} X: {:.6}", step, norm);
    }

    Ok(())
}
