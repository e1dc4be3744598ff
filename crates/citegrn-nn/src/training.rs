//! Training loop for graph recurrent networks.
//!
//! One epoch is one full-batch step over the training nodes:
//!
//! 1. forward in train mode (dropout on), cross entropy on the train split
//!    plus the L2 penalty `0.5 * weight_decay * sum ||w||^2`,
//! 2. backward pass and Adam update,
//! 3. forward in eval mode, loss and accuracy on the validation split,
//! 4. early-stopping check on the validation loss.
//!
//! The L2 term goes through the loss rather than decoupled AdamW decay, so
//! `weight_decay` behaves like classic Adam weight decay.
//!
//! # Example
//!
//! ```rust,ignore
//! use citegrn_nn::training::TrainingConfig;
//!
//! let config = TrainingConfig::default()
//!     .with_learning_rate(0.005)
//!     .with_hidden(64)
//!     .with_patience(10);
//! config.validate()?;
//! ```

use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use citegrn_core::{Dataset, LoadOptions, Split, SplitStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::evaluation::{self, index_tensor, EvalMetrics};
use crate::grn::{Grn, GrnConfig};
use crate::propagate::{array_to_tensor, unroll};
use crate::{Error, Result};

/// Stop when validation loss has not improved for more than `patience` epochs.
///
/// # Example
///
/// ```rust
/// use citegrn_nn::EarlyStopping;
///
/// let mut es = EarlyStopping::new(1);
/// assert!(!es.observe(1.0)); // new best
/// assert!(!es.observe(1.2)); // 1 bad epoch
/// assert!(es.observe(1.1));  // 2 bad epochs > patience
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyStopping {
    best: f32,
    patience: usize,
    bad_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            best: f32::INFINITY,
            patience,
            bad_epochs: 0,
        }
    }

    /// Record a validation loss; returns `true` when training should stop.
    ///
    /// Only a strictly lower loss counts as an improvement, and it resets
    /// the count of bad epochs.
    pub fn observe(&mut self, loss: f32) -> bool {
        if loss < self.best {
            self.best = loss;
            self.bad_epochs = 0;
            return false;
        }
        self.bad_epochs += 1;
        self.bad_epochs > self.patience
    }

    /// [`observe`](Self::observe) the latest entry of a loss history.
    pub fn check(&mut self, history: &[f32]) -> bool {
        match history.last() {
            Some(&loss) => self.observe(loss),
            None => false,
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    pub fn bad_epochs(&self) -> usize {
        self.bad_epochs
    }
}

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Adam learning rate (default: 0.01).
    pub learning_rate: f64,
    /// L2 weight decay (default: 0.01).
    pub weight_decay: f64,
    /// GRU hidden size (default: 112).
    pub n_hidden: usize,
    /// Diffusion steps, i.e. GRN sequence length (default: 9).
    pub n_iters: usize,
    /// Maximum epochs (default: 200).
    pub epochs: usize,
    /// Early stopping patience (default: 5).
    pub patience: usize,
    /// Dropout on GRU outputs (default: 0.2).
    pub rnn_dropout: f32,
    /// Dropout before attention (default: 0.2).
    pub attention_dropout: f32,
    /// Dropout before the classifier (default: 0.4).
    pub dense_dropout: f32,
    /// Add self-loops before normalizing the adjacency (default: true).
    pub self_loops: bool,
    /// Row-normalize node features on load (default: true).
    pub normalize_features: bool,
    /// Training nodes (default: 140).
    pub n_train: usize,
    /// Validation nodes (default: 500).
    pub n_val: usize,
    /// Test nodes (default: 1000).
    pub n_test: usize,
    /// Shuffle nodes before splitting (default: false).
    pub shuffle_split: bool,
    /// Seed for the split shuffle (default: 42).
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-2,
            weight_decay: 1e-2,
            n_hidden: 112,
            n_iters: 9,
            epochs: 200,
            patience: 5,
            rnn_dropout: 0.2,
            attention_dropout: 0.2,
            dense_dropout: 0.4,
            self_loops: true,
            normalize_features: true,
            n_train: 140,
            n_val: 500,
            n_test: 1000,
            shuffle_split: false,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Load a (possibly partial) config from JSON; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_weight_decay(mut self, wd: f64) -> Self {
        self.weight_decay = wd;
        self
    }

    pub fn with_hidden(mut self, n_hidden: usize) -> Self {
        self.n_hidden = n_hidden;
        self
    }

    pub fn with_iters(mut self, n_iters: usize) -> Self {
        self.n_iters = n_iters;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_dropout(mut self, rnn: f32, attention: f32, dense: f32) -> Self {
        self.rnn_dropout = rnn;
        self.attention_dropout = attention;
        self.dense_dropout = dense;
        self
    }

    pub fn with_split(mut self, n_train: usize, n_val: usize, n_test: usize) -> Self {
        self.n_train = n_train;
        self.n_val = n_val;
        self.n_test = n_test;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be positive".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.weight_decay.is_nan() || self.weight_decay < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "weight decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        if self.n_val == 0 || self.n_test == 0 {
            return Err(Error::InvalidConfig(
                "validation and test splits must be non-empty".into(),
            ));
        }
        // Remaining shape and dropout checks are shared with the model.
        self.grn_config(1, 1).validate()
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            normalize_features: self.normalize_features,
        }
    }

    pub fn split_strategy(&self) -> SplitStrategy {
        if self.shuffle_split {
            SplitStrategy::Random { seed: self.seed }
        } else {
            SplitStrategy::Sequential
        }
    }

    pub fn grn_config(&self, n_feats: usize, n_classes: usize) -> GrnConfig {
        GrnConfig::new(self.n_iters, n_feats, self.n_hidden, n_classes).with_dropout(
            self.rnn_dropout,
            self.attention_dropout,
            self.dense_dropout,
        )
    }
}

/// Metrics reported after each epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub train_loss: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// Callback for training progress (epoch, metrics).
pub type ProgressCallback = Box<dyn Fn(usize, &EpochMetrics) + Send + Sync>;

/// Loss and accuracy curves of one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Training cross entropy per epoch (without the L2 term).
    pub train_loss: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_accuracy: Vec<f32>,
    /// Epoch with the lowest validation loss.
    pub best_epoch: usize,
    pub best_val_loss: f32,
    pub stopped_early: bool,
    pub epochs_run: usize,
    pub elapsed_secs: f64,
}

/// Full-batch GRN trainer.
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
}

impl Trainer {
    pub fn new(config: TrainingConfig, device: Device) -> Self {
        Self { config, device }
    }

    /// Train `model`, whose parameters live in `varmap`, on the snapshots.
    pub fn train(
        &self,
        model: &Grn,
        varmap: &VarMap,
        snapshots: &Tensor,
        labels: &Tensor,
        split: &Split,
        callback: Option<&ProgressCallback>,
    ) -> Result<TrainingHistory> {
        self.config.validate()?;
        let start = Instant::now();

        let train_idx = index_tensor(&split.train, &self.device)?;
        let val_idx = index_tensor(&split.val, &self.device)?;

        let vars = varmap.all_vars();
        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(vars.clone(), params)?;
        let mut early_stopping = EarlyStopping::new(self.config.patience);

        let mut history = TrainingHistory {
            best_val_loss: f32::INFINITY,
            ..Default::default()
        };

        info!(
            epochs = self.config.epochs,
            lr = self.config.learning_rate,
            weight_decay = self.config.weight_decay,
            patience = self.config.patience,
            train = split.train.len(),
            val = split.val.len(),
            "starting training"
        );

        for epoch in 0..self.config.epochs {
            let logits = model.forward_t(snapshots, true)?;
            let ce = evaluation::cross_entropy(&logits, labels, &train_idx)?;
            let train_loss = ce.to_scalar::<f32>()?;
            if !train_loss.is_finite() {
                return Err(Error::Training(format!(
                    "training loss diverged at epoch {epoch}: {train_loss}"
                )));
            }

            let penalty = if self.config.weight_decay > 0.0 {
                l2_penalty(&vars)?
            } else {
                None
            };
            let loss = match penalty {
                Some(penalty) => (ce + penalty.affine(0.5 * self.config.weight_decay, 0.0)?)?,
                None => ce,
            };
            optimizer.backward_step(&loss)?;

            let logits = model.forward_t(snapshots, false)?;
            let val = evaluation::evaluate_logits(&logits, labels, &val_idx)?;

            history.train_loss.push(train_loss);
            history.val_loss.push(val.loss);
            history.val_accuracy.push(val.accuracy);
            history.epochs_run = epoch + 1;
            if val.loss < history.best_val_loss {
                history.best_val_loss = val.loss;
                history.best_epoch = epoch;
            }

            let metrics = EpochMetrics {
                train_loss,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
            };
            debug!(
                epoch,
                train_loss,
                val_loss = val.loss,
                val_acc = val.accuracy,
                "epoch done"
            );
            if let Some(cb) = callback {
                cb(epoch, &metrics);
            }

            if early_stopping.check(&history.val_loss) {
                info!(
                    epoch,
                    best_epoch = history.best_epoch,
                    best_val_loss = history.best_val_loss,
                    "early stopping"
                );
                history.stopped_early = true;
                break;
            }
        }

        history.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(history)
    }
}

/// `sum ||w||^2` over all parameters, or `None` when there are none.
fn l2_penalty(vars: &[Var]) -> Result<Option<Tensor>> {
    let mut total: Option<Tensor> = None;
    for var in vars {
        let sq = var.as_tensor().sqr()?.sum_all()?;
        total = Some(match total {
            Some(acc) => (acc + sq)?,
            None => sq,
        });
    }
    Ok(total)
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub config: TrainingConfig,
    pub history: TrainingHistory,
    pub test: EvalMetrics,
}

/// Split, propagate, unroll, build the GRN, train it and score the test split.
///
/// The model parameters are registered in `varmap` so callers can save them.
pub fn run(
    dataset: &Dataset,
    config: &TrainingConfig,
    varmap: &VarMap,
    device: &Device,
    callback: Option<&ProgressCallback>,
) -> Result<RunReport> {
    config.validate()?;

    let split = Split::new(
        config.n_train,
        config.n_val,
        config.n_test,
        dataset.num_nodes(),
        config.split_strategy(),
    )?;

    let p = array_to_tensor(&dataset.graph.propagation_matrix(config.self_loops), device)?;
    let x = array_to_tensor(&dataset.features, device)?;
    let snapshots = unroll(&x, &p, config.n_iters)?;
    let labels = Tensor::from_slice(dataset.labels.as_slice(), dataset.num_nodes(), device)?;
    debug!(shape = ?snapshots.dims(), "unrolled features");

    let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
    let model = Grn::new(
        config.grn_config(dataset.num_features(), dataset.num_classes()),
        vb,
    )?;
    let grn = model.config();
    info!(
        n_iters = grn.n_iters,
        n_feats = grn.n_feats,
        n_hidden = grn.n_hidden,
        n_classes = grn.n_classes,
        "built GRN"
    );

    let trainer = Trainer::new(config.clone(), device.clone());
    let history = trainer.train(&model, varmap, &snapshots, &labels, &split, callback)?;

    let test_idx = index_tensor(&split.test, device)?;
    let test = evaluation::test(&model, &snapshots, &labels, &test_idx)?;

    Ok(RunReport {
        config: config.clone(),
        history,
        test,
    })
}

/// Write the model parameters as safetensors.
pub fn save_weights(varmap: &VarMap, path: impl AsRef<Path>) -> Result<()> {
    varmap.save(path)?;
    Ok(())
}
