//! Graph recurrent networks for node classification.
//!
//! `citegrn-nn` turns a citation graph into a sequence of diffused feature
//! snapshots and trains a recurrent classifier over that sequence.
//!
//! # Pipeline
//!
//! ```text
//! X, P  --unroll-->  [X, PX, P^2X, ..., P^(T-1)X]  --GRU-->  h_1..h_T
//!                                                   --attention-->  c  --linear-->  logits
//! ```
//!
//! - [`propagate`]: [`unroll`] and ndarray -> tensor conversion
//! - [`grn`]: the [`Grn`] model (GRU + temporal attention + classifier)
//! - [`evaluation`]: cross entropy, accuracy, [`EvalMetrics`]
//! - [`training`]: [`TrainingConfig`], [`EarlyStopping`], [`Trainer`], [`run`]
//!
//! # Example
//!
//! ```rust,ignore
//! use candle_core::Device;
//! use candle_nn::VarMap;
//! use citegrn_core::{Dataset, DatasetName};
//! use citegrn_nn::{run, TrainingConfig};
//!
//! let config = TrainingConfig::default().with_epochs(200);
//! let dataset = Dataset::load("data/cora", DatasetName::Cora, &config.load_options())?;
//! let varmap = VarMap::new();
//! let report = run(&dataset, &config, &varmap, &Device::Cpu, None)?;
//! println!("test accuracy {:.4}", report.test.accuracy);
//! ```

pub mod error;
pub mod evaluation;
pub mod grn;
pub mod propagate;
pub mod training;

pub use error::{Error, Result};
pub use evaluation::EvalMetrics;
pub use grn::{Grn, GrnConfig};
pub use propagate::unroll;
pub use training::{
    run, save_weights, EarlyStopping, EpochMetrics, ProgressCallback, RunReport, Trainer,
    TrainingConfig, TrainingHistory,
};
