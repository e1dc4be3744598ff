//! Graph Recurrent Network.
//!
//! The GRN reads the diffusion snapshots of every node as a sequence:
//!
//! ```text
//! h_t   = GRU(P^t x_i, h_{t-1})             t = 0..T-1
//! a_t   = softmax_t(w^T dropout(h_t))       temporal attention
//! c_i   = sum_t a_t h_t
//! y_i   = W_out dropout(c_i) + b_out        class logits
//! ```
//!
//! All nodes are processed as one batch, so one forward pass costs `T` GRU
//! steps over an `(N, F)` input.

use candle_core::{Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::{gru, linear, Dropout, GRUConfig, Linear, Module, VarBuilder, GRU, RNN};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Shape and regularization of a [`Grn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnConfig {
    /// Sequence length: number of diffusion snapshots.
    pub n_iters: usize,
    /// Input feature dimension.
    pub n_feats: usize,
    /// GRU hidden dimension.
    pub n_hidden: usize,
    /// Output classes.
    pub n_classes: usize,
    /// Dropout on the GRU outputs.
    pub rnn_dropout: f32,
    /// Dropout before the attention scores.
    pub attention_dropout: f32,
    /// Dropout before the classifier.
    pub dense_dropout: f32,
}

impl GrnConfig {
    pub fn new(n_iters: usize, n_feats: usize, n_hidden: usize, n_classes: usize) -> Self {
        Self {
            n_iters,
            n_feats,
            n_hidden,
            n_classes,
            rnn_dropout: 0.2,
            attention_dropout: 0.2,
            dense_dropout: 0.4,
        }
    }

    pub fn with_dropout(mut self, rnn: f32, attention: f32, dense: f32) -> Self {
        self.rnn_dropout = rnn;
        self.attention_dropout = attention;
        self.dense_dropout = dense;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("n_iters", self.n_iters),
            ("n_feats", self.n_feats),
            ("n_hidden", self.n_hidden),
            ("n_classes", self.n_classes),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        let rates = [
            ("rnn_dropout", self.rnn_dropout),
            ("attention_dropout", self.attention_dropout),
            ("dense_dropout", self.dense_dropout),
        ];
        for (name, p) in rates {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!("{name} must be in [0, 1), got {p}")));
            }
        }
        Ok(())
    }
}

/// GRU encoder with temporal attention and a linear classifier.
pub struct Grn {
    config: GrnConfig,
    rnn: GRU,
    attention: Linear,
    classifier: Linear,
    rnn_dropout: Dropout,
    attention_dropout: Dropout,
    dense_dropout: Dropout,
}

impl Grn {
    /// Create a GRN, registering its parameters under `vb`.
    pub fn new(config: GrnConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let rnn = gru(
            config.n_feats,
            config.n_hidden,
            GRUConfig::default(),
            vb.pp("rnn"),
        )?;
        let attention = linear(config.n_hidden, 1, vb.pp("attention"))?;
        let classifier = linear(config.n_hidden, config.n_classes, vb.pp("classifier"))?;

        Ok(Self {
            rnn_dropout: Dropout::new(config.rnn_dropout),
            attention_dropout: Dropout::new(config.attention_dropout),
            dense_dropout: Dropout::new(config.dense_dropout),
            config,
            rnn,
            attention,
            classifier,
        })
    }

    pub fn config(&self) -> &GrnConfig {
        &self.config
    }

    /// Class logits `(n_nodes, n_classes)` for `(n_iters, n_nodes, n_feats)` snapshots.
    ///
    /// Dropout is applied only when `train` is set.
    pub fn forward_t(&self, snapshots: &Tensor, train: bool) -> Result<Tensor> {
        let (hidden, weights) = self.encode(snapshots, train)?;
        // (N, T, H) * (N, T, 1) summed over T -> (N, H)
        let context = hidden.broadcast_mul(&weights)?.sum(1)?;
        let context = self.dense_dropout.forward(&context, train)?;
        Ok(self.classifier.forward(&context)?)
    }

    /// Attention weights over the diffusion steps, `(n_nodes, n_iters)`, in eval mode.
    pub fn attention_weights(&self, snapshots: &Tensor) -> Result<Tensor> {
        let (_, weights) = self.encode(snapshots, false)?;
        Ok(weights.squeeze(D::Minus1)?)
    }

    /// GRU outputs `(N, T, H)` and softmax attention `(N, T, 1)`.
    fn encode(&self, snapshots: &Tensor, train: bool) -> Result<(Tensor, Tensor)> {
        let (steps, n_nodes, n_feats) = snapshots.dims3()?;
        if steps != self.config.n_iters {
            return Err(Error::DimensionMismatch {
                expected: self.config.n_iters,
                got: steps,
            });
        }
        if n_feats != self.config.n_feats {
            return Err(Error::DimensionMismatch {
                expected: self.config.n_feats,
                got: n_feats,
            });
        }

        let mut state = self.rnn.zero_state(n_nodes)?;
        let mut outputs = Vec::with_capacity(steps);
        for t in 0..steps {
            let x_t = snapshots.get(t)?;
            state = self.rnn.step(&x_t, &state)?;
            outputs.push(self.rnn_dropout.forward(state.h(), train)?);
        }
        let hidden = Tensor::stack(&outputs, 1)?;

        let scores = self
            .attention
            .forward(&self.attention_dropout.forward(&hidden, train)?)?;
        let weights = softmax(&scores, 1)?;
        Ok((hidden, weights))
    }
}
