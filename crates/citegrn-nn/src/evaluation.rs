//! Loss and accuracy over node subsets.
//!
//! All functions take the full `(N, C)` logits plus a `u32` index tensor
//! selecting the nodes to score (train, validation or test split).

use candle_core::{DType, Device, Tensor, D};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::grn::Grn;
use crate::{Error, Result};

/// Loss and accuracy on one split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub loss: f32,
    pub accuracy: f32,
}

/// Node index tensor for a split.
pub fn index_tensor(indices: &[u32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(indices, indices.len(), device)?)
}

fn select(logits: &Tensor, labels: &Tensor, idx: &Tensor) -> Result<(Tensor, Tensor)> {
    if idx.dim(0)? == 0 {
        return Err(Error::InvalidConfig("cannot evaluate an empty node set".into()));
    }
    let (n_nodes, _) = logits.dims2()?;
    let n_labels = labels.dim(0)?;
    if n_labels != n_nodes {
        return Err(Error::DimensionMismatch {
            expected: n_nodes,
            got: n_labels,
        });
    }
    Ok((logits.index_select(idx, 0)?, labels.index_select(idx, 0)?))
}

/// Mean cross entropy of the selected rows (scalar tensor, differentiable).
pub fn cross_entropy(logits: &Tensor, labels: &Tensor, idx: &Tensor) -> Result<Tensor> {
    let (logits, labels) = select(logits, labels, idx)?;
    Ok(candle_nn::loss::cross_entropy(&logits, &labels)?)
}

/// Fraction of selected rows whose argmax equals the label.
pub fn accuracy(logits: &Tensor, labels: &Tensor, idx: &Tensor) -> Result<f32> {
    let (logits, labels) = select(logits, labels, idx)?;
    let correct = logits
        .argmax(D::Minus1)?
        .eq(&labels)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()?;
    Ok(correct)
}

/// Loss and accuracy of precomputed logits.
pub fn evaluate_logits(logits: &Tensor, labels: &Tensor, idx: &Tensor) -> Result<EvalMetrics> {
    let loss = cross_entropy(logits, labels, idx)?.to_scalar::<f32>()?;
    let accuracy = accuracy(logits, labels, idx)?;
    Ok(EvalMetrics { loss, accuracy })
}

/// Run `model` in eval mode and score the nodes in `idx`.
pub fn evaluate(model: &Grn, snapshots: &Tensor, labels: &Tensor, idx: &Tensor) -> Result<EvalMetrics> {
    let logits = model.forward_t(snapshots, false)?;
    evaluate_logits(&logits, labels, idx)
}

/// Held-out evaluation, logged at info level.
pub fn test(model: &Grn, snapshots: &Tensor, labels: &Tensor, idx: &Tensor) -> Result<EvalMetrics> {
    let metrics = evaluate(model, snapshots, labels, idx)?;
    info!(
        "Loss = {:.4} Accuracy = {:.4}",
        metrics.loss, metrics.accuracy
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Tensor, Tensor) {
        let device = Device::Cpu;
        let logits = Tensor::new(
            &[[2.0f32, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 1.0], [5.0, 0.0, 0.0]],
            &device,
        )
        .unwrap();
        let labels = Tensor::new(&[0u32, 1, 0, 0], &device).unwrap();
        (logits, labels)
    }

    #[test]
    fn test_accuracy_on_subset() {
        let (logits, labels) = fixture();
        let all = index_tensor(&[0, 1, 2, 3], &Device::Cpu).unwrap();
        assert!((accuracy(&logits, &labels, &all).unwrap() - 0.75).abs() < 1e-6);

        let wrong = index_tensor(&[2], &Device::Cpu).unwrap();
        assert_eq!(accuracy(&logits, &labels, &wrong).unwrap(), 0.0);
    }

    #[test]
    fn test_cross_entropy_matches_manual() {
        let (logits, labels) = fixture();
        let idx = index_tensor(&[0], &Device::Cpu).unwrap();
        let loss = cross_entropy(&logits, &labels, &idx)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        // -log(e^2 / (e^2 + 2))
        let expected = -(2f32.exp() / (2f32.exp() + 2.0)).ln();
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_empty_index_rejected() {
        let (logits, labels) = fixture();
        let empty = index_tensor(&[], &Device::Cpu).unwrap();
        assert!(matches!(
            accuracy(&logits, &labels, &empty),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_evaluate_logits() {
        let (logits, labels) = fixture();
        let idx = index_tensor(&[1, 3], &Device::Cpu).unwrap();
        let m = evaluate_logits(&logits, &labels, &idx).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert!(m.loss > 0.0 && m.loss < 0.2);
    }
}
