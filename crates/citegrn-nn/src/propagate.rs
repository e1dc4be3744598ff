//! Feature diffusion over the propagation operator.
//!
//! Given node features `X` and a propagation operator `P` (typically
//! `D^-1 A`), [`unroll`] materializes the first `T` diffusion steps:
//!
//! ```text
//! out[0] = X
//! out[i] = P * out[i-1]        (= P^i X)
//! ```
//!
//! The stacked `(T, N, F)` tensor is the input sequence of the GRN.

use candle_core::{Device, Tensor, D};
use ndarray::Array2;

use crate::{Error, Result};

/// Stack `X, PX, ..., P^(n_iters-1) X` into a `(n_iters, n_nodes, n_feats)` tensor.
pub fn unroll(x: &Tensor, p: &Tensor, n_iters: usize) -> Result<Tensor> {
    if n_iters == 0 {
        return Err(Error::InvalidConfig("n_iters must be at least 1".into()));
    }
    let (n_nodes, _) = x.dims2()?;
    let (rows, cols) = p.dims2()?;
    if rows != n_nodes {
        return Err(Error::DimensionMismatch {
            expected: n_nodes,
            got: rows,
        });
    }
    if cols != n_nodes {
        return Err(Error::DimensionMismatch {
            expected: n_nodes,
            got: cols,
        });
    }

    let mut snapshots = Vec::with_capacity(n_iters);
    snapshots.push(x.clone());
    for i in 1..n_iters {
        let next = p.matmul(&snapshots[i - 1])?;
        snapshots.push(next);
    }
    Ok(Tensor::stack(&snapshots, 0)?)
}

/// Copy a row-major ndarray matrix onto `device`.
pub fn array_to_tensor(array: &Array2<f32>, device: &Device) -> Result<Tensor> {
    let shape = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_vec(data, shape, device)?)
}

/// Mean L2 norm of the node feature rows at each diffusion step.
///
/// Diffusion smooths features towards their neighbourhood average, so on
/// row-normalized inputs the norms shrink with depth.
pub fn snapshot_norms(snapshots: &Tensor) -> Result<Vec<f32>> {
    let norms = snapshots.sqr()?.sum(D::Minus1)?.sqrt()?.mean(1)?;
    Ok(norms.to_vec1::<f32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;
    use ndarray::array;

    fn line_operator(device: &Device) -> Tensor {
        // 0 - 1 - 2 with self-loops, row normalized
        let p = array![
            [0.5, 0.5, 0.0],
            [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            [0.0, 0.5, 0.5],
        ];
        array_to_tensor(&p, device).unwrap()
    }

    #[test]
    fn test_unroll_shape_and_first_slice() {
        let device = Device::Cpu;
        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let p = line_operator(&device);

        let out = unroll(&x, &p, 5).unwrap();
        assert_eq!(out.dims(), &[5, 3, 4]);

        let first = out.i(0).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(first, x.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn test_unroll_matches_repeated_matmul() {
        let device = Device::Cpu;
        let x = array_to_tensor(&array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]], &device).unwrap();
        let p = line_operator(&device);

        let out = unroll(&x, &p, 3).unwrap();
        let p2x = p.matmul(&p.matmul(&x).unwrap()).unwrap();

        let got = out.i(2).unwrap().to_vec2::<f32>().unwrap();
        let want = p2x.to_vec2::<f32>().unwrap();
        for (g, w) in got.iter().flatten().zip(want.iter().flatten()) {
            assert!((g - w).abs() < 1e-6);
        }
    }

    #[test]
    fn test_single_step_is_identity() {
        let device = Device::Cpu;
        let x = Tensor::ones((3, 2), candle_core::DType::F32, &device).unwrap();
        let out = unroll(&x, &line_operator(&device), 1).unwrap();
        assert_eq!(out.dims(), &[1, 3, 2]);
    }

    #[test]
    fn test_unroll_rejects_zero_steps_and_bad_shapes() {
        let device = Device::Cpu;
        let x = Tensor::ones((3, 2), candle_core::DType::F32, &device).unwrap();
        let p = line_operator(&device);

        assert!(matches!(unroll(&x, &p, 0), Err(Error::InvalidConfig(_))));

        let bad = Tensor::ones((4, 4), candle_core::DType::F32, &device).unwrap();
        assert!(matches!(
            unroll(&x, &bad, 2),
            Err(Error::DimensionMismatch { expected: 3, got: 4 })
        ));
    }

    #[test]
    fn test_row_stochastic_diffusion_preserves_constants() {
        let device = Device::Cpu;
        let x = Tensor::ones((3, 2), candle_core::DType::F32, &device).unwrap();
        let out = unroll(&x, &line_operator(&device), 4).unwrap();

        let norms = snapshot_norms(&out).unwrap();
        assert_eq!(norms.len(), 4);
        for n in norms {
            assert!((n - 2f32.sqrt()).abs() < 1e-5);
        }
    }
}
