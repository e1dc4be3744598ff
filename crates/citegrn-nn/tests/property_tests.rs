//! Property-based tests for early stopping and feature unrolling.

use candle_core::Device;
use citegrn_core::CitationGraph;
use citegrn_nn::propagate::array_to_tensor;
use citegrn_nn::{unroll, EarlyStopping};
use ndarray::Array2;
use proptest::prelude::*;

mod early_stopping_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn never_stops_while_improving(start in 1.0f32..100.0, steps in 1usize..50, patience in 0usize..5) {
            let mut es = EarlyStopping::new(patience);
            let mut loss = start;
            for _ in 0..steps {
                prop_assert!(!es.observe(loss));
                loss *= 0.9;
            }
            prop_assert_eq!(es.bad_epochs(), 0);
        }

        #[test]
        fn stops_after_patience_plus_one_plateau(best in 0.0f32..10.0, patience in 0usize..8) {
            let mut es = EarlyStopping::new(patience);
            prop_assert!(!es.observe(best));
            for _ in 0..patience {
                prop_assert!(!es.observe(best + 1.0));
            }
            prop_assert!(es.observe(best + 1.0));
            prop_assert_eq!(es.best(), best);
        }
    }
}

mod unroll_props {
    use super::*;

    fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<usize>)> {
        (2usize..12).prop_flat_map(|n| {
            let edges = prop::collection::vec((0..n, 0..n), 0..24);
            let classes = prop::collection::vec(0usize..3, n);
            (Just(n), edges, classes)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn snapshots_keep_unit_row_sums((n, edges, classes) in arb_graph(), n_iters in 1usize..5) {
            let graph = CitationGraph::from_edges(n, edges).unwrap();
            let mut features = Array2::<f32>::zeros((n, 3));
            for (i, &c) in classes.iter().enumerate() {
                features[[i, c]] = 1.0;
            }

            let device = Device::Cpu;
            let p = array_to_tensor(&graph.propagation_matrix(true), &device).unwrap();
            let x = array_to_tensor(&features, &device).unwrap();
            let snapshots = unroll(&x, &p, n_iters).unwrap();
            prop_assert_eq!(snapshots.dims(), &[n_iters, n, 3]);

            for t in 0..n_iters {
                let sums = snapshots.get(t).unwrap().sum(1).unwrap().to_vec1::<f32>().unwrap();
                for s in sums {
                    prop_assert!((s - 1.0).abs() < 1e-4, "step {} row sum {}", t, s);
                }
            }
        }
    }
}
