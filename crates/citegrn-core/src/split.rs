//! Train / validation / test node splits.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How node ids are ordered before being cut into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Blocks over `0..n` in order.
    Sequential,
    /// Blocks over a seeded permutation of `0..n`.
    Random { seed: u64 },
}

/// Disjoint node index sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<u32>,
    pub val: Vec<u32>,
    pub test: Vec<u32>,
}

impl Split {
    /// Cut `n_train`, `n_val` and `n_test` consecutive nodes out of `0..n_nodes`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use citegrn_core::{Split, SplitStrategy};
    ///
    /// let split = Split::new(2, 3, 4, 10, SplitStrategy::Sequential).unwrap();
    /// assert_eq!(split.train, vec![0, 1]);
    /// assert_eq!(split.val, vec![2, 3, 4]);
    /// assert_eq!(split.test, vec![5, 6, 7, 8]);
    /// ```
    pub fn new(
        n_train: usize,
        n_val: usize,
        n_test: usize,
        n_nodes: usize,
        strategy: SplitStrategy,
    ) -> Result<Self> {
        if n_train == 0 {
            return Err(Error::InvalidSplit("training split is empty".into()));
        }
        let total = n_train
            .checked_add(n_val)
            .and_then(|s| s.checked_add(n_test))
            .ok_or_else(|| {
                Error::InvalidSplit(format!(
                    "{n_train} + {n_val} + {n_test} nodes requested, sum overflows"
                ))
            })?;
        if total > n_nodes {
            return Err(Error::InvalidSplit(format!(
                "{n_train} + {n_val} + {n_test} = {total} nodes requested, graph has {n_nodes}"
            )));
        }
        if n_nodes > u32::MAX as usize {
            return Err(Error::InvalidSplit(format!("{n_nodes} nodes exceed u32 indices")));
        }

        let mut order: Vec<u32> = (0..n_nodes as u32).collect();
        if let SplitStrategy::Random { seed } = strategy {
            let mut rng = StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }

        let (train, rest) = order.split_at(n_train);
        let (val, rest) = rest.split_at(n_val);
        let test = &rest[..n_test];

        Ok(Self {
            train: train.to_vec(),
            val: val.to_vec(),
            test: test.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rejects_oversized_split() {
        let err = Split::new(140, 500, 1000, 1000, SplitStrategy::Sequential).unwrap_err();
        assert!(matches!(err, Error::InvalidSplit(_)));
    }

    #[test]
    fn test_rejects_overflowing_split_sizes() {
        let err = Split::new(1, usize::MAX, 2, 10, SplitStrategy::Sequential).unwrap_err();
        assert!(matches!(err, Error::InvalidSplit(_)));
        let err = Split::new(usize::MAX, 0, 1, 10, SplitStrategy::Random { seed: 3 }).unwrap_err();
        assert!(matches!(err, Error::InvalidSplit(_)));
    }

    #[test]
    fn test_rejects_empty_train() {
        assert!(Split::new(0, 5, 5, 20, SplitStrategy::Sequential).is_err());
    }

    #[test]
    fn test_random_split_is_seeded() {
        let a = Split::new(10, 10, 10, 50, SplitStrategy::Random { seed: 7 }).unwrap();
        let b = Split::new(10, 10, 10, 50, SplitStrategy::Random { seed: 7 }).unwrap();
        let c = Split::new(10, 10, 10, 50, SplitStrategy::Random { seed: 8 }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_random_split_disjoint() {
        let s = Split::new(10, 20, 15, 60, SplitStrategy::Random { seed: 1 }).unwrap();
        let all: HashSet<u32> = s.train.iter().chain(&s.val).chain(&s.test).copied().collect();
        assert_eq!(all.len(), 45);
        assert!(all.iter().all(|&i| i < 60));
    }

    #[test]
    fn test_exact_fit() {
        let s = Split::new(1, 1, 1, 3, SplitStrategy::Sequential).unwrap();
        assert_eq!(s.test, vec![2]);
        assert_eq!(s.len(), 3);
    }
}
