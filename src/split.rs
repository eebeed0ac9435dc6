// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Seeded train/validation/test splitting

use crate::error::{PipelineError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Random,
}

/// Index sets of the three partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Materialize the partitions of `items`
    pub fn apply<T: Clone>(&self, items: &[T]) -> (Vec<T>, Vec<T>, Vec<T>) {
        let pick = |indices: &[usize]| indices.iter().map(|&i| items[i].clone()).collect();
        (pick(&self.train), pick(&self.validation), pick(&self.test))
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Shuffle `0..n` with `seed` and cut at floor(train·n) and floor((train+val)·n)
pub fn split_indices(n: usize, kind: SplitKind, sizes: [f64; 3], seed: u64) -> Result<SplitIndices> {
    if sizes.iter().any(|s| *s < 0.0) {
        return Err(PipelineError::InvalidSplit(format!(
            "fractions must be non-negative, got {:?}",
            sizes
        )));
    }
    let total: f64 = sizes.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(PipelineError::InvalidSplit(format!(
            "fractions must sum to 1, got {}",
            total
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    match kind {
        SplitKind::Random => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }
    }

    let train_end = ((n as f64 * sizes[0]) as usize).min(n);
    let val_end = ((n as f64 * (sizes[0] + sizes[1])) as usize).clamp(train_end, n);

    let test = indices.split_off(val_end);
    let validation = indices.split_off(train_end);
    let train = indices;

    tracing::debug!(
        "Split {} items: train={}, val={}, test={}",
        n,
        train.len(),
        validation.len(),
        test.len()
    );

    Ok(SplitIndices {
        train,
        validation,
        test,
    })
}
