// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Prediction task and target labelling

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which head the model carries and how targets are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Thresholded delivery, binary cross-entropy, ROC/AUC
    Classification,
    /// Continuous delivery, standardized targets, R²/Pearson/Spearman
    Regression,
}

impl Task {
    pub fn is_regression(&self) -> bool {
        matches!(self, Task::Regression)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => write!(f, "classification"),
            Task::Regression => write!(f, "regression"),
        }
    }
}

/// 1.0 when `value` is strictly above `threshold`, 0.0 otherwise
pub fn binarize(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        1.0
    } else {
        0.0
    }
}

/// Label every target for the given task
pub fn label_targets(targets: &[f64], task: Task, threshold: f64) -> Vec<f64> {
    match task {
        Task::Classification => targets.iter().map(|&y| binarize(y, threshold)).collect(),
        Task::Regression => targets.to_vec(),
    }
}

/// Fraction of positive labels
pub fn positive_fraction(labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    labels.iter().filter(|&&y| y > 0.5).count() as f64 / labels.len() as f64
}
