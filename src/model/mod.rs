// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Property models
//!
//! Implements:
//! - `PropertyModel`, the fit/predict seam the pipeline is generic over
//! - Mean baseline (predicts the training mean or positive rate)
//! - Message-passing neural network (`Mpnn`, candle)

pub mod batch;
pub mod mpnn;

use crate::dataset::{targets, Datapoint};
use crate::error::{PipelineError, Result};
use crate::labels::Task;
use crate::scaler::StandardScaler;
use serde::{Deserialize, Serialize};

pub use batch::BatchGraph;
pub use mpnn::{ModelConfig, Mpnn};

/// Losses of one training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: Option<f64>,
    /// AUROC for classification, R² (original units) for regression
    pub val_metric: Option<f64>,
    pub learning_rate: f64,
}

/// What a call to `fit` produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitReport {
    pub epochs: Vec<EpochSummary>,
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub best_checkpoint: Option<String>,
}

/// A trainable molecular property predictor
pub trait PropertyModel {
    /// Train on `train`, monitoring `validation`. Regression targets are
    /// standardized with `scaler` inside the model; predictions come back in
    /// original units.
    fn fit(
        &mut self,
        train: &[Datapoint],
        validation: &[Datapoint],
        scaler: Option<&StandardScaler>,
    ) -> Result<FitReport>;

    /// One value per datapoint: P(positive) for classification, the
    /// unscaled target for regression
    fn predict(&self, data: &[Datapoint]) -> Result<Vec<f64>>;

    fn task(&self) -> Task;

    fn name(&self) -> &str;

    fn description(&self) -> &str;
}

/// Predicts a constant learned from the training partition
#[derive(Debug, Clone)]
pub struct MeanBaseline {
    task: Task,
    value: Option<f64>,
}

impl MeanBaseline {
    pub fn new(task: Task) -> Self {
        Self { task, value: None }
    }
}

impl PropertyModel for MeanBaseline {
    fn fit(
        &mut self,
        train: &[Datapoint],
        _validation: &[Datapoint],
        _scaler: Option<&StandardScaler>,
    ) -> Result<FitReport> {
        if train.is_empty() {
            return Err(PipelineError::EmptyPartition("train"));
        }
        let ys = targets(train);
        self.value = Some(ys.iter().sum::<f64>() / ys.len() as f64);
        Ok(FitReport::default())
    }

    fn predict(&self, data: &[Datapoint]) -> Result<Vec<f64>> {
        let value = self
            .value
            .ok_or_else(|| PipelineError::Checkpoint("mean baseline has not been fit".to_string()))?;
        Ok(vec![value; data.len()])
    }

    fn task(&self) -> Task {
        self.task
    }

    fn name(&self) -> &str {
        "Mean"
    }

    fn description(&self) -> &str {
        "Predicts the training mean (regression) or positive rate (classification)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(values: &[f64]) -> Vec<Datapoint> {
        values
            .iter()
            .map(|&y| Datapoint::from_smiles("CCO", y).unwrap())
            .collect()
    }

    #[test]
    fn test_mean_baseline() {
        let mut model = MeanBaseline::new(Task::Regression);
        assert!(model.predict(&points(&[1.0])).is_err());

        model.fit(&points(&[1.0, 2.0, 3.0]), &[], None).unwrap();
        assert_eq!(model.predict(&points(&[0.0, 0.0])).unwrap(), vec![2.0, 2.0]);
        assert_eq!(model.task(), Task::Regression);
    }

    #[test]
    fn test_mean_baseline_positive_rate() {
        let mut model = MeanBaseline::new(Task::Classification);
        model.fit(&points(&[1.0, 0.0, 0.0, 1.0]), &[], None).unwrap();
        assert_eq!(model.predict(&points(&[0.0])).unwrap(), vec![0.5]);
    }

    #[test]
    fn test_empty_train_fails() {
        let mut model = MeanBaseline::new(Task::Regression);
        assert!(model.fit(&[], &[], None).is_err());
    }
}
