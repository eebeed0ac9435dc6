// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible training and evaluation pipeline
//!
//! Orchestrates:
//! - Dataset loading, deduplication and experiment exclusion
//! - Labelling and the seeded split
//! - Target scaling (regression)
//! - Model fitting and test prediction
//! - Metrics, plots and results serialization

use crate::config::PipelineConfig;
use crate::dataset::{prepare_records, sorted_targets, targets, Datapoint, Dataset, Record};
use crate::error::{PipelineError, Result};
use crate::labels::{binarize, positive_fraction, Task};
use crate::metrics::{ClassificationMetrics, RegressionMetrics};
use crate::model::{FitReport, PropertyModel};
use crate::plots;
use crate::run::{inference_plot_path, inference_roc_path, HyperParams, RunName};
use crate::scaler::StandardScaler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Test-set metrics for either task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum TaskMetrics {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
}

impl TaskMetrics {
    pub fn format(&self) -> String {
        match self {
            TaskMetrics::Classification(m) => m.format(),
            TaskMetrics::Regression(m) => m.format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub path: String,
    pub molecules: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub test_samples: usize,
    /// Fraction of positives in train (classification only)
    pub positive_fraction: Option<f64>,
    pub scaler: Option<StandardScaler>,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResults {
    pub run_name: String,
    pub model_name: String,
    pub model_description: String,
    pub hyperparams: Option<HyperParams>,
    pub dataset_info: DatasetInfo,
    pub fit: Option<FitReport>,
    pub metrics: TaskMetrics,
    pub plots: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Compute test metrics and write the task's figure
pub fn evaluate_predictions(
    task: Task,
    y_true: &[f64],
    y_pred: &[f64],
    plot_path: &Path,
    title: &str,
) -> Result<TaskMetrics> {
    if y_true.is_empty() {
        return Err(PipelineError::EmptyPartition("test"));
    }
    match task {
        Task::Classification => {
            let metrics = ClassificationMetrics::compute(y_true, y_pred);
            plots::roc_curve(plot_path, &metrics.roc, metrics.auc_roc)?;
            Ok(TaskMetrics::Classification(metrics))
        }
        Task::Regression => {
            let metrics = RegressionMetrics::compute(y_true, y_pred);
            plots::prediction_scatter(plot_path, title, y_true, y_pred, metrics.spearman)?;
            Ok(TaskMetrics::Regression(metrics))
        }
    }
}

/// Load, label and split the configured data for training
pub fn load_training_data(config: &PipelineConfig, task: Task) -> Result<(Vec<Record>, Dataset)> {
    let records = prepare_records(&config.data_path, config)?;
    if records.is_empty() {
        return Err(PipelineError::EmptyPartition("dataset"));
    }
    let dataset = Dataset::from_records(&records, task, config)?;
    Ok((records, dataset))
}

/// Training pipeline for one task and one hyperparameter setting
pub struct TrainingPipeline {
    config: PipelineConfig,
    run: RunName,
    task: Task,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig, run: RunName, task: Task) -> Self {
        Self { config, run, task }
    }

    pub fn run_name(&self) -> &RunName {
        &self.run
    }

    /// Directory the model should checkpoint into
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.run.checkpoint_dir(&self.config.output_dir)
    }

    pub fn run<M: PropertyModel>(&self, model: &mut M) -> Result<EvaluationResults> {
        if model.task() != self.task {
            return Err(PipelineError::Config(format!(
                "{} model given to a {} pipeline",
                model.task(),
                self.task
            )));
        }
        std::fs::create_dir_all(&self.config.output_dir)?;
        let output_dir = &self.config.output_dir;
        let mut written = Vec::new();

        let (records, dataset) = load_training_data(&self.config, self.task)?;

        let dist_path = self.run.target_distribution_path(output_dir);
        let run_name = self.run.to_string();
        plots::target_distribution(&dist_path, &run_name, &sorted_targets(&records))?;
        written.push(dist_path.display().to_string());

        if dataset.train.is_empty() {
            return Err(PipelineError::EmptyPartition("train"));
        }

        let train_targets = targets(&dataset.train);
        let scaler = match self.task {
            Task::Regression => Some(StandardScaler::fit(&train_targets)?),
            Task::Classification => None,
        };
        let positives = match self.task {
            Task::Classification => {
                let fraction = positive_fraction(&train_targets);
                tracing::info!("Positive fraction in train: {:.3}", fraction);
                Some(fraction)
            }
            Task::Regression => None,
        };
        if let Some(s) = &scaler {
            tracing::info!("Target scaler: mean={:.4} std={:.4}", s.mean, s.scale);
        }

        tracing::info!("Training model: {}", model.name());
        let fit = model.fit(&dataset.train, &dataset.validation, scaler.as_ref())?;

        let predictions = model.predict(&dataset.test)?;
        let plot_path = match self.task {
            Task::Classification => self.run.roc_curve_path(output_dir),
            Task::Regression => self.run.test_predictions_path(output_dir),
        };
        let metrics = evaluate_predictions(
            self.task,
            &targets(&dataset.test),
            &predictions,
            &plot_path,
            &self.run.to_string(),
        )?;
        written.push(plot_path.display().to_string());

        Ok(EvaluationResults {
            run_name: self.run.to_string(),
            model_name: model.name().to_string(),
            model_description: model.description().to_string(),
            hyperparams: Some(self.run.params),
            dataset_info: DatasetInfo {
                path: self.config.data_path.display().to_string(),
                molecules: dataset.total_samples(),
                train_samples: dataset.train.len(),
                validation_samples: dataset.validation.len(),
                test_samples: dataset.test.len(),
                positive_fraction: positives,
                scaler,
            },
            fit: Some(fit),
            metrics,
            plots: written,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

/// Parse every record on its own; unparseable SMILES are reported and left
/// as `None` in their slot
pub fn parse_lenient(records: &[Record], task: Task, threshold: f64) -> Vec<Option<Datapoint>> {
    records
        .iter()
        .map(|r| {
            let y = match task {
                Task::Classification => binarize(r.target, threshold),
                Task::Regression => r.target,
            };
            match Datapoint::from_smiles(&r.smiles, y) {
                Ok(point) => Some(point),
                Err(e) => {
                    println!("Invalid SMILES skipped: {}", r.smiles);
                    tracing::debug!("{}", e);
                    None
                }
            }
        })
        .collect()
}

/// The partitions of a training run on the same data and seed, minus the
/// molecules that do not parse; prints the number that do
pub fn inference_dataset(config: &PipelineConfig, task: Task) -> Result<Dataset> {
    let records = prepare_records(&config.data_path, config)?;
    let parsed = parse_lenient(&records, task, config.class_threshold);
    println!("{}", parsed.iter().flatten().count());
    Dataset::from_parsed(parsed, task, config)
}

/// Re-create the test partition and evaluate a trained model on it
pub fn run_inference<M: PropertyModel>(
    config: &PipelineConfig,
    model: &M,
    name: &str,
) -> Result<EvaluationResults> {
    std::fs::create_dir_all(&config.output_dir)?;

    let dataset = inference_dataset(config, model.task())?;
    let predictions = model.predict(&dataset.test)?;

    let plot_path = match model.task() {
        Task::Classification => inference_roc_path(&config.output_dir, name),
        Task::Regression => inference_plot_path(&config.output_dir, name),
    };
    let metrics = evaluate_predictions(
        model.task(),
        &targets(&dataset.test),
        &predictions,
        &plot_path,
        name,
    )?;

    Ok(EvaluationResults {
        run_name: format!("best_{}", name),
        model_name: model.name().to_string(),
        model_description: model.description().to_string(),
        hyperparams: None,
        dataset_info: DatasetInfo {
            path: config.data_path.display().to_string(),
            molecules: dataset.total_samples(),
            train_samples: dataset.train.len(),
            validation_samples: dataset.validation.len(),
            test_samples: dataset.test.len(),
            positive_fraction: None,
            scaler: None,
        },
        fit: None,
        metrics,
        plots: vec![plot_path.display().to_string()],
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Save results to JSON file
pub fn save_results(results: &EvaluationResults, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(output_path, json)?;
    tracing::info!("Results saved to {}", output_path.display());
    Ok(())
}
