// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Message-passing neural networks for lipid nanoparticle delivery
//!
//! This crate provides:
//! - Dataset loading, per-molecule deduplication and experiment exclusion
//! - SMILES parsing and molecular graph featurization
//! - Seeded train/validation/test splitting and target scaling
//! - A directed bond message-passing network on candle, with checkpoints and
//!   pretrained encoder loading
//! - Evaluation metrics (AUC-ROC, R², Pearson, Spearman) and SVG figures
//! - Reproducible training and inference pipelines

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod model;
pub mod molecule;
pub mod pipeline;
pub mod plots;
pub mod run;
pub mod scaler;
pub mod split;
pub mod trainer;

pub use config::PipelineConfig;
pub use dataset::{Datapoint, Dataset, Record};
pub use error::{PipelineError, Result};
pub use labels::Task;
pub use metrics::{ClassificationMetrics, ClassificationReport, RegressionMetrics, RocCurve};
pub use model::{MeanBaseline, ModelConfig, Mpnn, PropertyModel};
pub use pipeline::{EvaluationResults, TaskMetrics, TrainingPipeline};
pub use run::{HyperParams, RunName};
pub use scaler::StandardScaler;
pub use split::{split_indices, SplitIndices};
