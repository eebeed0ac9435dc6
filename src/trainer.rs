// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training loop for the message-passing model
//!
//! Adam with a Noam learning-rate schedule, seeded batch shuffling and
//! checkpointing on validation loss (best and last).

use crate::dataset::Datapoint;
use crate::error::{PipelineError, Result};
use crate::labels::Task;
use crate::metrics::{r2_score, roc_curve};
use crate::model::mpnn::Mpnn;
use crate::model::{EpochSummary, FitReport};
use crate::molecule::MolFeatures;
use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optimization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub init_lr: f64,
    pub max_lr: f64,
    pub final_lr: f64,
    pub warmup_epochs: usize,
    /// Batch shuffling seed
    pub seed: u64,
    /// Where `best-*.safetensors`, `last.safetensors` and `hparams.json` go;
    /// `None` keeps everything in memory
    pub checkpoint_dir: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 128,
            init_lr: 1e-4,
            max_lr: 1e-3,
            final_lr: 1e-4,
            warmup_epochs: 2,
            seed: 42,
            checkpoint_dir: None,
            show_progress: true,
        }
    }
}

/// Linear warmup from `init_lr` to `max_lr`, then exponential decay to
/// `final_lr` at the last step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoamSchedule {
    init_lr: f64,
    max_lr: f64,
    final_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
}

impl NoamSchedule {
    pub fn new(config: &TrainerConfig, steps_per_epoch: usize) -> Self {
        let total_steps = config.epochs * steps_per_epoch;
        Self {
            init_lr: config.init_lr,
            max_lr: config.max_lr,
            final_lr: config.final_lr,
            warmup_steps: (config.warmup_epochs * steps_per_epoch).min(total_steps),
            total_steps,
        }
    }

    pub fn learning_rate(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.init_lr
                + step as f64 * (self.max_lr - self.init_lr) / self.warmup_steps as f64;
        }
        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps);
        if decay_steps == 0 {
            return self.max_lr;
        }
        let progress = ((step - self.warmup_steps) as f64 / decay_steps as f64).min(1.0);
        self.max_lr * (self.final_lr / self.max_lr).powf(progress)
    }
}

/// Name of the best checkpoint file
pub fn best_checkpoint_name(epoch: usize, val_loss: f64) -> String {
    format!("best-epoch={}-val_loss={:.2}.safetensors", epoch, val_loss)
}

pub const LAST_CHECKPOINT: &str = "last.safetensors";

/// Featurized partition with targets in training space
struct Prepared {
    features: Vec<MolFeatures>,
    targets: Vec<f32>,
    /// Targets in original units
    raw: Vec<f64>,
}

impl Prepared {
    fn new(model: &Mpnn, data: &[Datapoint]) -> Self {
        Self {
            features: model.featurize(data),
            targets: data
                .iter()
                .map(|p| model.training_target(p.y) as f32)
                .collect(),
            raw: data.iter().map(|p| p.y).collect(),
        }
    }

    fn len(&self) -> usize {
        self.features.len()
    }

    fn batch(&self, model: &Mpnn, indices: &[usize]) -> Result<(crate::model::BatchGraph, Tensor)> {
        let mols: Vec<&MolFeatures> = indices.iter().map(|&i| &self.features[i]).collect();
        let graph = model.collate(&mols)?;
        let targets: Vec<f32> = indices.iter().map(|&i| self.targets[i]).collect();
        let targets = Tensor::from_vec(targets, (indices.len(), 1), model.device())?;
        Ok((graph, targets))
    }
}

pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Shuffled training batches for one epoch; a trailing batch holding a
    /// single molecule is dropped (batch norm needs two)
    fn epoch_batches(&self, n: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        let mut batches: Vec<Vec<usize>> = order
            .chunks(self.config.batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();
        if batches.len() > 1 && batches.last().map(|b| b.len() == 1).unwrap_or(false) {
            batches.pop();
        }
        batches
    }

    pub fn fit(
        &self,
        model: &mut Mpnn,
        train: &[Datapoint],
        validation: &[Datapoint],
    ) -> Result<FitReport> {
        if train.len() < 2 {
            return Err(PipelineError::EmptyPartition("train"));
        }
        if self.config.epochs == 0 {
            return Err(PipelineError::Config("epochs must be at least 1".to_string()));
        }

        let train_set = Prepared::new(model, train);
        let val_set = Prepared::new(model, validation);

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let steps_per_epoch = self.epoch_batches(train_set.len(), &mut rng.clone()).len();
        let schedule = NoamSchedule::new(&self.config, steps_per_epoch);

        let mut optimizer = AdamW::new(
            model.varmap().all_vars(),
            ParamsAdamW {
                lr: self.config.init_lr,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        if let Some(dir) = &self.config.checkpoint_dir {
            model.meta().save(dir)?;
        }

        tracing::info!(
            "Training {} for {} epochs ({} train / {} val, {} steps per epoch)",
            model.config().task,
            self.config.epochs,
            train_set.len(),
            val_set.len(),
            steps_per_epoch
        );

        let mut report = FitReport::default();
        let mut best_path: Option<PathBuf> = None;
        let mut best_weights = None;
        let mut step = 0usize;

        for epoch in 0..self.config.epochs {
            let batches = self.epoch_batches(train_set.len(), &mut rng);
            let bar = self.progress_bar(batches.len(), epoch);

            let mut loss_sum = 0.0;
            let mut seen = 0usize;
            let mut lr = schedule.learning_rate(step);
            for indices in &batches {
                lr = schedule.learning_rate(step);
                optimizer.set_learning_rate(lr);

                let (graph, targets) = train_set.batch(model, indices)?;
                let outputs = model.forward(&graph, true)?;
                let loss = model.loss(&outputs, &targets)?;
                optimizer.backward_step(&loss)?;

                let value = loss.to_scalar::<f32>()? as f64;
                loss_sum += value * indices.len() as f64;
                seen += indices.len();
                step += 1;

                bar.set_message(format!("loss {:.4}", value));
                bar.inc(1);
            }
            bar.finish_and_clear();

            let train_loss = loss_sum / seen.max(1) as f64;
            let (val_loss, val_metric) = if !validation.is_empty() {
                let (loss, metric) = self.validate(model, &val_set)?;
                (Some(loss), Some(metric))
            } else {
                (None, None)
            };

            let improved = val_loss
                .map(|loss| report.best_val_loss.map(|best| loss < best).unwrap_or(true))
                .unwrap_or(false);

            if let Some(dir) = &self.config.checkpoint_dir {
                model.save_weights(&dir.join(LAST_CHECKPOINT))?;
                if let (true, Some(loss)) = (improved, val_loss) {
                    let path = dir.join(best_checkpoint_name(epoch, loss));
                    model.save_weights(&path)?;
                    if let Some(previous) = best_path.replace(path.clone()) {
                        if previous != path {
                            remove_stale(&previous);
                        }
                    }
                }
            } else if improved {
                best_weights = Some(model.snapshot()?);
            }

            if improved {
                report.best_val_loss = val_loss;
                report.best_epoch = Some(epoch);
            }

            tracing::info!(
                "Epoch {}/{}: train_loss={:.4} val_loss={} val_{}={} lr={:.2e}",
                epoch + 1,
                self.config.epochs,
                train_loss,
                fmt_opt(val_loss),
                metric_name(model.config().task),
                fmt_opt(val_metric),
                lr
            );

            report.epochs.push(EpochSummary {
                epoch,
                train_loss,
                val_loss,
                val_metric,
                learning_rate: lr,
            });
        }

        if let Some(path) = &best_path {
            model.load_weights(path)?;
            tracing::info!("Restored best checkpoint {}", path.display());
            report.best_checkpoint = Some(path.display().to_string());
        } else if let Some(weights) = &best_weights {
            model.restore(weights)?;
            tracing::info!(
                "Restored best weights from epoch {}",
                report.best_epoch.map(|e| e + 1).unwrap_or(0)
            );
        }

        Ok(report)
    }

    /// Validation loss in training space and the task metric in original units
    fn validate(&self, model: &Mpnn, val_set: &Prepared) -> Result<(f64, f64)> {
        let raw = model.predict_raw(&val_set.features)?;
        let device = model.device();

        let outputs = Tensor::from_vec(
            raw.iter().map(|&v| v as f32).collect::<Vec<_>>(),
            (raw.len(), 1),
            device,
        )?;
        let targets = Tensor::from_vec(val_set.targets.clone(), (val_set.len(), 1), device)?;
        let loss = model.loss(&outputs, &targets)?.to_scalar::<f32>()? as f64;

        let predictions = model.output_transform(&raw);
        let metric = match model.config().task {
            Task::Classification => roc_curve(&val_set.raw, &predictions).auc(),
            Task::Regression => r2_score(&val_set.raw, &predictions),
        };
        Ok((loss, metric))
    }

    fn progress_bar(&self, len: usize, epoch: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        match ProgressStyle::default_bar()
            .template("{spinner:.green} Epoch {prefix}: [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
        {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => tracing::debug!("Progress template rejected: {}", e),
        }
        bar.set_prefix(format!("{}", epoch + 1));
        bar
    }
}

fn remove_stale(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("Could not remove old checkpoint {}: {}", path.display(), e);
    }
}

fn metric_name(task: Task) -> &'static str {
    match task {
        Task::Classification => "auroc",
        Task::Regression => "r2",
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "n/a".to_string())
}
