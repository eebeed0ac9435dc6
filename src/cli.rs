// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Shared command-line plumbing for the training and inference programs

use crate::config::PipelineConfig;
use crate::labels::Task;
use crate::model::mpnn::{default_device, PretrainedEncoder};
use crate::model::{ModelConfig, Mpnn};
use crate::pipeline::{save_results, TrainingPipeline};
use crate::run::{HyperParams, RunName};
use crate::trainer::TrainerConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Logging to stderr, `info` unless `RUST_LOG` says otherwise
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Data and output flags shared by every program
#[derive(clap::Args, Debug, Clone)]
pub struct DataArgs {
    /// Input CSV (smiles, quantified_delivery, Experiment_ID)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for plots and checkpoints
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Write the evaluation as JSON to this path
    #[arg(long)]
    pub save_results: Option<PathBuf>,
}

impl DataArgs {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;
        if let Some(data) = &self.data {
            config.data_path = data.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Hyperparameters of a training run
#[derive(clap::Args, Debug, Clone)]
pub struct TrainArgs {
    /// Message-passing depth
    #[arg(short, long)]
    pub depth: usize,

    /// Predictor hidden dimension
    #[arg(short = 'm', long = "hiddendim")]
    pub hidden_dim: usize,

    /// Predictor hidden layers
    #[arg(short, long = "nlayers")]
    pub n_layers: usize,

    /// Dropout probability
    #[arg(short = 'p', long)]
    pub dropout: f64,

    /// Training epochs
    #[arg(short, long)]
    pub epochs: usize,

    /// Replicate tag used in output names
    #[arg(short, long)]
    pub run: u32,

    #[command(flatten)]
    pub data: DataArgs,
}

impl TrainArgs {
    pub fn hyperparams(&self) -> HyperParams {
        HyperParams {
            depth: self.depth,
            hidden_dim: self.hidden_dim,
            n_layers: self.n_layers,
            dropout: self.dropout,
            epochs: self.epochs,
            run: self.run,
        }
    }
}

fn load_pretrained(path: &Path, model: &ModelConfig) -> Result<Option<PretrainedEncoder>> {
    if !path.exists() {
        tracing::warn!(
            "Pretrained encoder {} not found, training from random initialization",
            path.display()
        );
        return Ok(None);
    }
    let encoder = PretrainedEncoder::load(path, model.atom_dim, model.bond_dim)
        .with_context(|| format!("Failed to load pretrained encoder {}", path.display()))?;
    Ok(Some(encoder))
}

/// Train, evaluate and report one model
pub fn train(task: Task, args: &TrainArgs, pretrained: Option<&Path>) -> Result<()> {
    let config = args.data.pipeline_config()?;
    let params = args.hyperparams();
    params.validate()?;

    let run = RunName::new(config.run_prefix.clone(), params);
    tracing::info!("Run: {}", run);
    tracing::info!("Data: {}", config.data_path.display());

    let pipeline = TrainingPipeline::new(config.clone(), run, task);
    let device = default_device()?;

    let mut model_config = ModelConfig::new(
        task,
        params.depth,
        config.message_hidden_dim,
        params.hidden_dim,
        params.n_layers,
        params.dropout,
    );
    let encoder = match pretrained {
        Some(path) => load_pretrained(path, &model_config)?,
        None => None,
    };
    if let Some(encoder) = &encoder {
        model_config = model_config.with_encoder(encoder);
        if model_config.depth != params.depth {
            tracing::info!(
                "Using encoder depth {} from the pretrained checkpoint",
                model_config.depth
            );
        }
    }

    let trainer = TrainerConfig {
        epochs: params.epochs,
        batch_size: config.batch_size,
        init_lr: config.init_lr,
        max_lr: config.max_lr,
        final_lr: config.final_lr,
        warmup_epochs: config.warmup_epochs,
        seed: config.seed,
        checkpoint_dir: Some(pipeline.checkpoint_dir()),
        show_progress: true,
    };

    let mut model = Mpnn::new(model_config, trainer, device)?;
    if let Some(encoder) = &encoder {
        model.load_encoder(encoder)?;
    }

    let results = pipeline.run(&mut model).context("Training run failed")?;

    println!("{}", results.metrics.format());

    if let Some(path) = &args.data.save_results {
        save_results(&results, path)
            .with_context(|| format!("Failed to save results to {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        train: TrainArgs,
    }

    #[test]
    fn test_parse_short_flags() {
        let cli = Cli::try_parse_from([
            "train", "-d", "3", "-m", "64", "-n", "2", "-p", "0.1", "-e", "10", "-r", "1",
        ])
        .unwrap();
        assert_eq!(cli.train.depth, 3);
        assert_eq!(cli.train.hidden_dim, 64);
        assert_eq!(cli.train.n_layers, 2);
        assert!((cli.train.dropout - 0.1).abs() < 1e-12);
        assert_eq!(cli.train.epochs, 10);
        assert_eq!(cli.train.run, 1);
        assert!(cli.train.data.data.is_none());
    }

    #[test]
    fn test_parse_long_flags() {
        let cli = Cli::try_parse_from([
            "train",
            "--depth",
            "4",
            "--hiddendim",
            "300",
            "--nlayers",
            "1",
            "--dropout",
            "0",
            "--epochs",
            "50",
            "--run",
            "2",
            "--data",
            "lnp.csv",
            "--output-dir",
            "out",
            "--save-results",
            "out/results.json",
        ])
        .unwrap();
        assert_eq!(cli.train.hidden_dim, 300);

        let config = cli.train.data.pipeline_config().unwrap();
        assert_eq!(config.data_path, PathBuf::from("lnp.csv"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(
            RunName::new(config.run_prefix, cli.train.hyperparams()).to_string(),
            "mean_regression_chem_d4_h300_n1_p0.0_e50_r2"
        );
    }

    #[test]
    fn test_missing_required_flag() {
        assert!(Cli::try_parse_from(["train", "-d", "3"]).is_err());
    }
}
