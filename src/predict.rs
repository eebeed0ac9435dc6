// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluate a trained checkpoint on the held-out test partition
//!
//! Usage:
//!   predict-test -f run/best-epoch=41-val_loss=0.52.safetensors -n lnp

use anyhow::{Context, Result};
use clap::Parser;
use delivery_mpnn::cli::{init_logging, DataArgs};
use delivery_mpnn::model::mpnn::default_device;
use delivery_mpnn::model::Mpnn;
use delivery_mpnn::pipeline::{run_inference, save_results};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "predict-test")]
#[command(about = "Predict the test partition with a trained checkpoint")]
#[command(version)]
struct Args {
    /// Checkpoint file; hparams.json must sit next to it
    #[arg(short, long)]
    file: PathBuf,

    /// Label used in output names
    #[arg(short, long)]
    name: String,

    #[command(flatten)]
    data: DataArgs,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = args.data.pipeline_config()?;
    tracing::info!("Checkpoint: {}", args.file.display());
    tracing::info!("Data: {}", config.data_path.display());

    let device = default_device()?;
    let model = Mpnn::from_checkpoint(&args.file, device)
        .with_context(|| format!("Failed to load checkpoint {}", args.file.display()))?;

    let results = run_inference(&config, &model, &args.name)?;
    println!("{}", results.metrics.format());

    if let Some(path) = &args.data.save_results {
        save_results(&results, path)
            .with_context(|| format!("Failed to save results to {}", path.display()))?;
    }

    Ok(())
}
