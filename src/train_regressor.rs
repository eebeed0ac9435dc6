// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Train a delivery regressor, starting from a pretrained encoder when one is
//! available
//!
//! Usage:
//!   train-regressor -d 3 -m 300 -n 2 -p 0.1 -e 50 -r 1
//!   train-regressor -d 3 -m 300 -n 2 -p 0.1 -e 50 -r 1 --pretrained chemeleon_mp.pt

use anyhow::Result;
use clap::Parser;
use delivery_mpnn::cli::{init_logging, train, TrainArgs};
use delivery_mpnn::labels::Task;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "train-regressor")]
#[command(about = "Train a message-passing regressor on quantified delivery")]
#[command(version)]
struct Args {
    #[command(flatten)]
    train: TrainArgs,

    /// Pretrained encoder (safetensors, or a PyTorch checkpoint with a state_dict)
    #[arg(long)]
    pretrained: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    tracing::info!("Delivery MPNN: regression");

    let pretrained = match args.pretrained {
        Some(path) => Some(path),
        None => args.train.data.pipeline_config()?.pretrained_encoder,
    };
    train(Task::Regression, &args.train, pretrained.as_deref())
}
