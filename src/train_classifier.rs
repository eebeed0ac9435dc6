// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Train a high/low delivery classifier
//!
//! Usage:
//!   train-classifier -d 3 -m 300 -n 2 -p 0.1 -e 50 -r 1
//!   train-classifier -d 3 -m 300 -n 2 -p 0.1 -e 50 -r 1 --data all_data.csv --save-results out.json

use anyhow::Result;
use clap::Parser;
use delivery_mpnn::cli::{init_logging, train, TrainArgs};
use delivery_mpnn::labels::Task;

#[derive(Parser, Debug)]
#[command(name = "train-classifier")]
#[command(about = "Train a message-passing classifier on thresholded delivery")]
#[command(version)]
struct Args {
    #[command(flatten)]
    train: TrainArgs,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    tracing::info!("Delivery MPNN: classification");
    train(Task::Classification, &args.train, None)
}
