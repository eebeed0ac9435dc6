// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types for the delivery pipeline.

use crate::molecule::SmilesError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Invalid SMILES '{smiles}': {source}")]
    Smiles {
        smiles: String,
        #[source]
        source: SmilesError,
    },

    #[error("Malformed record {row} in {path}: {reason}")]
    MalformedRecord {
        path: String,
        row: usize,
        reason: String,
    },

    #[error("Invalid split sizes: {0}")]
    InvalidSplit(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Plot error: {0}")]
    Plot(String),

    #[error("Partition '{0}' is empty")]
    EmptyPartition(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn smiles(smiles: &str, source: SmilesError) -> Self {
        PipelineError::Smiles {
            smiles: smiles.to_string(),
            source,
        }
    }
}
