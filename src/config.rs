// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Pipeline configuration
//!
//! Every constant the training and inference programs rely on lives here so a
//! run can be reproduced from a single TOML file. Keys missing from the file
//! keep their defaults.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Experiments excluded from every partition
pub const DEFAULT_EXCLUDED_EXPERIMENTS: [&str; 3] =
    ["Liu_Phospholipids", "Zhou_dendrimer", "Akinc_Michael_addition"];

/// Configuration shared by the training and inference programs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input CSV
    pub data_path: PathBuf,
    pub smiles_column: String,
    pub target_column: String,
    pub experiment_column: String,
    /// Experiment identifiers dropped after deduplication
    pub excluded_experiments: Vec<String>,
    /// Targets strictly above this become the positive class
    pub class_threshold: f64,
    /// Train/validation/test fractions
    pub split_sizes: [f64; 3],
    /// Random seed for splitting and batch shuffling
    pub seed: u64,
    pub batch_size: usize,
    pub init_lr: f64,
    pub max_lr: f64,
    pub final_lr: f64,
    pub warmup_epochs: usize,
    /// Hidden size of the message-passing encoder
    pub message_hidden_dim: usize,
    /// Prefix for run names and output files
    pub run_prefix: String,
    /// Directory for plots and checkpoints
    pub output_dir: PathBuf,
    /// Pretrained encoder for regression transfer learning
    pub pretrained_encoder: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("../pulmonary/data/all_data.csv"),
            smiles_column: "smiles".to_string(),
            target_column: "quantified_delivery".to_string(),
            experiment_column: "Experiment_ID".to_string(),
            excluded_experiments: DEFAULT_EXCLUDED_EXPERIMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            class_threshold: 1.75,
            split_sizes: [0.8, 0.1, 0.1],
            seed: 42,
            batch_size: 128,
            init_lr: 1e-4,
            max_lr: 1e-3,
            final_lr: 1e-4,
            warmup_epochs: 2,
            message_hidden_dim: 300,
            run_prefix: "mean_regression_chem".to_string(),
            output_dir: PathBuf::from("."),
            pretrained_encoder: Some(PathBuf::from("chemeleon_mp.pt")),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                tracing::info!("Loading configuration from {}", p.display());
                Self::from_toml_file(p)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.split_sizes.iter().any(|s| *s < 0.0) {
            return Err(PipelineError::Config(format!(
                "split sizes must be non-negative, got {:?}",
                self.split_sizes
            )));
        }
        let total: f64 = self.split_sizes.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(PipelineError::Config(format!(
                "split sizes must sum to 1, got {}",
                total
            )));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be positive".to_string()));
        }
        if self.message_hidden_dim == 0 {
            return Err(PipelineError::Config(
                "message_hidden_dim must be positive".to_string(),
            ));
        }
        if self.init_lr <= 0.0 || self.max_lr <= 0.0 || self.final_lr <= 0.0 {
            return Err(PipelineError::Config("learning rates must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_scripts() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.batch_size, 128);
        assert!((config.class_threshold - 1.75).abs() < 1e-12);
        assert_eq!(config.excluded_experiments.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_pretrained_encoder() {
        assert_eq!(
            PipelineConfig::default().pretrained_encoder,
            Some(PathBuf::from("chemeleon_mp.pt"))
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            seed = 7
            data_path = "data/lnp.csv"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.seed, 7);
        assert_eq!(config.data_path, PathBuf::from("data/lnp.csv"));
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.target_column, "quantified_delivery");
    }

    #[test]
    fn test_rejects_bad_split() {
        let result = PipelineConfig::from_toml_str("split_sizes = [0.5, 0.1, 0.1]");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
