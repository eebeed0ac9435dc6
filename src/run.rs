// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Run naming
//!
//! Every artifact of a training run (plots, checkpoint directory, results
//! file) is named after the hyperparameters that produced it.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Hyperparameters chosen on the command line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    /// Message-passing iterations
    pub depth: usize,
    /// Predictor hidden width
    pub hidden_dim: usize,
    /// Predictor hidden layers
    pub n_layers: usize,
    pub dropout: f64,
    pub epochs: usize,
    /// Replicate tag, only used for naming
    pub run: u32,
}

impl HyperParams {
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(PipelineError::Config("depth must be at least 1".to_string()));
        }
        if self.hidden_dim == 0 {
            return Err(PipelineError::Config("hidden dim must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PipelineError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.epochs == 0 {
            return Err(PipelineError::Config("epochs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// `{prefix}_d{depth}_h{hidden}_n{layers}_p{dropout}_e{epochs}_r{run}`
#[derive(Debug, Clone, PartialEq)]
pub struct RunName {
    pub prefix: String,
    pub params: HyperParams,
}

impl RunName {
    pub fn new(prefix: impl Into<String>, params: HyperParams) -> Self {
        Self {
            prefix: prefix.into(),
            params,
        }
    }

    /// Directory holding checkpoints and `hparams.json`
    pub fn checkpoint_dir(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.to_string())
    }

    pub fn target_distribution_path(&self, output_dir: &Path) -> PathBuf {
        plot_path(output_dir, &format!("{}_target_distribution", self))
    }

    pub fn roc_curve_path(&self, output_dir: &Path) -> PathBuf {
        plot_path(output_dir, &format!("{}_roc_curve", self))
    }

    pub fn test_predictions_path(&self, output_dir: &Path) -> PathBuf {
        plot_path(output_dir, &format!("{}_test_predictions", self))
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.params;
        write!(
            f,
            "{}_d{}_h{}_n{}_p{}_e{}_r{}",
            self.prefix,
            p.depth,
            p.hidden_dim,
            p.n_layers,
            format_float(p.dropout),
            p.epochs,
            p.run
        )
    }
}

/// Scatter plot written by the inference program
pub fn inference_plot_path(output_dir: &Path, name: &str) -> PathBuf {
    plot_path(output_dir, &format!("best_{}_test_predictions", name))
}

/// ROC curve written by the inference program for a classification checkpoint
pub fn inference_roc_path(output_dir: &Path, name: &str) -> PathBuf {
    plot_path(output_dir, &format!("best_{}_roc_curve", name))
}

fn plot_path(output_dir: &Path, stem: &str) -> PathBuf {
    output_dir.join(format!("{}.svg", stem))
}

/// Shortest round-trip form, but whole numbers keep one decimal ("1.0")
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HyperParams {
        HyperParams {
            depth: 3,
            hidden_dim: 64,
            n_layers: 2,
            dropout: 0.1,
            epochs: 10,
            run: 1,
        }
    }

    #[test]
    fn test_run_name() {
        let name = RunName::new("mean_regression_chem", params());
        assert_eq!(name.to_string(), "mean_regression_chem_d3_h64_n2_p0.1_e10_r1");
    }

    #[test]
    fn test_whole_dropout_keeps_decimal() {
        let name = RunName::new(
            "mean_regression_chem",
            HyperParams {
                dropout: 0.0,
                ..params()
            },
        );
        assert_eq!(name.to_string(), "mean_regression_chem_d3_h64_n2_p0.0_e10_r1");
        assert_eq!(format_float(0.25), "0.25");
    }

    #[test]
    fn test_artifact_paths() {
        let name = RunName::new("mean_regression_chem", params());
        let dir = Path::new("out");
        assert_eq!(
            name.roc_curve_path(dir),
            PathBuf::from("out/mean_regression_chem_d3_h64_n2_p0.1_e10_r1_roc_curve.svg")
        );
        assert_eq!(
            name.checkpoint_dir(dir),
            PathBuf::from("out/mean_regression_chem_d3_h64_n2_p0.1_e10_r1")
        );
        assert_eq!(
            inference_plot_path(dir, "lnp"),
            PathBuf::from("out/best_lnp_test_predictions.svg")
        );
    }

    #[test]
    fn test_validate() {
        assert!(params().validate().is_ok());
        assert!(HyperParams { dropout: 1.0, ..params() }.validate().is_err());
        assert!(HyperParams { epochs: 0, ..params() }.validate().is_err());
        assert!(HyperParams { depth: 0, ..params() }.validate().is_err());
    }
}
