// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Target standardization fit on the training partition

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Mean / population standard deviation scaler for a single target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: f64,
    pub scale: f64,
}

impl StandardScaler {
    /// Fit on training targets; a zero standard deviation becomes 1
    pub fn fit(targets: &[f64]) -> Result<Self> {
        if targets.is_empty() {
            return Err(PipelineError::EmptyPartition("train"));
        }
        let n = targets.len() as f64;
        let mean = targets.iter().sum::<f64>() / n;
        let variance = targets.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let scale = if std > f64::EPSILON { std } else { 1.0 };
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, y: f64) -> f64 {
        (y - self.mean) / self.scale
    }

    pub fn inverse_transform(&self, z: f64) -> f64 {
        z * self.scale + self.mean
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&y| self.transform(y)).collect()
    }

    pub fn inverse_transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&z| self.inverse_transform(z)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_transform() {
        let scaler = StandardScaler::fit(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((scaler.mean - 2.5).abs() < 1e-12);
        assert!((scaler.scale - 1.25f64.sqrt()).abs() < 1e-12);

        let scaled = scaler.transform_all(&[1.0, 2.0, 3.0, 4.0]);
        let mean: f64 = scaled.iter().sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);

        let restored = scaler.inverse_transform_all(&scaled);
        for (a, b) in restored.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_targets() {
        let scaler = StandardScaler::fit(&[5.0, 5.0]).unwrap();
        assert_eq!(scaler.scale, 1.0);
        assert_eq!(scaler.transform(5.0), 0.0);
    }

    #[test]
    fn test_statistics_only_from_fit_data() {
        let train = [0.0, 2.0];
        let scaler = StandardScaler::fit(&train).unwrap();
        // validation values outside the training range do not move the scaler
        assert!((scaler.transform(100.0) - 99.0).abs() < 1e-12);
        assert_eq!(scaler, StandardScaler::fit(&train).unwrap());
    }

    #[test]
    fn test_empty_fails() {
        assert!(matches!(
            StandardScaler::fit(&[]),
            Err(PipelineError::EmptyPartition("train"))
        ));
    }
}
