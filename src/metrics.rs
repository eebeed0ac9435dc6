// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for binary classification and regression
//!
//! Implements:
//! - ROC curve and AUC (trapezoidal rule)
//! - A thresholded report (accuracy, precision, recall, F1, MCC)
//! - MSE, MAE, RMSE, R²
//! - Pearson and Spearman correlation

use serde::{Deserialize, Serialize};

/// Secondary summary of probabilities cut at a fixed threshold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub threshold: f64,
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub mcc: f64,
    pub support: usize,
}

impl ClassificationReport {
    /// `score >= threshold` is the positive call; labels above 0.5 are positive
    pub fn from_scores(labels: &[f64], scores: &[f64], threshold: f64) -> Self {
        assert_eq!(labels.len(), scores.len(), "Label and score lengths must match");

        let mut report = Self {
            threshold,
            support: labels.len(),
            ..Self::default()
        };
        for (&label, &score) in labels.iter().zip(scores) {
            match (score >= threshold, label > 0.5) {
                (true, true) => report.tp += 1,
                (false, false) => report.tn += 1,
                (true, false) => report.fp += 1,
                (false, true) => report.fn_ += 1,
            }
        }

        let (tp, tn, fp, fn_) = (
            report.tp as f64,
            report.tn as f64,
            report.fp as f64,
            report.fn_ as f64,
        );
        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
        report.accuracy = ratio(tp + tn, report.support as f64);
        report.precision = ratio(tp, tp + fp);
        report.recall = ratio(tp, tp + fn_);
        report.f1 = ratio(
            2.0 * report.precision * report.recall,
            report.precision + report.recall,
        );
        report.mcc = ratio(
            tp * tn - fp * fn_,
            ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt(),
        );
        report
    }

    /// One line, printed after the AUC
    pub fn format(&self) -> String {
        format!(
            "At p >= {:.2}: accuracy {:.4}, precision {:.4}, recall {:.4}, F1 {:.4}, MCC {:.4} (TP {} FP {} TN {} FN {}, n = {})",
            self.threshold,
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.mcc,
            self.tp,
            self.fp,
            self.tn,
            self.fn_,
            self.support
        )
    }
}

/// Receiver operating characteristic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Decreasing; the first entry is +inf and yields the (0, 0) point
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    pub fn auc(&self) -> f64 {
        auc(&self.fpr, &self.tpr)
    }
}

/// ROC curve over the distinct scores, highest first
///
/// Labels above 0.5 count as positive. With no positives (or no negatives)
/// the corresponding rate stays at zero.
pub fn roc_curve(labels: &[f64], scores: &[f64]) -> RocCurve {
    assert_eq!(labels.len(), scores.len(), "Label and score lengths must match");

    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .zip(labels)
        .map(|(&s, &l)| (s, l > 0.5))
        .collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let n_pos = pairs.iter().filter(|(_, p)| *p).count() as f64;
    let n_neg = pairs.len() as f64 - n_pos;
    let rate = |count: f64, total: f64| if total > 0.0 { count / total } else { 0.0 };

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };

    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        // consume every sample tied at this score
        while i < pairs.len() && pairs[i].0 == threshold {
            if pairs[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        curve.fpr.push(rate(fp, n_neg));
        curve.tpr.push(rate(tp, n_pos));
        curve.thresholds.push(threshold);
    }

    curve
}

/// Area under a curve by the trapezoidal rule
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// Coefficient of determination
///
/// Constant ground truth gives 1.0 for a perfect fit and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Pearson correlation coefficient
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }

    let n = x.len() as f64;
    let mean_x: f64 = x.iter().sum::<f64>() / n;
    let mean_y: f64 = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x < 1e-12 || var_y < 1e-12 {
        return 0.0;
    }

    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Spearman rank correlation, ties get their average rank
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }
    pearson(&average_ranks(x), &average_ranks(y))
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < indexed.len() {
        let mut end = start + 1;
        while end < indexed.len() && indexed[end].1 == indexed[start].1 {
            end += 1;
        }
        // ranks are 1-based; the tie group spans start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for (idx, _) in &indexed[start..end] {
            ranks[*idx] = rank;
        }
        start = end;
    }
    ranks
}

/// Regression error and correlation summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub pearson: f64,
    pub spearman: f64,
    pub support: usize,
}

impl RegressionMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        assert_eq!(y_true.len(), y_pred.len(), "Target and prediction lengths must match");
        let n = y_true.len();
        if n == 0 {
            return Self::default();
        }

        let mse = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / n as f64;
        let mae = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / n as f64;

        Self {
            mse,
            mae,
            rmse: mse.sqrt(),
            r2: r2_score(y_true, y_pred),
            pearson: pearson(y_true, y_pred),
            spearman: spearman(y_true, y_pred),
            support: n,
        }
    }

    /// Stdout report
    pub fn format(&self) -> String {
        format!(
            "Test R2 Score:\n{}\nPearson Correlation: {:.4}\nSpearman Correlation: {:.4}\nMSE: {:.4}  MAE: {:.4}  RMSE: {:.4}  (n={})\n",
            self.r2, self.pearson, self.spearman, self.mse, self.mae, self.rmse, self.support
        )
    }
}

/// ROC/AUC plus a thresholded report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub auc_roc: f64,
    pub roc: RocCurve,
    pub report: ClassificationReport,
}

impl ClassificationMetrics {
    /// `probabilities` are P(high delivery)
    pub fn compute(labels: &[f64], probabilities: &[f64]) -> Self {
        let roc = roc_curve(labels, probabilities);
        Self {
            auc_roc: roc.auc(),
            report: ClassificationReport::from_scores(labels, probabilities, 0.5),
            roc,
        }
    }

    pub fn format(&self) -> String {
        format!("Test AUC-ROC: {:.4}\n{}", self.auc_roc, self.report.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_perfect() {
        let labels = vec![1.0, 1.0, 0.0, 0.0];
        let scores = vec![0.9, 0.6, 0.4, 0.1];

        let report = ClassificationReport::from_scores(&labels, &scores, 0.5);

        assert_eq!((report.tp, report.tn, report.fp, report.fn_), (2, 2, 0, 0));
        assert!((report.accuracy - 1.0).abs() < 1e-6);
        assert!((report.f1 - 1.0).abs() < 1e-6);
        assert!((report.mcc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_report_inverted() {
        let labels = vec![1.0, 1.0, 0.0, 0.0];
        let scores = vec![0.1, 0.2, 0.8, 0.9];

        let report = ClassificationReport::from_scores(&labels, &scores, 0.5);

        assert_eq!((report.fp, report.fn_), (2, 2));
        assert!(report.accuracy.abs() < 1e-6);
        assert_eq!(report.f1, 0.0);
        assert!((report.mcc + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_roc_curve_perfect() {
        let labels = vec![1.0, 1.0, 0.0, 0.0];
        let scores = vec![0.9, 0.8, 0.2, 0.1];

        let roc = roc_curve(&labels, &scores);
        assert_eq!(roc.fpr[0], 0.0);
        assert_eq!(roc.tpr[0], 0.0);
        assert_eq!(*roc.fpr.last().unwrap(), 1.0);
        assert_eq!(*roc.tpr.last().unwrap(), 1.0);
        assert!(roc.thresholds[0].is_infinite());
        assert!((roc.auc() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_roc_curve_ties_collapse() {
        let labels = vec![1.0, 0.0, 1.0, 0.0];
        let scores = vec![0.5, 0.5, 0.5, 0.5];

        let roc = roc_curve(&labels, &scores);
        assert_eq!(roc.fpr, vec![0.0, 1.0]);
        assert_eq!(roc.tpr, vec![0.0, 1.0]);
        assert!((roc.auc() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_auc_known_value() {
        // one inversion among 2x2 pairs
        let labels = vec![1.0, 0.0, 1.0, 0.0];
        let scores = vec![0.9, 0.8, 0.7, 0.1];
        let roc = roc_curve(&labels, &scores);
        assert!((roc.auc() - 0.75).abs() < 1e-9);
        assert!((auc(&[0.0, 1.0], &[1.0, 1.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_r2_score() {
        let y = vec![1.0, 2.0, 3.0, 4.0];
        assert!((r2_score(&y, &y) - 1.0).abs() < 1e-12);

        let mean_pred = vec![2.5; 4];
        assert!(r2_score(&y, &mean_pred).abs() < 1e-12);

        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
    }

    #[test]
    fn test_pearson_and_spearman() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![2.0, 4.0, 6.0, 8.0, 10.0];
        assert!((pearson(&x, &y) - 1.0).abs() < 1e-12);

        let reversed: Vec<f64> = y.iter().rev().copied().collect();
        assert!((pearson(&x, &reversed) + 1.0).abs() < 1e-12);

        // monotone but nonlinear
        let cubed: Vec<f64> = x.iter().map(|v| v * v * v).collect();
        assert!((spearman(&x, &cubed) - 1.0).abs() < 1e-12);
        assert!(pearson(&x, &cubed) < 1.0);
    }

    #[test]
    fn test_average_ranks_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
    }

    #[test]
    fn test_regression_metrics() {
        let truth = vec![0.0, 1.0, 2.0, 3.0];
        let preds = vec![0.5, 1.0, 2.0, 2.5];
        let m = RegressionMetrics::compute(&truth, &preds);

        assert!((m.mse - 0.125).abs() < 1e-12);
        assert!((m.mae - 0.25).abs() < 1e-12);
        assert!((m.rmse - 0.125f64.sqrt()).abs() < 1e-12);
        assert_eq!(m.support, 4);

        let text = m.format();
        assert!(text.starts_with("Test R2 Score:\n"));
        assert!(text.contains("Pearson Correlation: "));
        assert!(text.contains("Spearman Correlation: 1.0000"));
    }

    #[test]
    fn test_classification_metrics_format() {
        let labels = vec![1.0, 0.0, 0.0, 0.0];
        let probs = vec![0.9, 0.7, 0.2, 0.1];

        let metrics = ClassificationMetrics::compute(&labels, &probs);
        let formatted = metrics.format();

        assert!((metrics.auc_roc - 1.0).abs() < 1e-9);
        assert!(formatted.starts_with("Test AUC-ROC: 1.0000\n"));
        assert!(formatted.contains("At p >= 0.50"));
        assert_eq!(metrics.report.fp, 1);
    }
}
