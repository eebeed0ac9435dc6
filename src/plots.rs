// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Diagnostic figures (SVG)
//!
//! Uses the SVG backend to avoid system font dependencies. Existing files are
//! overwritten.

use crate::error::{PipelineError, Result};
use crate::metrics::RocCurve;
use plotters::prelude::*;
use plotters_svg::SVGBackend;
use std::path::Path;

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn plot_error(path: &Path, err: Box<dyn std::error::Error>) -> PipelineError {
    PipelineError::Plot(format!("{}: {}", path.display(), err))
}

/// Pad a degenerate or empty range so the chart can still be built
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(1e-3);
    (min - pad, max + pad)
}

/// Sorted targets against their rank, titled with the run name
pub fn target_distribution(path: &Path, title: &str, sorted_targets: &[f64]) -> Result<()> {
    draw_target_distribution(path, title, sorted_targets).map_err(|e| plot_error(path, e))?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

fn draw_target_distribution(path: &Path, title: &str, values: &[f64]) -> DrawResult {
    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let (y_min, y_max) = padded_range(values.iter().copied());
    let n = values.len().max(1);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 16))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0usize..n, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Molecule (sorted)")
        .y_desc("quantified_delivery")
        .draw()?;

    chart.draw_series(LineSeries::new(
        values.iter().enumerate().map(|(i, v)| (i, *v)),
        &BLUE,
    ))?;

    root.present()?;
    Ok(())
}

/// ROC curve with the chance diagonal and the AUC in the legend
pub fn roc_curve(path: &Path, roc: &RocCurve, auc: f64) -> Result<()> {
    draw_roc_curve(path, roc, auc).map_err(|e| plot_error(path, e))?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

fn draw_roc_curve(path: &Path, roc: &RocCurve, auc: f64) -> DrawResult {
    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Receiver Operating Characteristic (ROC) Curve", ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0f64..1.0, 0.0f64..1.05)?;

    chart
        .configure_mesh()
        .x_desc("False Positive Rate (FPR)")
        .y_desc("True Positive Rate (TPR)")
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            roc.fpr.iter().zip(&roc.tpr).map(|(x, y)| (*x, *y)),
            RED.stroke_width(2),
        ))?
        .label(format!("ROC curve (AUC = {:.2})", auc))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

    chart.draw_series(LineSeries::new(
        vec![(0.0, 0.0), (1.0, 1.0)],
        BLUE.mix(0.6),
    ))?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// True vs predicted scatter with the Spearman rho in the legend
pub fn prediction_scatter(
    path: &Path,
    title: &str,
    y_true: &[f64],
    y_pred: &[f64],
    spearman: f64,
) -> Result<()> {
    draw_prediction_scatter(path, title, y_true, y_pred, spearman)
        .map_err(|e| plot_error(path, e))?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

fn draw_prediction_scatter(
    path: &Path,
    title: &str,
    y_true: &[f64],
    y_pred: &[f64],
    spearman: f64,
) -> DrawResult {
    let root = SVGBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_min, x_max) = padded_range(y_true.iter().copied());
    let (y_min, y_max) = padded_range(y_pred.iter().copied());

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 16))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Test -- True Values")
        .y_desc("Test -- Predictions")
        .draw()?;

    chart
        .draw_series(
            y_true
                .iter()
                .zip(y_pred)
                .map(|(t, p)| Circle::new((*t, *p), 3, BLUE.mix(0.6).filled())),
        )?
        .label(format!("Rho = {:.2})", spearman))
        .legend(|(x, y)| Circle::new((x + 10, y), 3, BLUE.filled()));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
        let (lo, hi) = padded_range([2.0, 2.0].into_iter());
        assert!(lo < 2.0 && hi > 2.0);
    }

    #[test]
    fn test_writes_svg_files() {
        let dir = tempfile::tempdir().unwrap();

        let dist = dir.path().join("run_target_distribution.svg");
        target_distribution(&dist, "run_d3", &[-1.0, 0.0, 0.5, 2.0]).unwrap();

        let labels = [1.0, 0.0, 1.0, 0.0];
        let scores = [0.9, 0.3, 0.6, 0.4];
        let roc = metrics::roc_curve(&labels, &scores);
        let roc_path = dir.path().join("run_roc_curve.svg");
        roc_curve(&roc_path, &roc, roc.auc()).unwrap();

        let scatter = dir.path().join("run_test_predictions.svg");
        prediction_scatter(&scatter, "run", &[1.0, 2.0, 3.0], &[1.1, 1.9, 3.2], 1.0).unwrap();

        for path in [&dist, &roc_path, &scatter] {
            let content = std::fs::read_to_string(path).unwrap();
            assert!(content.contains("<svg"));
        }
        let scatter_text = std::fs::read_to_string(&scatter).unwrap();
        assert!(scatter_text.contains("Rho = 1.00)"));
        assert!(scatter_text.contains("Test -- True Values"));
        assert!(scatter_text.contains("Test -- Predictions"));
        assert!(std::fs::read_to_string(&dist).unwrap().contains("run_d3"));
    }
}
