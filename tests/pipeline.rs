// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

use candle_core::Device;
use delivery_mpnn::dataset::{dedup_max_target, exclude_experiments, load_records};
use delivery_mpnn::pipeline::{run_inference, TaskMetrics, TrainingPipeline};
use delivery_mpnn::trainer::TrainerConfig;
use delivery_mpnn::{HyperParams, ModelConfig, Mpnn, PipelineConfig, PropertyModel, RunName, Task};
use std::path::{Path, PathBuf};

const SMILES: [&str; 24] = [
    "CCO", "CCN", "CCC", "CCCC", "CCCCC", "c1ccccc1", "Cc1ccccc1", "CC(=O)O", "CCCl", "OCCO",
    "CN", "CCOC", "C1CC1", "C1CCCCC1", "CC=C", "C#N", "CC(C)O", "NCCN", "OC(=O)CCC(=O)O",
    "c1ccncc1", "CCS", "CC(=O)N", "COC(=O)C", "CCCCCCCCCC",
];

fn write_dataset(dir: &Path) -> PathBuf {
    let mut csv = String::from("smiles,quantified_delivery,Experiment_ID,notes\n");
    for (i, smiles) in SMILES.iter().enumerate() {
        let target = (i as f64 * 0.37).sin() * 2.0 + 1.0;
        csv.push_str(&format!("{},{:.4},Exp_{},row{}\n", smiles, target, i % 4, i));
        // lower-valued replicate from another experiment
        csv.push_str(&format!("{},{:.4},Exp_rep,dup{}\n", smiles, target - 1.0, i));
    }
    csv.push_str("CCCCCCO,9.0,Liu_Phospholipids,excluded\n");
    csv.push_str("CCCCCCN,9.0,Akinc_Michael_addition,excluded\n");
    let path = dir.join("all_data.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn params() -> HyperParams {
    HyperParams {
        depth: 2,
        hidden_dim: 16,
        n_layers: 1,
        dropout: 0.0,
        epochs: 2,
        run: 1,
    }
}

fn setup() -> (tempfile::TempDir, PipelineConfig) {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path());
    let config = PipelineConfig {
        data_path: data,
        output_dir: dir.path().join("out"),
        batch_size: 8,
        message_hidden_dim: 16,
        ..Default::default()
    };
    (dir, config)
}

fn mpnn(task: Task, config: &PipelineConfig, checkpoint_dir: PathBuf) -> Mpnn {
    let p = params();
    let trainer = TrainerConfig {
        epochs: p.epochs,
        batch_size: config.batch_size,
        seed: config.seed,
        checkpoint_dir: Some(checkpoint_dir),
        show_progress: false,
        ..Default::default()
    };
    let model_config = ModelConfig::new(
        task,
        p.depth,
        config.message_hidden_dim,
        p.hidden_dim,
        p.n_layers,
        p.dropout,
    );
    Mpnn::new(model_config, trainer, Device::Cpu).unwrap()
}

#[test]
fn test_preprocessing_properties() {
    let (_dir, config) = setup();
    let records = load_records(&config.data_path, &config).unwrap();
    assert_eq!(records.len(), SMILES.len() * 2 + 2);

    let deduped = dedup_max_target(records.clone());
    assert_eq!(deduped.len(), SMILES.len() + 2);
    for kept in &deduped {
        let max = records
            .iter()
            .filter(|r| r.smiles == kept.smiles)
            .map(|r| r.target)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(kept.target, max);
        assert_ne!(kept.experiment_id, "Exp_rep");
    }

    let filtered = exclude_experiments(deduped, &config.excluded_experiments);
    assert_eq!(filtered.len(), SMILES.len());
    assert!(filtered
        .iter()
        .all(|r| !config.excluded_experiments.contains(&r.experiment_id)));
}

#[test]
fn test_regression_end_to_end() {
    let (_dir, config) = setup();
    let run = RunName::new(config.run_prefix.clone(), params());
    let pipeline = TrainingPipeline::new(config.clone(), run.clone(), Task::Regression);

    let mut model = mpnn(Task::Regression, &config, pipeline.checkpoint_dir());
    let results = pipeline.run(&mut model).unwrap();

    assert_eq!(results.run_name, "mean_regression_chem_d2_h16_n1_p0.0_e2_r1");
    assert_eq!(results.dataset_info.molecules, SMILES.len());
    assert_eq!(results.dataset_info.test_samples, 3);
    match &results.metrics {
        TaskMetrics::Regression(m) => {
            assert_eq!(m.support, 3);
            assert!(m.mse.is_finite());
        }
        other => panic!("unexpected metrics {:?}", other),
    }

    let out = &config.output_dir;
    assert!(run.target_distribution_path(out).exists());
    assert!(run.test_predictions_path(out).exists());
    let ckpt = pipeline.checkpoint_dir();
    assert!(ckpt.join("last.safetensors").exists());
    assert!(ckpt.join("hparams.json").exists());

    // the checkpoint reproduces the trained model's test predictions
    let best = results
        .fit
        .as_ref()
        .and_then(|f| f.best_checkpoint.clone())
        .unwrap();
    let restored = Mpnn::from_checkpoint(Path::new(&best), Device::Cpu).unwrap();
    assert_eq!(restored.scaler(), model.scaler());

    let inference = run_inference(&config, &restored, "lnp").unwrap();
    assert!(out.join("best_lnp_test_predictions.svg").exists());
    match (&results.metrics, &inference.metrics) {
        (TaskMetrics::Regression(a), TaskMetrics::Regression(b)) => {
            assert!((a.mse - b.mse).abs() < 1e-4);
        }
        _ => panic!("expected regression metrics"),
    }
}

#[test]
fn test_classification_end_to_end() {
    let (_dir, config) = setup();
    let run = RunName::new(config.run_prefix.clone(), params());
    let pipeline = TrainingPipeline::new(config.clone(), run.clone(), Task::Classification);

    let mut model = mpnn(Task::Classification, &config, pipeline.checkpoint_dir());
    assert_eq!(model.task(), Task::Classification);
    let results = pipeline.run(&mut model).unwrap();

    match &results.metrics {
        TaskMetrics::Classification(m) => {
            assert!((0.0..=1.0).contains(&m.auc_roc));
            assert_eq!(m.report.support, 3);
        }
        other => panic!("unexpected metrics {:?}", other),
    }
    assert!(run.roc_curve_path(&config.output_dir).exists());
    assert!(results.dataset_info.scaler.is_none());

    // a classification checkpoint is evaluated with ROC/AUC on the same test set
    let best = results
        .fit
        .as_ref()
        .and_then(|f| f.best_checkpoint.clone())
        .unwrap();
    let restored = Mpnn::from_checkpoint(Path::new(&best), Device::Cpu).unwrap();
    assert_eq!(restored.task(), Task::Classification);
    assert!(restored.scaler().is_none());

    let inference = run_inference(&config, &restored, "lnp_class").unwrap();
    assert_eq!(inference.run_name, "best_lnp_class");
    assert_eq!(inference.dataset_info.test_samples, results.dataset_info.test_samples);
    assert!(config.output_dir.join("best_lnp_class_roc_curve.svg").exists());
    assert!(!config
        .output_dir
        .join("best_lnp_class_test_predictions.svg")
        .exists());
    match (&results.metrics, &inference.metrics) {
        (TaskMetrics::Classification(a), TaskMetrics::Classification(b)) => {
            assert!((a.auc_roc - b.auc_roc).abs() < 1e-9);
            assert_eq!(a.report, b.report);
        }
        _ => panic!("expected classification metrics"),
    }
}
