// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Delivery dataset loading and preprocessing
//!
//! Reads the compound table, keeps one record per molecule (the maximum
//! target), removes excluded experiments and splits the survivors into
//! train/validation/test partitions of parsed molecules.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::labels::{label_targets, Task};
use crate::molecule::{parse_smiles, MolGraph};
use crate::split::{split_indices, SplitIndices, SplitKind};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One row of the input table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub smiles: String,
    pub target: f64,
    pub experiment_id: String,
}

/// A labelled, parsed molecule
#[derive(Debug, Clone)]
pub struct Datapoint {
    pub smiles: String,
    pub mol: MolGraph,
    pub y: f64,
}

impl Datapoint {
    pub fn from_smiles(smiles: &str, y: f64) -> Result<Self> {
        let mol = parse_smiles(smiles).map_err(|e| PipelineError::smiles(smiles, e))?;
        Ok(Self {
            smiles: smiles.to_string(),
            mol,
            y,
        })
    }
}

/// Targets of a partition, in order
pub fn targets(points: &[Datapoint]) -> Vec<f64> {
    points.iter().map(|p| p.y).collect()
}

/// Load records from a CSV file
pub fn load_records(path: &Path, config: &PipelineConfig) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    load_records_from_reader(file, &path.display().to_string(), config)
}

/// Load records from any reader; `source` names the input in error messages
pub fn load_records_from_reader<R: Read>(
    reader: R,
    source: &str,
    config: &PipelineConfig,
) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PipelineError::MalformedRecord {
                path: source.to_string(),
                row: 0,
                reason: format!("missing column '{}'", name),
            })
    };
    let smiles_idx = column(&config.smiles_column)?;
    let target_idx = column(&config.target_column)?;
    let experiment_idx = column(&config.experiment_column)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // header is row 1
        let row = idx + 2;
        let record = result?;
        let malformed = |reason: String| PipelineError::MalformedRecord {
            path: source.to_string(),
            row,
            reason,
        };

        let smiles = record
            .get(smiles_idx)
            .map(str::trim)
            .ok_or_else(|| malformed("missing SMILES".to_string()))?;
        let raw_target = record
            .get(target_idx)
            .map(str::trim)
            .ok_or_else(|| malformed("missing target".to_string()))?;
        let experiment_id = record.get(experiment_idx).map(str::trim).unwrap_or("");

        if raw_target.is_empty() {
            skipped += 1;
            continue;
        }
        let target: f64 = raw_target
            .parse()
            .map_err(|_| malformed(format!("target '{}' is not a number", raw_target)))?;
        if !target.is_finite() {
            skipped += 1;
            continue;
        }

        records.push(Record {
            smiles: smiles.to_string(),
            target,
            experiment_id: experiment_id.to_string(),
        });
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} rows without a finite target in {}", skipped, source);
    }
    tracing::info!("Read {} records from {}", records.len(), source);

    Ok(records)
}

/// Keep one record per SMILES: the one with the largest target. On ties the
/// earliest row wins. Output is ordered by SMILES.
pub fn dedup_max_target(records: Vec<Record>) -> Vec<Record> {
    let mut best: BTreeMap<String, Record> = BTreeMap::new();
    for record in records {
        match best.entry(record.smiles.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if record.target > slot.get().target {
                    slot.insert(record);
                }
            }
        }
    }
    best.into_values().collect()
}

/// Drop records whose experiment is in `excluded`
pub fn exclude_experiments(records: Vec<Record>, excluded: &[String]) -> Vec<Record> {
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    records
        .into_iter()
        .filter(|r| !excluded.contains(r.experiment_id.as_str()))
        .collect()
}

/// Load, deduplicate and filter the configured input
pub fn prepare_records(path: &Path, config: &PipelineConfig) -> Result<Vec<Record>> {
    let records = load_records(path, config)?;
    let raw = records.len();

    let records = dedup_max_target(records);
    let unique = records.len();

    let records = exclude_experiments(records, &config.excluded_experiments);
    tracing::info!(
        "Prepared {} molecules ({} rows, {} unique, {} after exclusions)",
        records.len(),
        raw,
        unique,
        records.len()
    );

    Ok(records)
}

/// Targets sorted ascending, for the distribution plot
pub fn sorted_targets(records: &[Record]) -> Vec<f64> {
    let mut values: Vec<f64> = records.iter().map(|r| r.target).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

/// Parsed, labelled partitions ready for training
#[derive(Debug, Clone)]
pub struct Dataset {
    pub task: Task,
    pub split: SplitIndices,
    pub train: Vec<Datapoint>,
    pub validation: Vec<Datapoint>,
    pub test: Vec<Datapoint>,
}

impl Dataset {
    /// Label, parse and split prepared records. Any unparseable SMILES is an error.
    pub fn from_records(records: &[Record], task: Task, config: &PipelineConfig) -> Result<Self> {
        let raw_targets: Vec<f64> = records.iter().map(|r| r.target).collect();
        let labels = label_targets(&raw_targets, task, config.class_threshold);

        let points = records
            .iter()
            .zip(labels)
            .map(|(r, y)| Datapoint::from_smiles(&r.smiles, y))
            .collect::<Result<Vec<_>>>()?;

        Self::from_datapoints(points, task, config)
    }

    pub fn from_datapoints(
        points: Vec<Datapoint>,
        task: Task,
        config: &PipelineConfig,
    ) -> Result<Self> {
        Self::from_parsed(points.into_iter().map(Some).collect(), task, config)
    }

    /// Split over every record, parsed or not, then drop the ones that
    /// failed to parse. Partition membership stays that of the full record
    /// list.
    pub fn from_parsed(
        parsed: Vec<Option<Datapoint>>,
        task: Task,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let split = split_indices(parsed.len(), SplitKind::Random, config.split_sizes, config.seed)?;
        let (train, validation, test) = split.apply(&parsed);
        let keep = |part: Vec<Option<Datapoint>>| part.into_iter().flatten().collect::<Vec<_>>();
        let (train, validation, test) = (keep(train), keep(validation), keep(test));

        tracing::info!(
            "Dataset split: train={}, val={}, test={}",
            train.len(),
            validation.len(),
            test.len()
        );

        Ok(Self {
            task,
            split,
            train,
            validation,
            test,
        })
    }

    pub fn total_samples(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}
