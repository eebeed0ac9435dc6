// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Directed bond message-passing neural network
//!
//! Encoder: `depth` rounds of message passing over directed bonds, atom
//! readout, mean over atoms per molecule, batch norm. Predictor: a
//! feed-forward network with one output (a logit for classification, a
//! standardized value for regression).
//!
//! Variable names follow the common layout of pretrained bond encoders
//! (`message_passing.W_i.weight`, `W_h`, `W_o`) so their weights can be
//! dropped into the encoder.

use super::batch::BatchGraph;
use super::{FitReport, PropertyModel};
use crate::dataset::Datapoint;
use crate::error::{PipelineError, Result};
use crate::labels::Task;
use crate::molecule::{MolFeatures, MolGraphFeaturizer};
use crate::scaler::StandardScaler;
use crate::trainer::{Trainer, TrainerConfig};
use candle_core::pickle::{Object, Stack};
use candle_core::{DType, Device, Tensor};
use candle_nn::{BatchNorm, Dropout, Linear, Module, ModuleT, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const ENCODER_PREFIX: &str = "message_passing";
const HPARAMS_FILE: &str = "hparams.json";

/// Architecture of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub task: Task,
    /// Message-passing iterations
    pub depth: usize,
    /// Encoder hidden size
    pub message_hidden_dim: usize,
    /// Predictor hidden size
    pub hidden_dim: usize,
    /// Predictor hidden layers
    pub n_layers: usize,
    /// Predictor dropout
    pub dropout: f64,
    /// Dropout inside message passing
    #[serde(default)]
    pub encoder_dropout: f64,
    pub atom_dim: usize,
    pub bond_dim: usize,
}

impl ModelConfig {
    pub fn new(
        task: Task,
        depth: usize,
        message_hidden_dim: usize,
        hidden_dim: usize,
        n_layers: usize,
        dropout: f64,
    ) -> Self {
        let featurizer = MolGraphFeaturizer::new();
        Self {
            task,
            depth,
            message_hidden_dim,
            hidden_dim,
            n_layers,
            dropout,
            encoder_dropout: 0.0,
            atom_dim: featurizer.atom_dim(),
            bond_dim: featurizer.bond_dim(),
        }
    }

    /// Adopt the encoder shape of a pretrained checkpoint
    pub fn with_encoder(mut self, encoder: &PretrainedEncoder) -> Self {
        self.message_hidden_dim = encoder.hidden_dim;
        if let Some(depth) = encoder.depth {
            self.depth = depth;
        }
        if let Some(dropout) = encoder.dropout {
            self.encoder_dropout = dropout;
        }
        self
    }
}

/// Everything needed to rebuild a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub model: ModelConfig,
    pub scaler: Option<StandardScaler>,
}

impl CheckpointMeta {
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(HPARAMS_FILE), json)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(HPARAMS_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::Checkpoint(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Encoder hyperparameters stored with a pretrained checkpoint
#[derive(Debug, Clone, Default, Deserialize)]
struct EncoderHyperParameters {
    d_h: Option<usize>,
    depth: Option<usize>,
    d_v: Option<usize>,
    d_e: Option<usize>,
    dropout: Option<f64>,
    bias: Option<bool>,
}

impl EncoderHyperParameters {
    /// Pick the known keys out of an unpickled dict; other keys and
    /// unexpected value types are ignored
    fn from_pickle(entries: Vec<(Object, Object)>) -> Self {
        let mut hparams = Self::default();
        for (key, value) in entries {
            let Object::Unicode(key) = key else {
                continue;
            };
            match key.as_str() {
                "d_h" => hparams.d_h = pickled_usize(value),
                "depth" => hparams.depth = pickled_usize(value),
                "d_v" => hparams.d_v = pickled_usize(value),
                "d_e" => hparams.d_e = pickled_usize(value),
                "dropout" => hparams.dropout = pickled_f64(value),
                "bias" => {
                    if let Object::Bool(bias) = value {
                        hparams.bias = Some(bias);
                    }
                }
                _ => {}
            }
        }
        hparams
    }
}

fn pickled_usize(value: Object) -> Option<usize> {
    value
        .int_or_long()
        .ok()
        .and_then(|v| usize::try_from(v).ok())
}

fn pickled_f64(value: Object) -> Option<f64> {
    match value {
        Object::Float(v) => Some(v),
        Object::Int(v) => Some(v as f64),
        Object::Long(v) => Some(v as f64),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct EncoderSidecar {
    #[serde(default)]
    hyper_parameters: EncoderHyperParameters,
}

/// Encoder weights read from a pretrained checkpoint
#[derive(Debug, Clone)]
pub struct PretrainedEncoder {
    /// Keyed by name inside the encoder (`W_i.weight`, ...)
    pub tensors: HashMap<String, Tensor>,
    pub hidden_dim: usize,
    pub depth: Option<usize>,
    pub dropout: Option<f64>,
    pub source: PathBuf,
}

impl PretrainedEncoder {
    /// Read `W_i`, `W_h` and `W_o` from the `state_dict` of a PyTorch
    /// checkpoint, or from a safetensors file. Hyperparameters come from the
    /// checkpoint's `hyper_parameters` entry, else from an optional
    /// `<stem>.json` sidecar; the hidden size is also inferred from the
    /// weight shapes.
    pub fn load(path: &Path, atom_dim: usize, bond_dim: usize) -> Result<Self> {
        let is_pickle = path
            .extension()
            .map(|e| e == "pt" || e == "pth" || e == "ckpt")
            .unwrap_or(false);

        let raw: Vec<(String, Tensor)> = if is_pickle {
            candle_core::pickle::read_all_with_key(path, Some("state_dict"))?
        } else {
            candle_core::safetensors::load(path, &Device::Cpu)?
                .into_iter()
                .collect()
        };

        let mut tensors = HashMap::new();
        for (name, tensor) in raw {
            let key = name
                .strip_prefix(&format!("{}.", ENCODER_PREFIX))
                .unwrap_or(&name)
                .to_string();
            if matches!(
                key.as_str(),
                "W_i.weight" | "W_h.weight" | "W_o.weight" | "W_o.bias"
            ) {
                tensors.insert(key, tensor.to_dtype(DType::F32)?);
            } else {
                tracing::debug!("Ignoring pretrained tensor {}", name);
            }
        }

        let w_i = tensors.get("W_i.weight").ok_or_else(|| {
            PipelineError::Checkpoint(format!("{}: missing W_i.weight", path.display()))
        })?;
        let (hidden_dim, input_dim) = w_i.dims2()?;

        let pickled = if is_pickle {
            read_pickled_hyper_parameters(path)?
        } else {
            None
        };
        let hparams = match pickled {
            Some(hparams) => hparams,
            None => read_sidecar(path)?,
        };
        if hparams.bias == Some(true) {
            return Err(PipelineError::Checkpoint(format!(
                "{}: biased W_i/W_h layers are not supported",
                path.display()
            )));
        }
        if let Some(p) = hparams.dropout {
            if !(0.0..1.0).contains(&p) {
                return Err(PipelineError::Checkpoint(format!(
                    "{}: encoder dropout {} outside [0, 1)",
                    path.display(),
                    p
                )));
            }
        }
        if let Some(d_h) = hparams.d_h {
            if d_h != hidden_dim {
                return Err(PipelineError::Checkpoint(format!(
                    "{}: d_h = {} but W_i has {} rows",
                    path.display(),
                    d_h,
                    hidden_dim
                )));
            }
        }
        let expected_dims = (hparams.d_v.unwrap_or(atom_dim), hparams.d_e.unwrap_or(bond_dim));
        if expected_dims != (atom_dim, bond_dim) || input_dim != atom_dim + bond_dim {
            return Err(PipelineError::Checkpoint(format!(
                "{}: encoder expects {} input features, featurizer produces {} atom + {} bond",
                path.display(),
                input_dim,
                atom_dim,
                bond_dim
            )));
        }
        for key in ["W_h.weight", "W_o.weight", "W_o.bias"] {
            if !tensors.contains_key(key) {
                return Err(PipelineError::Checkpoint(format!(
                    "{}: missing {}",
                    path.display(),
                    key
                )));
            }
        }

        tracing::info!(
            "Loaded pretrained encoder from {} (hidden {}, depth {:?}, dropout {:?})",
            path.display(),
            hidden_dim,
            hparams.depth,
            hparams.dropout
        );

        Ok(Self {
            tensors,
            hidden_dim,
            depth: hparams.depth,
            dropout: hparams.dropout,
            source: path.to_path_buf(),
        })
    }
}

/// `hyper_parameters` of a zipped PyTorch checkpoint whose pickled root is a
/// dict; `None` when the checkpoint carries no such entry
fn read_pickled_hyper_parameters(path: &Path) -> Result<Option<EncoderHyperParameters>> {
    let archive_error =
        |e: zip::result::ZipError| PipelineError::Checkpoint(format!("{}: {}", path.display(), e));

    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file)).map_err(archive_error)?;
    let Some(pickle_name) = archive
        .file_names()
        .find(|name| name.ends_with("data.pkl"))
        .map(str::to_string)
    else {
        return Ok(None);
    };

    let entry = archive.by_name(&pickle_name).map_err(archive_error)?;
    let mut stack = Stack::empty();
    stack.read_loop(&mut std::io::BufReader::new(entry))?;

    let Object::Dict(root) = stack.finalize()? else {
        return Ok(None);
    };
    Ok(root.into_iter().find_map(|(key, value)| match (key, value) {
        (Object::Unicode(key), Object::Dict(entries)) if key == "hyper_parameters" => {
            Some(EncoderHyperParameters::from_pickle(entries))
        }
        _ => None,
    }))
}

fn read_sidecar(path: &Path) -> Result<EncoderHyperParameters> {
    let sidecar = path.with_extension("json");
    if !sidecar.exists() {
        return Ok(EncoderHyperParameters::default());
    }
    let content = std::fs::read_to_string(&sidecar)?;
    let parsed: EncoderSidecar = serde_json::from_str(&content)?;
    Ok(parsed.hyper_parameters)
}

/// The tensor graph: encoder, aggregation, batch norm, predictor
struct Network {
    w_i: Linear,
    w_h: Linear,
    w_o: Linear,
    bn: BatchNorm,
    ffn: Vec<Linear>,
    encoder_dropout: Dropout,
    dropout: Dropout,
    depth: usize,
    hidden: usize,
}

impl Network {
    fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let d_h = config.message_hidden_dim;
        let mp = vb.pp(ENCODER_PREFIX);
        let w_i = candle_nn::linear_no_bias(config.atom_dim + config.bond_dim, d_h, mp.pp("W_i"))?;
        let w_h = candle_nn::linear_no_bias(d_h, d_h, mp.pp("W_h"))?;
        let w_o = candle_nn::linear(config.atom_dim + d_h, d_h, mp.pp("W_o"))?;

        let bn = candle_nn::batch_norm(d_h, 1e-5, vb.pp("bn"))?;

        // d_h -> hidden x n_layers -> 1
        let mut dims = vec![d_h];
        dims.extend(std::iter::repeat(config.hidden_dim).take(config.n_layers));
        dims.push(1);
        let ffn = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| candle_nn::linear(w[0], w[1], vb.pp(format!("ffn.{}", i))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            w_i,
            w_h,
            w_o,
            bn,
            ffn,
            encoder_dropout: Dropout::new(config.encoder_dropout as f32),
            dropout: Dropout::new(config.dropout as f32),
            depth: config.depth,
            hidden: d_h,
        })
    }

    /// Molecule embeddings `(n_mols, d_h)` before batch norm
    fn encode(&self, g: &BatchGraph, train: bool) -> candle_core::Result<Tensor> {
        let device = g.atom_features.device();
        let zeros_v = Tensor::zeros((g.n_atoms, self.hidden), DType::F32, device)?;

        let m_v = if g.n_edges == 0 {
            zeros_v
        } else {
            let h0 = self.w_i.forward(&Tensor::cat(
                &[&g.atom_features.index_select(&g.edge_src, 0)?, &g.edge_features],
                1,
            )?)?;
            let mut h = h0.relu()?;
            for _ in 1..self.depth {
                let incoming = zeros_v.index_add(&g.edge_dst, &h, 0)?;
                let m = (incoming.index_select(&g.edge_src, 0)? - h.index_select(&g.edge_rev, 0)?)?;
                h = (&h0 + self.w_h.forward(&m)?)?.relu()?;
                h = self.encoder_dropout.forward(&h, train)?;
            }
            zeros_v.index_add(&g.edge_dst, &h, 0)?
        };

        let h_v = self
            .w_o
            .forward(&Tensor::cat(&[&g.atom_features, &m_v], 1)?)?
            .relu()?;
        let h_v = self.encoder_dropout.forward(&h_v, train)?;

        let sums = Tensor::zeros((g.n_mols, self.hidden), DType::F32, device)?.index_add(
            &g.atom_batch,
            &h_v,
            0,
        )?;
        sums.broadcast_div(&g.atom_counts)
    }

    /// Raw outputs `(n_mols, 1)`
    fn forward(&self, g: &BatchGraph, train: bool) -> candle_core::Result<Tensor> {
        let mut x = self.bn.forward_t(&self.encode(g, train)?, train)?;
        for (i, layer) in self.ffn.iter().enumerate() {
            if i > 0 {
                x = self.dropout.forward(&x.relu()?, train)?;
            }
            x = layer.forward(&x)?;
        }
        Ok(x)
    }
}

/// Message-passing model behind the `PropertyModel` seam
pub struct Mpnn {
    config: ModelConfig,
    trainer: TrainerConfig,
    featurizer: MolGraphFeaturizer,
    varmap: VarMap,
    network: Network,
    device: Device,
    scaler: Option<StandardScaler>,
}

impl Mpnn {
    pub fn new(config: ModelConfig, trainer: TrainerConfig, device: Device) -> Result<Self> {
        let featurizer = MolGraphFeaturizer::new();
        if (config.atom_dim, config.bond_dim) != (featurizer.atom_dim(), featurizer.bond_dim()) {
            return Err(PipelineError::Checkpoint(format!(
                "model expects {}/{} atom/bond features, featurizer produces {}/{}",
                config.atom_dim,
                config.bond_dim,
                featurizer.atom_dim(),
                featurizer.bond_dim()
            )));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = Network::new(&config, vb)?;

        tracing::debug!(
            "Built MPNN: depth {}, encoder {} (dropout {}), predictor {}x{}, {} variables",
            config.depth,
            config.message_hidden_dim,
            config.encoder_dropout,
            config.n_layers,
            config.hidden_dim,
            varmap.all_vars().len()
        );

        Ok(Self {
            config,
            trainer,
            featurizer,
            varmap,
            network,
            device,
            scaler: None,
        })
    }

    /// Rebuild a trained model from a checkpoint file; `hparams.json` must
    /// sit in the same directory
    pub fn from_checkpoint(path: &Path, device: Device) -> Result<Self> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let meta = CheckpointMeta::load(dir)?;
        let mut model = Self::new(meta.model, TrainerConfig::default(), device)?;
        model.scaler = meta.scaler;
        model.load_weights(path)?;
        tracing::info!("Loaded checkpoint {}", path.display());
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn trainer_config(&self) -> &TrainerConfig {
        &self.trainer
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn featurizer(&self) -> &MolGraphFeaturizer {
        &self.featurizer
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub(crate) fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            model: self.config.clone(),
            scaler: self.scaler,
        }
    }

    /// Copy pretrained encoder weights into the network
    pub fn load_encoder(&mut self, encoder: &PretrainedEncoder) -> Result<()> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| PipelineError::Checkpoint("variable map lock poisoned".to_string()))?;

        for (key, tensor) in &encoder.tensors {
            let name = format!("{}.{}", ENCODER_PREFIX, key);
            let var = vars
                .get(&name)
                .ok_or_else(|| PipelineError::Checkpoint(format!("no variable named {}", name)))?;
            if var.dims() != tensor.dims() {
                return Err(PipelineError::Checkpoint(format!(
                    "{}: shape {:?} does not match model {:?}",
                    name,
                    tensor.dims(),
                    var.dims()
                )));
            }
            var.set(&tensor.to_device(&self.device)?)?;
        }

        tracing::info!(
            "Initialized encoder from {} ({} tensors)",
            encoder.source.display(),
            encoder.tensors.len()
        );
        Ok(())
    }

    /// Copy of every variable, batch norm statistics included
    pub(crate) fn snapshot(&self) -> Result<HashMap<String, Tensor>> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| PipelineError::Checkpoint("variable map lock poisoned".to_string()))?;
        let mut snapshot = HashMap::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            snapshot.insert(name.clone(), var.as_tensor().copy()?);
        }
        Ok(snapshot)
    }

    pub(crate) fn restore(&self, snapshot: &HashMap<String, Tensor>) -> Result<()> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| PipelineError::Checkpoint("variable map lock poisoned".to_string()))?;
        for (name, tensor) in snapshot {
            let var = vars
                .get(name)
                .ok_or_else(|| PipelineError::Checkpoint(format!("no variable named {}", name)))?;
            var.set(tensor)?;
        }
        Ok(())
    }

    pub fn save_weights(&self, path: &Path) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.varmap.load(path).map_err(|e| {
            PipelineError::Checkpoint(format!("cannot load {}: {}", path.display(), e))
        })
    }

    pub(crate) fn set_scaler(&mut self, scaler: Option<StandardScaler>) {
        self.scaler = scaler;
    }

    pub(crate) fn featurize(&self, data: &[Datapoint]) -> Vec<MolFeatures> {
        data.iter().map(|p| self.featurizer.featurize(&p.mol)).collect()
    }

    pub(crate) fn collate(&self, mols: &[&MolFeatures]) -> Result<BatchGraph> {
        BatchGraph::collate(
            mols,
            self.config.atom_dim,
            self.config.bond_dim,
            &self.device,
        )
    }

    /// Raw network output `(n_mols, 1)`
    pub(crate) fn forward(&self, batch: &BatchGraph, train: bool) -> Result<Tensor> {
        Ok(self.network.forward(batch, train)?)
    }

    /// Mean loss of raw outputs against training-space targets
    pub(crate) fn loss(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let loss = match self.config.task {
            Task::Classification => {
                candle_nn::loss::binary_cross_entropy_with_logit(outputs, targets)?
            }
            Task::Regression => candle_nn::loss::mse(outputs, targets)?,
        };
        Ok(loss)
    }

    /// Target as the loss sees it: scaled for regression
    pub(crate) fn training_target(&self, y: f64) -> f64 {
        match (self.config.task, &self.scaler) {
            (Task::Regression, Some(scaler)) => scaler.transform(y),
            _ => y,
        }
    }

    /// Map raw outputs to probabilities or original units
    pub(crate) fn output_transform(&self, raw: &[f64]) -> Vec<f64> {
        match (self.config.task, &self.scaler) {
            (Task::Classification, _) => raw.iter().map(|z| 1.0 / (1.0 + (-z).exp())).collect(),
            (Task::Regression, Some(scaler)) => scaler.inverse_transform_all(raw),
            (Task::Regression, None) => raw.to_vec(),
        }
    }

    /// Raw outputs for featurized molecules in inference mode
    pub(crate) fn predict_raw(&self, features: &[MolFeatures]) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(features.len());
        for chunk in features.chunks(self.trainer.batch_size.max(1)) {
            let refs: Vec<&MolFeatures> = chunk.iter().collect();
            let batch = self.collate(&refs)?;
            let values = self
                .forward(&batch, false)?
                .detach()
                .flatten_all()?
                .to_dtype(DType::F64)?
                .to_vec1::<f64>()?;
            out.extend(values);
        }
        Ok(out)
    }
}

impl PropertyModel for Mpnn {
    fn fit(
        &mut self,
        train: &[Datapoint],
        validation: &[Datapoint],
        scaler: Option<&StandardScaler>,
    ) -> Result<FitReport> {
        if self.config.task.is_regression() {
            self.scaler = scaler.copied();
        }
        let trainer = Trainer::new(self.trainer.clone());
        trainer.fit(self, train, validation)
    }

    fn predict(&self, data: &[Datapoint]) -> Result<Vec<f64>> {
        let features = self.featurize(data);
        let raw = self.predict_raw(&features)?;
        Ok(self.output_transform(&raw))
    }

    fn task(&self) -> Task {
        self.config.task
    }

    fn name(&self) -> &str {
        "MPNN"
    }

    fn description(&self) -> &str {
        "Directed bond message passing, mean aggregation, batch norm, feed-forward head"
    }
}

/// CUDA device 0 when available, CPU otherwise
pub fn default_device() -> Result<Device> {
    let device = Device::cuda_if_available(0)?;
    tracing::info!("Using device: {:?}", device);
    Ok(device)
}
