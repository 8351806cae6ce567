//! Convolutional-recurrent text encoder over one-hot token sequences.
//!
//! ```text
//! [B, V, T] → (Conv1d → ReLU → MaxPool1d → Dropout) × blocks
//!           → [B, T', C] → LSTM × layers (dropout between layers)
//!           → mean over time → [B, hidden · directions]
//! ```
//!
//! Dropout is only active on an autodiff backend, so an encoder moved to the
//! inner backend with `valid()` embeds deterministically.

use std::path::{Path, PathBuf};

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{MaxPool1d, MaxPool1dConfig};
use burn::nn::{BiLstm, BiLstmConfig, Dropout, DropoutConfig, Lstm, LstmConfig, Relu};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::checkpoint::Checkpoint;
use crate::config::TextEncoderConfig;
use crate::error::ModelError;

/// Hyperparameters that fix the shape of every parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub vocabulary_size: usize,
    pub conv_channels: Vec<usize>,
    pub conv_kernels: Vec<usize>,
    pub conv_maxpool: usize,
    pub conv_dropout: f32,
    pub rnn_hidden_size: usize,
    pub rnn_num_layers: usize,
    pub rnn_bidir: bool,
    pub rnn_dropout: f32,
}

impl Architecture {
    pub fn from_config(config: &TextEncoderConfig, vocabulary_size: usize) -> Self {
        Self {
            vocabulary_size,
            conv_channels: config.conv_channels.clone(),
            conv_kernels: config.conv_kernels.clone(),
            conv_maxpool: config.conv_maxpool,
            conv_dropout: config.conv_dropout.unwrap_or(0.0),
            rnn_hidden_size: config.rnn_hidden_size(),
            rnn_num_layers: config.rnn_num_layers,
            rnn_bidir: config.rnn_bidir,
            rnn_dropout: config.rnn_dropout.unwrap_or(0.0),
        }
    }

    /// Size of the produced embeddings.
    pub fn embedding_dim(&self) -> usize {
        self.rnn_hidden_size * if self.rnn_bidir { 2 } else { 1 }
    }

    /// Shortest sequence that keeps at least one step through every block.
    pub fn min_sequence_len(&self) -> usize {
        min_sequence_len(&self.conv_kernels, self.conv_maxpool)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let fail = |message: &str| {
            Err(ModelError::Config {
                message: message.to_string(),
            })
        };
        let valid_dropout = |p: f32| (0.0..1.0).contains(&p);

        if self.vocabulary_size == 0 {
            return fail("vocabulary is empty");
        }
        if self.conv_channels.is_empty() || self.conv_channels.len() != self.conv_kernels.len() {
            return fail("conv_channels and conv_kernels must be non-empty and the same length");
        }
        if self.conv_channels.contains(&0) || self.conv_kernels.contains(&0) {
            return fail("conv_channels and conv_kernels must be positive");
        }
        if self.conv_maxpool == 0 {
            return fail("conv_maxpool must be at least 1");
        }
        if self.rnn_hidden_size == 0 || self.rnn_num_layers == 0 {
            return fail("rnn_hidden_size and rnn_num_layers must be positive");
        }
        if !valid_dropout(self.conv_dropout) || !valid_dropout(self.rnn_dropout) {
            return fail("dropout must be in [0, 1)");
        }
        Ok(())
    }
}

/// Shortest input that survives valid convolutions with `kernels`, each
/// followed by a non-overlapping max pool of width `pool`.
pub fn min_sequence_len(kernels: &[usize], pool: usize) -> usize {
    kernels
        .iter()
        .rev()
        .fold(1, |len, &kernel| len * pool + kernel.saturating_sub(1))
}

/// Conv1d → ReLU → MaxPool1d → Dropout.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv1d<B>,
    activation: Relu,
    pool: MaxPool1d,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        architecture: &Architecture,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: Conv1dConfig::new(in_channels, out_channels, kernel_size).init(device),
            activation: Relu::new(),
            pool: MaxPool1dConfig::new(architecture.conv_maxpool)
                .with_stride(architecture.conv_maxpool)
                .init(),
            dropout: DropoutConfig::new(architecture.conv_dropout as f64).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.conv.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        self.dropout.forward(x)
    }
}

/// Character (or word) level CNN-RNN text encoder.
#[derive(Module, Debug)]
pub struct CharCnnRnn<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    /// Unidirectional layers; empty when `rnn_bidir` is set
    lstm: Vec<Lstm<B>>,
    /// Bidirectional layers; empty unless `rnn_bidir` is set
    bilstm: Vec<BiLstm<B>>,
    /// Applied to the input of every recurrent layer after the first
    rnn_dropout: Dropout,
    architecture: Ignored<Architecture>,
}

impl<B: Backend> CharCnnRnn<B> {
    /// Build a freshly initialized encoder. `seed` reseeds the backend
    /// before the weights are drawn.
    pub fn new(
        architecture: Architecture,
        seed: Option<u64>,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        architecture.validate()?;
        if let Some(seed) = seed {
            B::seed(seed);
        }

        let mut in_channels = architecture.vocabulary_size;
        let mut blocks = Vec::with_capacity(architecture.conv_channels.len());
        for (&channels, &kernel) in architecture
            .conv_channels
            .iter()
            .zip(&architecture.conv_kernels)
        {
            blocks.push(ConvBlock::new(in_channels, channels, kernel, &architecture, device));
            in_channels = channels;
        }

        let hidden = architecture.rnn_hidden_size;
        let (mut lstm, mut bilstm) = (Vec::new(), Vec::new());
        for _ in 0..architecture.rnn_num_layers {
            if architecture.rnn_bidir {
                bilstm.push(BiLstmConfig::new(in_channels, hidden, true).init(device));
            } else {
                lstm.push(LstmConfig::new(in_channels, hidden, true).init(device));
            }
            in_channels = architecture.embedding_dim();
        }

        let encoder = Self {
            blocks,
            lstm,
            bilstm,
            rnn_dropout: DropoutConfig::new(architecture.rnn_dropout as f64).init(),
            architecture: Ignored(architecture),
        };
        tracing::debug!(
            "Built text encoder: {} conv blocks, {} LSTM layers, {} parameters",
            encoder.blocks.len(),
            encoder.architecture.rnn_num_layers,
            encoder.parameter_count()
        );
        Ok(encoder)
    }

    /// Build an encoder from configuration for a vocabulary of the given size.
    pub fn from_config(
        config: &TextEncoderConfig,
        vocabulary_size: usize,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        Self::new(
            Architecture::from_config(config, vocabulary_size),
            config.seed,
            device,
        )
    }

    /// Embed one-hot texts `[B, V, T]` into `[B, D]`.
    pub fn forward(&self, texts: Tensor<B, 3>) -> Result<Tensor<B, 2>, ModelError> {
        let [_, vocabulary, len] = texts.dims();
        if vocabulary != self.architecture.vocabulary_size {
            return Err(ModelError::Shape {
                message: format!(
                    "text encoder expects {} vocabulary rows, got {vocabulary}",
                    self.architecture.vocabulary_size
                ),
            });
        }
        let min_len = self.architecture.min_sequence_len();
        if len < min_len {
            return Err(ModelError::Shape {
                message: format!(
                    "sequence of {len} steps collapses to nothing; at least {min_len} are needed"
                ),
            });
        }

        let mut x = texts;
        for block in &self.blocks {
            x = block.forward(x);
        }

        // [B, C, T'] → [B, T', C]
        let mut seq = x.swap_dims(1, 2);
        for (l, layer) in self.lstm.iter().enumerate() {
            if l > 0 {
                seq = self.rnn_dropout.forward(seq);
            }
            seq = layer.forward(seq, None).0;
        }
        for (l, layer) in self.bilstm.iter().enumerate() {
            if l > 0 {
                seq = self.rnn_dropout.forward(seq);
            }
            seq = layer.forward(seq, None).0;
        }

        Ok(seq.mean_dim(1).squeeze(1))
    }

    /// Size of the produced embeddings.
    pub fn embedding_dim(&self) -> usize {
        self.architecture.embedding_dim()
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.num_params()
    }

    /// Write the encoder, tagged with the vocabulary it was trained on.
    ///
    /// `path` receives the JSON metadata; the weights go next to it with an
    /// `.mpk` extension.
    pub fn save(&self, path: &Path, vocabulary_hash: &str) -> Result<(), ModelError> {
        let weights = weights_path(path)?;
        Checkpoint::new(self.architecture.0.clone(), vocabulary_hash).save(path)?;
        self.clone()
            .save_file(weights.clone(), &recorder())
            .map_err(|e| ModelError::Checkpoint {
                path: weights,
                message: format!("{e:?}"),
            })
    }

    /// Restore an encoder saved with [`save`](Self::save).
    ///
    /// With `vocabulary_hash` set, a checkpoint trained on another vocabulary
    /// is rejected.
    pub fn load(
        path: &Path,
        vocabulary_hash: Option<&str>,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        let checkpoint = Checkpoint::<Architecture>::load(path)?;
        if let Some(expected) = vocabulary_hash {
            if checkpoint.vocabulary_hash != expected {
                return Err(ModelError::Checkpoint {
                    path: path.to_path_buf(),
                    message: "checkpoint was trained with a different vocabulary".to_string(),
                });
            }
        }

        let weights = weights_path(path)?;
        Self::new(checkpoint.architecture, None, device)?
            .load_file(weights.clone(), &recorder(), device)
            .map_err(|e| ModelError::Checkpoint {
                path: weights,
                message: format!("{e:?}"),
            })
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::new()
}

/// Weights file belonging to the metadata file at `path`.
fn weights_path(path: &Path) -> Result<PathBuf, ModelError> {
    if path.extension().is_some_and(|ext| ext == "mpk") {
        return Err(ModelError::Checkpoint {
            path: path.to_path_buf(),
            message: "checkpoint path must not use the .mpk weights extension".to_string(),
        });
    }
    Ok(path.with_extension("mpk"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend, TrainingBackend};
    use burn::module::AutodiffModule;
    use burn::tensor::TensorData;

    type B = InferenceBackend;
    type TB = TrainingBackend;

    fn small(bidir: bool, layers: usize, dropout: f32) -> Architecture {
        Architecture {
            vocabulary_size: 5,
            conv_channels: vec![4, 3],
            conv_kernels: vec![2, 2],
            conv_maxpool: 2,
            conv_dropout: dropout,
            rnn_hidden_size: 3,
            rnn_num_layers: layers,
            rnn_bidir: bidir,
            rnn_dropout: dropout,
        }
    }

    fn one_hot<Bk: Backend<Device = burn::backend::ndarray::NdArrayDevice>>(batch: usize, len: usize) -> Tensor<Bk, 3> {
        let mut values = vec![0.0f32; batch * 5 * len];
        for b in 0..batch {
            for t in 0..len {
                values[(b * 5 + (b * 3 + t * 2) % 5) * len + t] = 1.0;
            }
        }
        Tensor::from_data(TensorData::new(values, [batch, 5, len]), &default_device())
    }

    fn values<Bk: Backend>(tensor: Tensor<Bk, 2>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_embedding_shape_and_min_length() {
        let arch = small(true, 2, 0.0);
        assert_eq!(arch.min_sequence_len(), 7);
        assert_eq!(arch.embedding_dim(), 6);

        let encoder = CharCnnRnn::<B>::new(arch, Some(1), &default_device()).unwrap();
        let emb = encoder.forward(one_hot(2, 7)).unwrap();
        assert_eq!(emb.dims(), [2, 6]);
        let emb = encoder.forward(one_hot(3, 20)).unwrap();
        assert_eq!(emb.dims(), [3, 6]);

        let err = encoder.forward(one_hot(2, 6)).unwrap_err();
        assert!(matches!(err, ModelError::Shape { .. }));
    }

    #[test]
    fn test_default_embedding_is_1024_either_way() {
        let mut config = TextEncoderConfig::default();
        let arch = Architecture::from_config(&config, 69);
        assert_eq!(arch.embedding_dim(), 1024);
        assert_eq!(arch.min_sequence_len(), 66);

        config.rnn_bidir = true;
        let arch = Architecture::from_config(&config, 69);
        assert_eq!(arch.rnn_hidden_size, 512);
        assert_eq!(arch.embedding_dim(), 1024);
    }

    #[test]
    fn test_min_sequence_len_without_pooling() {
        assert_eq!(min_sequence_len(&[3, 3], 1), 5);
        assert_eq!(min_sequence_len(&[1], 4), 4);
    }

    #[test]
    fn test_rejects_invalid_architecture() {
        let device = default_device();
        let mut arch = small(false, 1, 0.0);
        arch.conv_kernels.pop();
        assert!(matches!(
            CharCnnRnn::<B>::new(arch, Some(0), &device),
            Err(ModelError::Config { .. })
        ));

        let arch = small(false, 1, 1.0);
        assert!(CharCnnRnn::<B>::new(arch, Some(0), &device).is_err());
    }

    #[test]
    fn test_wrong_vocabulary_size() {
        let device = default_device();
        let encoder = CharCnnRnn::<B>::new(small(false, 1, 0.0), Some(1), &device).unwrap();
        let texts = Tensor::<B, 3>::zeros([1, 6, 10], &device);
        assert!(encoder.forward(texts).is_err());
    }

    #[test]
    fn test_gradients_reach_convolutions() {
        let encoder = CharCnnRnn::<TB>::new(small(false, 2, 0.0), Some(4), &default_device()).unwrap();
        let loss = encoder.forward(one_hot(2, 12)).unwrap().sum();
        let grads = loss.backward();

        let conv = encoder.blocks[0].conv.weight.val().grad(&grads).unwrap();
        assert!(conv.abs().sum().into_scalar() > 0.0);
        assert_eq!(encoder.lstm.len(), 2);
        assert!(encoder.bilstm.is_empty());
    }

    #[test]
    fn test_dropout_only_in_training() {
        let encoder = CharCnnRnn::<TB>::new(small(false, 2, 0.5), Some(8), &default_device()).unwrap();

        let eval = encoder.valid();
        let a = values(eval.forward(one_hot(2, 16)).unwrap());
        let b = values(eval.forward(one_hot(2, 16)).unwrap());
        assert_eq!(a, b);

        let c = values(encoder.forward(one_hot(2, 16)).unwrap());
        let d = values(encoder.forward(one_hot(2, 16)).unwrap());
        assert_ne!(c, d);
    }

    #[test]
    fn test_parameter_count() {
        let encoder = CharCnnRnn::<B>::new(small(true, 1, 0.0), Some(0), &default_device()).unwrap();
        assert_eq!(encoder.bilstm.len(), 1);
        // 4·5·2+4, 3·4·2+3, then 2 directions × 4 gates × (3·3 + 3·3 + 3 + 3)
        assert_eq!(encoder.parameter_count(), 44 + 27 + 2 * 96);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("encoder.json");
        let device = default_device();

        let original = CharCnnRnn::<B>::new(small(true, 2, 0.0), Some(21), &device).unwrap();
        original.save(&path, "vocab-hash").unwrap();
        assert!(path.with_extension("mpk").exists());
        let expected = values(original.forward(one_hot(2, 10)).unwrap());

        let restored = CharCnnRnn::<B>::load(&path, Some("vocab-hash"), &device).unwrap();
        assert_eq!(restored.architecture(), original.architecture());
        let actual = values(restored.forward(one_hot(2, 10)).unwrap());
        assert!(actual
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| (a - b).abs() < 1e-6));

        let err = CharCnnRnn::<B>::load(&path, Some("other-hash"), &device).unwrap_err();
        assert!(matches!(err, ModelError::Checkpoint { .. }));
    }

    #[test]
    fn test_checkpoint_path_cannot_be_weights_file() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = CharCnnRnn::<B>::new(small(false, 1, 0.0), Some(2), &default_device()).unwrap();
        let err = encoder.save(&dir.path().join("encoder.mpk"), "h").unwrap_err();
        assert!(matches!(err, ModelError::Checkpoint { .. }));
    }
}
