//! Sub-configuration structs with defaults matching the CUB-200-2011 layout.

use crate::dataset::DescriptionFormat;
use crate::vocabulary::Level;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Dataset layout and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset root directory
    pub root: PathBuf,

    /// Class manifest, relative to `root`
    pub manifest: String,

    /// Image directory, relative to `root`
    pub image_dir: String,

    /// Description directory, relative to `root`
    pub text_dir: String,

    /// On-disk format of the description files
    pub text_format: DescriptionFormat,

    /// Square size images are resized to
    pub image_px: u32,

    /// Fixed number of time steps per description
    pub text_cutoff: usize,

    /// Descriptions drawn per class and batch (1..=10)
    pub descriptions_per_class: usize,

    /// Seed for batch sampling. Unset draws from OS entropy.
    pub seed: Option<u64>,

    /// Image extensions considered when listing a class directory
    pub supported_formats: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("~/data/CUB_200_2011"),
            manifest: "trainvalclasses.txt".to_string(),
            image_dir: "images".to_string(),
            text_dir: "text_c10".to_string(),
            text_format: DescriptionFormat::Json,
            image_px: 224,
            text_cutoff: 201,
            descriptions_per_class: 1,
            seed: None,
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "bmp".to_string(),
                "gif".to_string(),
                "webp".to_string(),
                "tiff".to_string(),
            ],
        }
    }
}

/// Vocabulary settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Temporal resolution: "char" or "word"
    pub level: Level,

    /// Word table relative to the dataset root. Required when level = "word".
    pub file: Option<String>,
}

/// Text encoder (character CNN + LSTM) hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextEncoderConfig {
    /// Output channels of each convolution
    pub conv_channels: Vec<usize>,

    /// Kernel size of each convolution (same length as `conv_channels`)
    pub conv_kernels: Vec<usize>,

    /// Max-pool factor applied after each convolution
    pub conv_maxpool: usize,

    /// Dropout after each convolution block
    pub conv_dropout: Option<f32>,

    /// Dropout between recurrent layers
    pub rnn_dropout: Option<f32>,

    /// Run the recurrent layers in both directions
    pub rnn_bidir: bool,

    /// Number of stacked recurrent layers
    pub rnn_num_layers: usize,

    /// Seed for weight initialization. Unset keeps the backend's current RNG.
    pub seed: Option<u64>,
}

impl Default for TextEncoderConfig {
    fn default() -> Self {
        Self {
            conv_channels: vec![384, 512, 256],
            conv_kernels: vec![4, 4, 4],
            conv_maxpool: 3,
            conv_dropout: None,
            rnn_dropout: None,
            rnn_bidir: false,
            rnn_num_layers: 1,
            seed: None,
        }
    }
}

impl TextEncoderConfig {
    /// Hidden size per direction: 1024 unidirectional, 512 bidirectional,
    /// so the embedding is 1024-dimensional either way.
    pub fn rnn_hidden_size(&self) -> usize {
        if self.rnn_bidir {
            512
        } else {
            1024
        }
    }
}

/// Frozen image encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageEncoderConfig {
    /// ONNX feature extractor
    pub model: PathBuf,

    /// Output tensor to read. Unset takes the model's first output.
    pub output: Option<String>,
}

impl Default for ImageEncoderConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("~/.plumage/models/googlenet_features.onnx"),
            output: None,
        }
    }
}

/// Training loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of batches (gradient steps)
    pub iterations: usize,

    /// Adam learning rate
    pub learning_rate: f32,

    /// Where to write the trained text encoder. Unset skips saving.
    pub output: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            learning_rate: 1e-4,
            output: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
