//! Configuration validation with range checks.

use crate::dataset::{DescriptionFormat, MAX_DESCRIPTIONS};
use crate::embedding::char_cnn_rnn::min_sequence_len;
use crate::error::ConfigError;
use crate::vocabulary::Level;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dataset = &self.dataset;
        if dataset.image_px == 0 {
            return Err(ConfigError::ValidationError(
                "dataset.image_px must be > 0".into(),
            ));
        }
        if dataset.text_cutoff == 0 {
            return Err(ConfigError::ValidationError(
                "dataset.text_cutoff must be > 0".into(),
            ));
        }
        if dataset.descriptions_per_class == 0 || dataset.descriptions_per_class > MAX_DESCRIPTIONS
        {
            return Err(ConfigError::ValidationError(format!(
                "dataset.descriptions_per_class must be between 1 and {MAX_DESCRIPTIONS}"
            )));
        }
        if dataset.text_format == DescriptionFormat::Hdf5 && !cfg!(feature = "hdf5") {
            return Err(ConfigError::ValidationError(
                "dataset.text_format = \"hdf5\" requires building with the `hdf5` feature".into(),
            ));
        }

        if self.vocabulary.level == Level::Word && self.vocabulary.file.is_none() {
            return Err(ConfigError::ValidationError(
                "vocabulary.file is required when vocabulary.level = \"word\"".into(),
            ));
        }

        let encoder = &self.text_encoder;
        if encoder.conv_channels.is_empty() {
            return Err(ConfigError::ValidationError(
                "text_encoder.conv_channels must not be empty".into(),
            ));
        }
        if encoder.conv_channels.len() != encoder.conv_kernels.len() {
            return Err(ConfigError::ValidationError(format!(
                "text_encoder.conv_kernels has {} entries but conv_channels has {}",
                encoder.conv_kernels.len(),
                encoder.conv_channels.len()
            )));
        }
        if encoder.conv_channels.contains(&0) || encoder.conv_kernels.contains(&0) {
            return Err(ConfigError::ValidationError(
                "text_encoder.conv_channels and conv_kernels must be > 0".into(),
            ));
        }
        if encoder.conv_maxpool == 0 {
            return Err(ConfigError::ValidationError(
                "text_encoder.conv_maxpool must be >= 1".into(),
            ));
        }
        for (name, rate) in [
            ("conv_dropout", encoder.conv_dropout),
            ("rnn_dropout", encoder.rnn_dropout),
        ] {
            if let Some(rate) = rate {
                if !(0.0..1.0).contains(&rate) {
                    return Err(ConfigError::ValidationError(format!(
                        "text_encoder.{name} must be in [0.0, 1.0)"
                    )));
                }
            }
        }
        if encoder.rnn_num_layers == 0 {
            return Err(ConfigError::ValidationError(
                "text_encoder.rnn_num_layers must be >= 1".into(),
            ));
        }
        let min_len = min_sequence_len(&encoder.conv_kernels, encoder.conv_maxpool);
        if dataset.text_cutoff < min_len {
            return Err(ConfigError::ValidationError(format!(
                "dataset.text_cutoff is {} but the text encoder needs at least {min_len} steps",
                dataset.text_cutoff
            )));
        }

        if self.training.iterations == 0 {
            return Err(ConfigError::ValidationError(
                "training.iterations must be > 0".into(),
            ));
        }
        let lr = self.training.learning_rate;
        if lr.is_nan() || lr <= 0.0 {
            return Err(ConfigError::ValidationError(
                "training.learning_rate must be > 0".into(),
            ));
        }
        Ok(())
    }
}
