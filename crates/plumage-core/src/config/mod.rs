//! Configuration management for Plumage.
//!
//! Configuration is loaded from a TOML file with defaults for the
//! CUB-200-2011 directory layout. CLI flags override individual fields after
//! loading; call [`Config::validate`] again once overrides are applied.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Plumage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dataset layout and sampling
    pub dataset: DatasetConfig,

    /// Vocabulary level and table
    pub vocabulary: VocabularyConfig,

    /// Trainable text encoder
    pub text_encoder: TextEncoderConfig,

    /// Frozen image encoder
    pub image_encoder: ImageEncoderConfig,

    /// Training loop
    pub training: TrainingConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.plumage.plumage/config.toml
    /// - Linux: ~/.config/plumage/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\plumage\config\config.toml
    ///
    /// Falls back to ~/.plumage/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "plumage", "plumage")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".plumage").join("config.toml")
            })
    }

    /// Get the resolved dataset root (with ~ expansion).
    pub fn dataset_root(&self) -> PathBuf {
        expand(&self.dataset.root)
    }

    /// Get the word vocabulary table path, if one is configured.
    ///
    /// Relative to the dataset root unless absolute or `~`-prefixed.
    pub fn vocabulary_path(&self) -> Option<PathBuf> {
        self.vocabulary.file.as_ref().map(|file| {
            let expanded = expand(Path::new(file));
            if expanded.is_absolute() {
                expanded
            } else {
                self.dataset_root().join(expanded)
            }
        })
    }

    /// Get the resolved image encoder model path (with ~ expansion).
    pub fn image_model_path(&self) -> PathBuf {
        expand(&self.image_encoder.model)
    }

    /// Get the resolved checkpoint output path, if saving is requested.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.training.output.as_deref().map(expand)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::Level;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dataset.image_px, 224);
        assert_eq!(config.dataset.text_cutoff, 201);
        assert_eq!(config.vocabulary.level, Level::Char);
        assert_eq!(config.text_encoder.conv_maxpool, 3);
        assert!((config.training.learning_rate - 1e-4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[dataset]"));
        assert!(toml.contains("[text_encoder]"));
        assert!(toml.contains("[training]"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[dataset]\nroot = \"/data/cub\"\nimage_px = 64\n\n[vocabulary]\nlevel = \"word\"\nfile = \"vocab_c10.t7\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.dataset.image_px, 64);
        assert_eq!(config.dataset.text_cutoff, 201);
        assert_eq!(config.vocabulary.level, Level::Word);
        assert_eq!(
            config.vocabulary_path().unwrap(),
            PathBuf::from("/data/cub/vocab_c10.t7")
        );
    }

    #[test]
    fn test_load_rejects_word_level_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[vocabulary]\nlevel = \"word\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("vocabulary.file"));
    }

    #[test]
    fn test_rnn_hidden_size_halves_when_bidirectional() {
        let mut config = TextEncoderConfig::default();
        assert_eq!(config.rnn_hidden_size(), 1024);
        config.rnn_bidir = true;
        assert_eq!(config.rnn_hidden_size(), 512);
    }
}
