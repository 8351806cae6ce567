//! Text encoder checkpoint metadata.
//!
//! The weights themselves are written by a burn recorder; this JSON document
//! sits next to them and records the encoder architecture and the hash of the
//! vocabulary it was trained with.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Identifies the checkpoint layout.
pub const CHECKPOINT_FORMAT: &str = "plumage-text-encoder/2";

/// Metadata of a saved text encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<A> {
    pub format: String,
    /// Library version that wrote the checkpoint
    pub version: String,
    /// [`Vocabulary::content_hash`](crate::vocabulary::Vocabulary::content_hash)
    /// of the vocabulary the encoder was trained with
    pub vocabulary_hash: String,
    pub architecture: A,
}

impl<A: Serialize + DeserializeOwned> Checkpoint<A> {
    pub fn new(architecture: A, vocabulary_hash: &str) -> Self {
        Self {
            format: CHECKPOINT_FORMAT.to_string(),
            version: crate::VERSION.to_string(),
            vocabulary_hash: vocabulary_hash.to_string(),
            architecture,
        }
    }

    /// Write the checkpoint, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let error = |message: String| ModelError::Checkpoint {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| error(format!("Failed to create {:?}: {e}", parent)))?;
        }

        let json = serde_json::to_vec_pretty(self).map_err(|e| error(e.to_string()))?;
        std::fs::write(path, &json).map_err(|e| error(e.to_string()))?;

        tracing::info!("Saved text encoder metadata to {:?}", path);
        Ok(())
    }

    /// Read a checkpoint written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let error = |message: String| ModelError::Checkpoint {
            path: path.to_path_buf(),
            message,
        };

        let content = std::fs::read(path).map_err(|e| error(e.to_string()))?;
        let checkpoint: Self = serde_json::from_slice(&content).map_err(|e| error(e.to_string()))?;
        if checkpoint.format != CHECKPOINT_FORMAT {
            return Err(error(format!(
                "unsupported checkpoint format {:?}",
                checkpoint.format
            )));
        }

        tracing::info!("Loaded text encoder metadata from {:?}", path);
        Ok(checkpoint)
    }
}
