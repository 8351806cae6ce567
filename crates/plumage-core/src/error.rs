//! Error types for dataset sampling and text encoder training.
//!
//! Errors are organized by component so that a failed training run points at
//! the stage that broke (configuration, vocabulary, dataset, model, loss) and
//! carries the offending path, class, or token.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Plumage operations.
#[derive(Error, Debug)]
pub enum PlumageError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Vocabulary loading or lookup errors
    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    /// Dataset sampling errors
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Embedding model errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Loss precondition violations
    #[error("Loss error: {0}")]
    Loss(#[from] LossError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Vocabulary errors.
#[derive(Error, Debug)]
pub enum VocabularyError {
    /// The vocabulary table could not be read
    #[error("Failed to read vocabulary {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// The vocabulary table is malformed
    #[error("Malformed vocabulary {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// A token is not part of the vocabulary
    #[error("Token {token:?} is not in the vocabulary")]
    UnknownToken { token: String },

    /// A stored character code is not a valid Unicode scalar value
    #[error("Invalid character code {code}")]
    InvalidCharCode { code: u32 },
}

/// Dataset sampling errors.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Descriptions per class outside 1..=10
    #[error("Descriptions per class must be between 1 and {max}, got {requested}")]
    InvalidDescriptionCount { requested: usize, max: usize },

    /// The class manifest could not be read
    #[error("Failed to read class manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// A class identifier has no numeric label prefix
    #[error("Malformed class identifier {class_id:?}: expected <label>.<name>")]
    MalformedClassId { class_id: String },

    /// The catalog lists no classes
    #[error("Class manifest {0} lists no classes")]
    EmptyCatalog(PathBuf),

    /// The description format was not compiled in
    #[error("Description format {0} is not available in this build")]
    FormatUnavailable(String),

    /// A class directory is missing or unreadable
    #[error("Cannot read class directory {path}: {message}")]
    ClassDirectory { path: PathBuf, message: String },

    /// A class directory holds no supported images
    #[error("No images found for class {class_id}")]
    NoImages { class_id: String },

    /// An image could not be decoded
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// A description slot is missing or unreadable
    #[error("Description {slot} for {class_id}/{image} unavailable: {message}")]
    Description {
        class_id: String,
        image: String,
        slot: usize,
        message: String,
    },

    /// A description could not be encoded
    #[error("Failed to encode description {slot} for {class_id}/{image}: {source}")]
    Encode {
        class_id: String,
        image: String,
        slot: usize,
        #[source]
        source: VocabularyError,
    },
}

/// Embedding model errors.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A model file could not be loaded
    #[error("Failed to load model {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Inference failed
    #[error("Inference failed: {message}")]
    Inference { message: String },

    /// Input or output tensor has an unexpected shape
    #[error("Shape error: {message}")]
    Shape { message: String },

    /// The encoder configuration cannot build a network
    #[error("Invalid encoder configuration: {message}")]
    Config { message: String },

    /// Writing a checkpoint failed
    #[error("Failed to write checkpoint {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },
}

/// Loss precondition violations.
#[derive(Error, Debug)]
pub enum LossError {
    /// Embeddings and labels disagree on batch size
    #[error("Batch size mismatch: {message}")]
    BatchMismatch { message: String },

    /// Ranking needs at least two distinct classes
    #[error("Batch contains a single class; ranking loss needs at least two")]
    SingleClass,
}

/// Convenience type alias for Plumage results.
pub type Result<T> = std::result::Result<T, PlumageError>;
