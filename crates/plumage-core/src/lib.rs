//! Plumage Core - text encoder training for fine-grained image descriptions.
//!
//! Plumage learns a character- (or word-) level text encoder whose embeddings
//! rank images of the right class above all others. Images are embedded by a
//! frozen, pretrained ONNX model; only the text side is trained, as a burn
//! module on an autodiff backend.
//!
//! # Architecture
//!
//! ```text
//! CUB-200-2011 root ─→ SampleProvider ─→ Batch ─┬─→ ImageEncoder (frozen) ─┐
//!                         ↑                      └─→ CharCnnRnn (train) ────┤
//!                    Vocabulary                                             ↓
//!                                          encoders_loss ─→ backward ─→ Adam step
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use plumage_core::backend::{default_device, TrainingBackend};
//! use plumage_core::training::adam;
//! use plumage_core::{CharCnnRnn, Config, OnnxImageEncoder, SampleProvider, Trainer, Vocabulary};
//!
//! fn main() -> plumage_core::Result<()> {
//!     let config = Config::load()?;
//!     let vocabulary = Vocabulary::from_config(
//!         config.vocabulary.level,
//!         config.vocabulary_path().as_deref(),
//!     )?;
//!     let provider = SampleProvider::open(&config.dataset, &config.dataset_root(), vocabulary)?;
//!     let images = OnnxImageEncoder::load(&config.image_model_path(), None)?;
//!     let texts = CharCnnRnn::<TrainingBackend>::from_config(
//!         &config.text_encoder,
//!         provider.vocabulary().len(),
//!         &default_device(),
//!     )?;
//!
//!     let mut trainer = Trainer::new(provider, images, texts, adam(), 1e-4);
//!     let summary = trainer.run(100, 1, |step| println!("{}: {}", step.iteration, step.loss))?;
//!     println!("mean loss {}", summary.mean_loss);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod backend;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod loss;
pub mod training;
pub mod vocabulary;

// Re-exports for convenient access
pub use backend::{InferenceBackend, TrainingBackend};
pub use config::Config;
pub use dataset::{Batch, CatalogSummary, ClassCatalog, SampleProvider, SamplerSettings};
pub use embedding::{Architecture, CharCnnRnn, ImageEncoder, OnnxImageEncoder};
pub use error::{
    ConfigError, DatasetError, LossError, ModelError, PlumageError, Result, VocabularyError,
};
pub use loss::encoders_loss;
pub use training::{adam, RunSummary, StepReport, Trainer};
pub use vocabulary::{Level, Vocabulary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
