//! Image and text encoders.
//!
//! The image side is a frozen feature extractor run through ONNX Runtime;
//! the text side is a trainable convolutional-recurrent network built from
//! burn modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use plumage_core::backend::{self, default_device, TrainingBackend};
//! use plumage_core::embedding::{CharCnnRnn, ImageEncoder, OnnxImageEncoder};
//!
//! let device = default_device();
//! let images = OnnxImageEncoder::load(&config.image_model_path(), None)?;
//! let texts = CharCnnRnn::<TrainingBackend>::from_config(&config.text_encoder, vocabulary.len(), &device)?;
//!
//! let image_embeddings = images.embed(batch.images.view())?;                    // [C, 1024]
//! let text_embeddings = texts.forward(backend::tensor3(batch.flat_texts()?, &device))?; // [C·n, 1024]
//! ```

pub mod char_cnn_rnn;
pub mod checkpoint;
pub mod onnx;

use ndarray::{Array2, ArrayView4};

use crate::error::ModelError;

pub use char_cnn_rnn::{Architecture, CharCnnRnn};
pub use checkpoint::Checkpoint;
pub use onnx::OnnxImageEncoder;

/// A frozen image encoder.
pub trait ImageEncoder {
    /// Embed a batch of images `[B, 3, H, W]` into `[B, D]`.
    fn embed(&self, images: ArrayView4<f32>) -> Result<Array2<f32>, ModelError>;
}
