//! Frozen image encoder backed by an ONNX Runtime session.
//!
//! Any image feature extractor exported to ONNX works as long as it takes a
//! single `[B, 3, H, W]` float input. The configured output (or the first one)
//! is flattened to `[B, D]`; rows are returned as the model produces them.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{Array2, ArrayView4};
use ort::session::Session;
use ort::value::Value;

use super::ImageEncoder;
use crate::error::ModelError;

/// Wraps an ONNX Runtime session for image feature extraction.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct OnnxImageEncoder {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
    /// Output to read; `None` takes the first.
    output_name: Option<String>,
    path: PathBuf,
}

impl OnnxImageEncoder {
    /// Load a feature extractor from an ONNX file.
    pub fn load(model_path: &Path, output_name: Option<&str>) -> Result<Self, ModelError> {
        let load_error = |message: String| ModelError::Load {
            path: model_path.to_path_buf(),
            message,
        };

        if !model_path.exists() {
            return Err(load_error(
                "Model not found. Set image_encoder.model in the config.".to_string(),
            ));
        }

        tracing::info!("Loading image encoder from {:?}", model_path);
        let session = Session::builder()
            .map_err(|e| load_error(format!("Failed to create ONNX session builder: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(format!("Failed to load ONNX model: {e}")))?;

        // Detect the input tensor name from model metadata.
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "input".to_string());

        let outputs: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if let Some(wanted) = output_name {
            if !outputs.iter().any(|name| name == wanted) {
                return Err(load_error(format!(
                    "Model has no output {wanted:?} (outputs: {outputs:?})"
                )));
            }
        }

        tracing::debug!(
            "Image encoder input: {:?}, outputs: {:?}, using {:?}",
            input_name,
            outputs,
            output_name.or(outputs.first().map(String::as_str))
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name: output_name.map(str::to_string),
            path: model_path.to_path_buf(),
        })
    }

    /// Path the model was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageEncoder for OnnxImageEncoder {
    fn embed(&self, images: ArrayView4<f32>) -> Result<Array2<f32>, ModelError> {
        let batch = images.shape()[0];
        if batch == 0 {
            return Ok(Array2::zeros((0, 0)));
        }
        let inference_error = |message: String| ModelError::Inference { message };

        // Convert ndarray to (shape, flat_data) for ort.
        let shape: Vec<i64> = images.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = images.iter().copied().collect();
        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| inference_error(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| inference_error(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| inference_error(format!("ONNX inference failed: {e}")))?;

        let (_, value) = match &self.output_name {
            Some(wanted) => outputs.iter().find(|(name, _)| *name == wanted.as_str()),
            None => outputs.iter().next(),
        }
        .ok_or_else(|| inference_error("Model produced no usable output".to_string()))?;

        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error(format!("Failed to extract output tensor: {e}")))?;

        flatten_rows(shape, data, batch)
    }
}

/// Reshape a `[B, ...]` output to `[B, D]`.
fn flatten_rows(shape: &[i64], data: &[f32], batch: usize) -> Result<Array2<f32>, ModelError> {
    let shape_error = || ModelError::Shape {
        message: format!("Unexpected image encoder output shape {shape:?} for batch of {batch}"),
    };

    if shape.first().copied() != Some(batch as i64) || data.len() % batch != 0 {
        return Err(shape_error());
    }
    Array2::from_shape_vec((batch, data.len() / batch), data.to_vec()).map_err(|_| shape_error())
}
