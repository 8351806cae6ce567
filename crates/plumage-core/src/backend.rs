//! Tensor backend for the text encoder.
//!
//! Everything runs on burn's CPU `NdArray` backend. Training wraps it in
//! `Autodiff`; evaluation uses the inner backend, which also disables dropout.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::{ArrayView2, ArrayView3};

/// Backend used for inference and evaluation.
pub type InferenceBackend = NdArray<f32>;

/// Backend used while training the text encoder.
pub type TrainingBackend = Autodiff<InferenceBackend>;

pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

/// Copy a matrix into a tensor.
pub fn tensor2<B: Backend>(array: ArrayView2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = array.dim();
    let data = TensorData::new(array.iter().copied().collect::<Vec<f32>>(), [rows, cols]);
    Tensor::from_data(data, device)
}

/// Copy a `[batch, vocabulary, length]` array into a tensor.
pub fn tensor3<B: Backend>(array: ArrayView3<f32>, device: &B::Device) -> Tensor<B, 3> {
    let (batch, rows, cols) = array.dim();
    let data = TensorData::new(array.iter().copied().collect::<Vec<f32>>(), [batch, rows, cols]);
    Tensor::from_data(data, device)
}
