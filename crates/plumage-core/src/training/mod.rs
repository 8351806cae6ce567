//! Text encoder training against a frozen image encoder.
//!
//! One step:
//!
//! ```text
//! SampleProvider::get_next_batch(n)
//!   ├─ images [C, 3, px, px] ─→ ImageEncoder (frozen) ─→ [C, D]
//!   └─ texts  [C·n, V, T]    ─→ CharCnnRnn (autodiff) ─→ [C·n, D]
//!                                      ↓
//!            encoders_loss(batched = true) → backward() → optimizer step
//! ```
//!
//! Training runs for a fixed number of steps; the first error aborts the run
//! and leaves the text encoder as it was after the last completed step.

use std::path::Path;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

use crate::backend;
use crate::dataset::{Batch, SampleProvider};
use crate::embedding::{CharCnnRnn, ImageEncoder};
use crate::error::{ModelError, PlumageError, Result};
use crate::loss::encoders_loss;

/// Outcome of one training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// 1-based step number
    pub iteration: usize,
    pub loss: f32,
    /// Images (one per class) in the batch
    pub classes: usize,
    /// Descriptions in the batch
    pub descriptions: usize,
}

/// Totals for a [`Trainer::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub mean_loss: f32,
    pub last_loss: f32,
}

/// Adam with burn's default moments, for the text encoder.
pub fn adam<B: AutodiffBackend>() -> impl Optimizer<CharCnnRnn<B>, B> {
    AdamConfig::new().init::<B, CharCnnRnn<B>>()
}

/// Trains a text encoder so its embeddings rank images of the right class first.
pub struct Trainer<I, B: AutodiffBackend, O> {
    provider: SampleProvider,
    image_encoder: I,
    text_encoder: CharCnnRnn<B>,
    optimizer: O,
    learning_rate: f64,
    device: B::Device,
    iteration: usize,
}

impl<I, B, O> Trainer<I, B, O>
where
    I: ImageEncoder,
    B: AutodiffBackend,
    O: Optimizer<CharCnnRnn<B>, B>,
{
    pub fn new(
        provider: SampleProvider,
        image_encoder: I,
        text_encoder: CharCnnRnn<B>,
        optimizer: O,
        learning_rate: f32,
    ) -> Self {
        Self {
            provider,
            image_encoder,
            text_encoder,
            optimizer,
            learning_rate: learning_rate as f64,
            device: B::Device::default(),
            iteration: 0,
        }
    }

    /// Draw a batch with `descriptions_per_class` descriptions per class and
    /// take one optimizer step on it.
    pub fn step(&mut self, descriptions_per_class: usize) -> Result<StepReport> {
        let batch = self.provider.get_next_batch(descriptions_per_class)?;
        self.train_batch(&batch)
    }

    /// Take one optimizer step on a given batch.
    pub fn train_batch(&mut self, batch: &Batch) -> Result<StepReport> {
        let loss = batch_loss(&self.image_encoder, &self.text_encoder, batch, &self.device)?;
        let value: f32 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &self.text_encoder);
        self.text_encoder =
            self.optimizer
                .step(self.learning_rate, self.text_encoder.clone(), grads);

        self.iteration += 1;
        let report = StepReport {
            iteration: self.iteration,
            loss: value,
            classes: batch.len(),
            descriptions: batch.len() * batch.descriptions_per_class,
        };
        tracing::debug!(
            "Step {}: loss {:.4} ({} classes, {} descriptions)",
            report.iteration,
            report.loss,
            report.classes,
            report.descriptions
        );
        Ok(report)
    }

    /// Loss of the current text encoder on a batch, without updating it.
    /// Dropout is off.
    pub fn evaluate(&self, batch: &Batch) -> Result<f32> {
        let device = <B::InnerBackend as Backend>::Device::default();
        let model = self.text_encoder.valid();
        let loss = batch_loss(&self.image_encoder, &model, batch, &device)?;
        Ok(loss.into_scalar().elem())
    }

    /// Run `iterations` steps, calling `on_step` after each one.
    pub fn run<F>(
        &mut self,
        iterations: usize,
        descriptions_per_class: usize,
        mut on_step: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&StepReport),
    {
        tracing::info!(
            "Training for {} iterations ({} descriptions per class)",
            iterations,
            descriptions_per_class
        );

        let mut total = 0.0f64;
        let mut last_loss = f32::NAN;
        for _ in 0..iterations {
            let report = self.step(descriptions_per_class)?;
            total += report.loss as f64;
            last_loss = report.loss;
            on_step(&report);
        }

        let summary = RunSummary {
            steps: iterations,
            mean_loss: if iterations > 0 {
                (total / iterations as f64) as f32
            } else {
                f32::NAN
            },
            last_loss,
        };
        tracing::info!(
            "Training finished: {} steps, mean loss {:.4}, last loss {:.4}",
            summary.steps,
            summary.mean_loss,
            summary.last_loss
        );
        Ok(summary)
    }

    /// Write the text encoder, tagged with the provider's vocabulary.
    pub fn save_text_encoder(&self, path: &Path) -> Result<()> {
        let hash = self.provider.vocabulary().content_hash();
        self.text_encoder.save(path, &hash)?;
        Ok(())
    }

    /// Steps taken so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn provider(&self) -> &SampleProvider {
        &self.provider
    }

    pub fn text_encoder(&self) -> &CharCnnRnn<B> {
        &self.text_encoder
    }

    pub fn image_encoder(&self) -> &I {
        &self.image_encoder
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

/// Embed both sides of a batch and score them.
fn batch_loss<I: ImageEncoder, B: Backend>(
    image_encoder: &I,
    text_encoder: &CharCnnRnn<B>,
    batch: &Batch,
    device: &B::Device,
) -> Result<Tensor<B, 1>> {
    let texts = batch.flat_texts().map_err(shape_error)?;
    let image_embeddings = image_encoder.embed(batch.images.view())?;

    let images = backend::tensor2::<B>(image_embeddings.view(), device);
    let text_embeddings = text_encoder.forward(backend::tensor3::<B>(texts, device))?;
    Ok(encoders_loss(
        images,
        text_embeddings,
        batch.labels.view(),
        true,
    )?)
}

fn shape_error(e: ndarray::ShapeError) -> PlumageError {
    ModelError::Shape {
        message: e.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, TrainingBackend};
    use crate::dataset::{
        ClassCatalog, MemoryDescriptionStore, MemoryImageSource, SamplerSettings,
    };
    use crate::embedding::Architecture;
    use crate::error::DatasetError;
    use crate::vocabulary::Vocabulary;
    use image::{DynamicImage, Rgb, RgbImage};
    use ndarray::{Array2, ArrayView4, Axis};

    type TB = TrainingBackend;

    /// Per-channel image means spread over `dim` features.
    struct ChannelMeans {
        dim: usize,
    }

    impl ImageEncoder for ChannelMeans {
        fn embed(&self, images: ArrayView4<f32>) -> std::result::Result<Array2<f32>, ModelError> {
            let means = images
                .mean_axis(Axis(3))
                .and_then(|m| m.mean_axis(Axis(2)))
                .ok_or_else(|| ModelError::Shape {
                    message: "empty image".to_string(),
                })?;
            Ok(Array2::from_shape_fn((images.shape()[0], self.dim), |(b, d)| {
                means[[b, d % 3]] * (d + 1) as f32 / self.dim as f32 - 0.25
            }))
        }
    }

    const CLASSES: [(&str, [u8; 3], &str); 3] = [
        ("001.Black_footed_Albatross", [20, 20, 20], "a large dark seabird"),
        ("014.Indigo_Bunting", [30, 40, 220], "a small bright blue bird"),
        ("042.Vermilion_Flycatcher", [230, 30, 20], "red crown and black wings"),
    ];

    fn provider() -> SampleProvider {
        let mut images = MemoryImageSource::new();
        let mut descriptions = MemoryDescriptionStore::new();
        for (class_id, color, text) in CLASSES {
            for i in 0..2 {
                let stem = format!("{class_id}_{i}");
                images.insert(
                    class_id,
                    &format!("{stem}.jpg"),
                    DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(color))),
                );
                for slot in 1..=10 {
                    descriptions.insert_text(class_id, &stem, slot, &format!("{text} {slot}"));
                }
            }
        }
        SampleProvider::new(
            SamplerSettings {
                image_px: 4,
                text_cutoff: 24,
            },
            ClassCatalog::from_ids(CLASSES.iter().map(|c| c.0)).unwrap(),
            Vocabulary::characters(),
            Box::new(images),
            Box::new(descriptions),
        )
        .with_seed(17)
    }

    fn trainer(
        learning_rate: f32,
    ) -> Trainer<ChannelMeans, TB, impl Optimizer<CharCnnRnn<TB>, TB>> {
        let architecture = Architecture {
            vocabulary_size: Vocabulary::characters().len(),
            conv_channels: vec![8],
            conv_kernels: vec![3],
            conv_maxpool: 2,
            conv_dropout: 0.0,
            rnn_hidden_size: 4,
            rnn_num_layers: 1,
            rnn_bidir: false,
            rnn_dropout: 0.0,
        };
        Trainer::new(
            provider(),
            ChannelMeans { dim: 4 },
            CharCnnRnn::new(architecture, Some(2), &default_device()).unwrap(),
            adam(),
            learning_rate,
        )
    }

    #[test]
    fn test_step_updates_text_encoder() {
        let mut trainer = trainer(1e-3);
        let batch = provider().get_next_batch(1).unwrap();
        let before = trainer.evaluate(&batch).unwrap();

        let report = trainer.step(1).unwrap();
        assert!(report.loss.is_finite());
        assert_eq!(report.iteration, 1);
        assert_eq!(report.classes, 3);
        assert_eq!(report.descriptions, 3);
        assert_ne!(trainer.evaluate(&batch).unwrap(), before);
    }

    #[test]
    fn test_step_with_several_descriptions() {
        let mut trainer = trainer(1e-3);
        let report = trainer.step(4).unwrap();
        assert_eq!(report.descriptions, 12);
    }

    #[test]
    fn test_small_step_lowers_batch_loss() {
        let mut trainer = trainer(1e-4);
        let mut provider = provider();
        let batch = provider.get_next_batch(2).unwrap();

        let before = trainer.evaluate(&batch).unwrap();
        trainer.train_batch(&batch).unwrap();
        let after = trainer.evaluate(&batch).unwrap();
        assert!(after < before, "loss went from {before} to {after}");
    }

    #[test]
    fn test_run_reports_every_step() {
        let mut trainer = trainer(1e-3);
        let mut seen = Vec::new();
        let summary = trainer.run(5, 2, |report| seen.push(report.iteration)).unwrap();

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(summary.steps, 5);
        assert!(summary.mean_loss.is_finite());
        assert_eq!(trainer.iteration(), 5);
    }

    #[test]
    fn test_invalid_description_count_aborts() {
        let mut trainer = trainer(1e-3);
        let err = trainer.run(3, 11, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            PlumageError::Dataset(DatasetError::InvalidDescriptionCount { .. })
        ));
        assert_eq!(trainer.iteration(), 0);
    }

    #[test]
    fn test_failed_step_leaves_encoder_untouched() {
        let mut trainer = trainer(1e-3);
        let batch = provider().get_next_batch(1).unwrap();
        let before = trainer.evaluate(&batch).unwrap();

        trainer.image_encoder = ChannelMeans { dim: 5 };
        assert!(matches!(trainer.step(1), Err(PlumageError::Loss(_))));
        assert_eq!(trainer.iteration(), 0);

        trainer.image_encoder = ChannelMeans { dim: 4 };
        assert_eq!(trainer.evaluate(&batch).unwrap(), before);
    }

    #[test]
    fn test_save_text_encoder_tags_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints").join("text_encoder.json");
        let mut trainer = trainer(1e-3);
        trainer.step(1).unwrap();
        trainer.save_text_encoder(&path).unwrap();

        let hash = Vocabulary::characters().content_hash();
        let restored = CharCnnRnn::<TB>::load(&path, Some(hash.as_str()), &default_device()).unwrap();
        assert_eq!(
            restored.parameter_count(),
            trainer.text_encoder().parameter_count()
        );

        let batch = provider().get_next_batch(1).unwrap();
        let expected = trainer.evaluate(&batch).unwrap();
        let reloaded = Trainer::new(provider(), ChannelMeans { dim: 4 }, restored, adam(), 1e-3);
        assert!((reloaded.evaluate(&batch).unwrap() - expected).abs() < 1e-5);
    }
}
