//! Per-class batch sampling.

use std::path::Path;

use ndarray::{s, Array1, Array4};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};

use super::catalog::ClassCatalog;
use super::preprocess::{image_to_tensor, CHANNELS};
use super::source::{DirectoryImageSource, ImageSource};
use super::store::{DescriptionStore, JsonDescriptionStore};
use super::{Batch, DescriptionFormat, MAX_DESCRIPTIONS};
use crate::config::DatasetConfig;
use crate::error::DatasetError;
use crate::vocabulary::Vocabulary;

/// Tensor geometry of sampled batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    /// Square size images are resized to
    pub image_px: u32,
    /// Time steps per description
    pub text_cutoff: usize,
}

/// Totals reported by [`SampleProvider::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogSummary {
    pub classes: usize,
    pub images: usize,
    pub descriptions: usize,
}

/// Draws aligned image/description batches, one image per class.
///
/// Nothing is cached: every batch lists class directories and reads files
/// again, so each draw is uniform over what is on disk at that moment.
pub struct SampleProvider {
    catalog: ClassCatalog,
    vocabulary: Vocabulary,
    images: Box<dyn ImageSource>,
    descriptions: Box<dyn DescriptionStore>,
    settings: SamplerSettings,
    rng: StdRng,
}

impl SampleProvider {
    /// Create a provider over injected storage, seeded from OS entropy.
    pub fn new(
        settings: SamplerSettings,
        catalog: ClassCatalog,
        vocabulary: Vocabulary,
        images: Box<dyn ImageSource>,
        descriptions: Box<dyn DescriptionStore>,
    ) -> Self {
        Self {
            catalog,
            vocabulary,
            images,
            descriptions,
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reseed the provider's sampler.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Open a dataset on disk as described by the configuration.
    ///
    /// Reads the class manifest only; images and descriptions are read when
    /// batches are drawn.
    pub fn open(
        config: &DatasetConfig,
        root: &Path,
        vocabulary: Vocabulary,
    ) -> Result<Self, DatasetError> {
        let catalog = ClassCatalog::load(&root.join(&config.manifest))?;
        let images = Box::new(DirectoryImageSource::new(
            root.join(&config.image_dir),
            config.supported_formats.clone(),
        ));
        let text_dir = root.join(&config.text_dir);
        let descriptions: Box<dyn DescriptionStore> = match config.text_format {
            DescriptionFormat::Json => Box::new(JsonDescriptionStore::new(text_dir)),
            #[cfg(feature = "hdf5")]
            DescriptionFormat::Hdf5 => Box::new(super::store::Hdf5DescriptionStore::new(text_dir)),
            #[cfg(not(feature = "hdf5"))]
            DescriptionFormat::Hdf5 => {
                return Err(DatasetError::FormatUnavailable("hdf5".to_string()))
            }
        };

        let settings = SamplerSettings {
            image_px: config.image_px,
            text_cutoff: config.text_cutoff,
        };
        let provider = Self::new(settings, catalog, vocabulary, images, descriptions);
        tracing::info!(
            "Dataset ready: {} classes, {} vocabulary ({} symbols), {}px images, {} steps",
            provider.catalog.len(),
            provider.vocabulary.level(),
            provider.vocabulary.len(),
            settings.image_px,
            settings.text_cutoff,
        );

        Ok(match config.seed {
            Some(seed) => provider.with_seed(seed),
            None => provider,
        })
    }

    /// The classes sampled from.
    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// The vocabulary descriptions are encoded with.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Tensor geometry of sampled batches.
    pub fn settings(&self) -> SamplerSettings {
        self.settings
    }

    /// Draw a batch with the provider's own random state.
    pub fn get_next_batch(&mut self, descriptions_per_class: usize) -> Result<Batch, DatasetError> {
        let mut rng = std::mem::replace(&mut self.rng, StdRng::seed_from_u64(0));
        let batch = self.get_next_batch_with(descriptions_per_class, &mut rng);
        self.rng = rng;
        batch
    }

    /// Draw a batch: one random image and `descriptions_per_class` distinct
    /// random descriptions of it for every class, classes in random order.
    pub fn get_next_batch_with<R: Rng + ?Sized>(
        &self,
        descriptions_per_class: usize,
        rng: &mut R,
    ) -> Result<Batch, DatasetError> {
        if descriptions_per_class == 0 || descriptions_per_class > MAX_DESCRIPTIONS {
            return Err(DatasetError::InvalidDescriptionCount {
                requested: descriptions_per_class,
                max: MAX_DESCRIPTIONS,
            });
        }

        let entries = self.catalog.entries();
        let classes = entries.len();
        let px = self.settings.image_px as usize;
        let cutoff = self.settings.text_cutoff;

        let mut images = Array4::<f32>::zeros((classes, CHANNELS, px, px));
        let mut texts =
            Array4::<f32>::zeros((classes, descriptions_per_class, self.vocabulary.len(), cutoff));
        let mut labels = Array1::<i64>::zeros(classes);

        let mut order: Vec<usize> = (0..classes).collect();
        order.shuffle(rng);

        for (row, &class_index) in order.iter().enumerate() {
            let entry = &entries[class_index];

            let file_names = self.images.list_images(&entry.id)?;
            let file_name = file_names
                .choose(rng)
                .ok_or_else(|| DatasetError::NoImages {
                    class_id: entry.id.clone(),
                })?;
            let slots: Vec<usize> = index::sample(rng, MAX_DESCRIPTIONS, descriptions_per_class)
                .iter()
                .map(|i| i + 1)
                .collect();

            let image = self.images.load_image(&entry.id, file_name)?;
            images
                .slice_mut(s![row, .., .., ..])
                .assign(&image_to_tensor(&image, self.settings.image_px));

            let stem = image_stem(file_name);
            let descriptions = self.descriptions.load_slots(&entry.id, stem, &slots)?;
            for (column, (codes, &slot)) in descriptions.iter().zip(&slots).enumerate() {
                let one_hot =
                    self.vocabulary
                        .encode(codes, cutoff)
                        .map_err(|source| DatasetError::Encode {
                            class_id: entry.id.clone(),
                            image: file_name.clone(),
                            slot,
                            source,
                        })?;
                texts.slice_mut(s![row, column, .., ..]).assign(&one_hot);
            }

            labels[row] = entry.label;
        }

        tracing::debug!(
            "Sampled batch: {} classes x {} descriptions",
            classes,
            descriptions_per_class
        );

        let texts = if descriptions_per_class == 1 {
            texts.index_axis_move(ndarray::Axis(1), 0).into_dyn()
        } else {
            texts.into_dyn()
        };

        Ok(Batch {
            images,
            texts,
            labels,
            descriptions_per_class,
        })
    }

    /// Check that every class has at least one image and that every image
    /// has all description slots, each encodable with the vocabulary.
    pub fn verify(&self) -> Result<CatalogSummary, DatasetError> {
        let slots: Vec<usize> = (1..=MAX_DESCRIPTIONS).collect();
        let mut summary = CatalogSummary::default();

        for entry in self.catalog.entries() {
            let file_names = self.images.list_images(&entry.id)?;
            if file_names.is_empty() {
                return Err(DatasetError::NoImages {
                    class_id: entry.id.clone(),
                });
            }
            for file_name in &file_names {
                let descriptions =
                    self.descriptions
                        .load_slots(&entry.id, image_stem(file_name), &slots)?;
                for (codes, &slot) in descriptions.iter().zip(&slots) {
                    self.vocabulary
                        .encode(codes, self.settings.text_cutoff)
                        .map_err(|source| DatasetError::Encode {
                            class_id: entry.id.clone(),
                            image: file_name.clone(),
                            slot,
                            source,
                        })?;
                }
                summary.descriptions += descriptions.len();
            }
            summary.images += file_names.len();
            summary.classes += 1;
            tracing::debug!("Verified {} ({} images)", entry.id, file_names.len());
        }

        tracing::info!(
            "Verified {} classes, {} images, {} descriptions",
            summary.classes,
            summary.images,
            summary.descriptions
        );
        Ok(summary)
    }
}

/// File name without its extension.
fn image_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
}
