//! Batch sampling from a CUB-200-2011-style dataset.
//!
//! Each batch holds one randomly chosen image per class together with `n`
//! randomly chosen descriptions of that image:
//!
//! ```text
//! manifest → ClassCatalog ─┐
//! ImageSource ─────────────┼─→ SampleProvider::get_next_batch(n) → Batch
//! DescriptionStore ────────┤        (images, one-hot texts, labels)
//! Vocabulary ──────────────┘
//! ```
//!
//! Storage is reached through the [`ImageSource`] and [`DescriptionStore`]
//! traits. The file-system implementations read lazily on every call; the
//! in-memory ones in [`memory`] make sampling testable without a dataset.

pub mod catalog;
pub mod memory;
pub mod preprocess;
pub mod sampler;
pub mod source;
pub mod store;

use ndarray::{Array1, Array4, ArrayD, ArrayView3, ErrorKind, ShapeError};
use serde::{Deserialize, Serialize};

pub use catalog::{parse_label, ClassCatalog};
pub use memory::{MemoryDescriptionStore, MemoryImageSource};
pub use sampler::{CatalogSummary, SampleProvider, SamplerSettings};
pub use source::{DirectoryImageSource, ImageSource};
#[cfg(feature = "hdf5")]
pub use store::Hdf5DescriptionStore;
pub use store::{DescriptionStore, JsonDescriptionStore};

/// Description slots stored per image (`txt1`..`txt10`).
pub const MAX_DESCRIPTIONS: usize = 10;

/// On-disk format of per-image description files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionFormat {
    /// `<stem>.json` with keys `txt1`..`txt10`
    #[default]
    Json,
    /// `<stem>.h5` with datasets `txt1`..`txt10`
    Hdf5,
}

/// One aligned training batch.
///
/// Row `i` of `images`, `texts` and `labels` belongs to the same class.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[classes, 3, px, px]`, values in `[0, 1]`
    pub images: Array4<f32>,
    /// `[classes, vocab, cutoff]` for one description per class,
    /// `[classes, n, vocab, cutoff]` otherwise
    pub texts: ArrayD<f32>,
    /// Numeric class labels, `[classes]`
    pub labels: Array1<i64>,
    /// Descriptions drawn per class
    pub descriptions_per_class: usize,
}

impl Batch {
    /// Number of classes (rows) in the batch.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Texts with the description dimension merged into the batch dimension:
    /// `[classes * n, vocab, cutoff]`, descriptions of a class adjacent.
    pub fn flat_texts(&self) -> Result<ArrayView3<'_, f32>, ShapeError> {
        let shape = self.texts.shape();
        if shape.len() < 2 {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape));
        }
        let (vocab, cutoff) = (shape[shape.len() - 2], shape[shape.len() - 1]);
        let rows = self.len() * self.descriptions_per_class;
        self.texts
            .view()
            .into_shape_with_order((rows, vocab, cutoff))
    }
}
