//! Description storage keyed by (class, image, slot).
//!
//! Each image has up to ten descriptions stored as arrays of character codes
//! under the names `txt1`..`txt10`, in a file named after the image.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::DatasetError;

/// Read access to stored descriptions.
pub trait DescriptionStore: Send + Sync {
    /// Character codes of description `slot` (1-based) of an image.
    fn load(&self, class_id: &str, image_stem: &str, slot: usize) -> Result<Vec<u32>, DatasetError>;

    /// Character codes of several slots of the same image, in the given order.
    fn load_slots(
        &self,
        class_id: &str,
        image_stem: &str,
        slots: &[usize],
    ) -> Result<Vec<Vec<u32>>, DatasetError> {
        slots
            .iter()
            .map(|&slot| self.load(class_id, image_stem, slot))
            .collect()
    }
}

/// Name of a description slot inside a description file.
pub(crate) fn slot_key(slot: usize) -> String {
    format!("txt{slot}")
}

/// Convert stored numeric codes to character codes.
///
/// Fractional parts are truncated.
fn codes_from_numbers(values: &[f64]) -> Result<Vec<u32>, String> {
    values
        .iter()
        .map(|&v| {
            if v.is_finite() && v >= 0.0 && v <= u32::MAX as f64 {
                Ok(v as u32)
            } else {
                Err(format!("invalid character code {v}"))
            }
        })
        .collect()
}

/// Descriptions stored as `<dir>/<class_id>/<image_stem>.json`.
///
/// Each file is an object mapping `txt1`..`txt10` to arrays of character codes.
pub struct JsonDescriptionStore {
    dir: PathBuf,
}

impl JsonDescriptionStore {
    /// Create a store rooted at the description directory.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn read_file(
        &self,
        class_id: &str,
        image_stem: &str,
        slot: usize,
    ) -> Result<HashMap<String, Vec<f64>>, DatasetError> {
        let path = self
            .dir
            .join(class_id)
            .join(format!("{image_stem}.json"));
        let error = |message: String| DatasetError::Description {
            class_id: class_id.to_string(),
            image: image_stem.to_string(),
            slot,
            message,
        };
        let content =
            std::fs::read_to_string(&path).map_err(|e| error(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content).map_err(|e| error(format!("{}: {e}", path.display())))
    }
}

impl DescriptionStore for JsonDescriptionStore {
    fn load(&self, class_id: &str, image_stem: &str, slot: usize) -> Result<Vec<u32>, DatasetError> {
        self.load_slots(class_id, image_stem, &[slot])
            .map(|mut codes| codes.swap_remove(0))
    }

    fn load_slots(
        &self,
        class_id: &str,
        image_stem: &str,
        slots: &[usize],
    ) -> Result<Vec<Vec<u32>>, DatasetError> {
        let Some(&first) = slots.first() else {
            return Ok(Vec::new());
        };
        let file = self.read_file(class_id, image_stem, first)?;

        slots
            .iter()
            .map(|&slot| {
                let error = |message: String| DatasetError::Description {
                    class_id: class_id.to_string(),
                    image: image_stem.to_string(),
                    slot,
                    message,
                };
                let values = file
                    .get(&slot_key(slot))
                    .ok_or_else(|| error(format!("no {} entry", slot_key(slot))))?;
                codes_from_numbers(values).map_err(error)
            })
            .collect()
    }
}

/// Descriptions stored as `<dir>/<class_id>/<image_stem>.h5` with one
/// dataset per slot.
#[cfg(feature = "hdf5")]
pub struct Hdf5DescriptionStore {
    dir: PathBuf,
}

#[cfg(feature = "hdf5")]
impl Hdf5DescriptionStore {
    /// Create a store rooted at the description directory.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[cfg(feature = "hdf5")]
impl DescriptionStore for Hdf5DescriptionStore {
    fn load(&self, class_id: &str, image_stem: &str, slot: usize) -> Result<Vec<u32>, DatasetError> {
        self.load_slots(class_id, image_stem, &[slot])
            .map(|mut codes| codes.swap_remove(0))
    }

    fn load_slots(
        &self,
        class_id: &str,
        image_stem: &str,
        slots: &[usize],
    ) -> Result<Vec<Vec<u32>>, DatasetError> {
        let path = self.dir.join(class_id).join(format!("{image_stem}.h5"));
        let error = |slot: usize, message: String| DatasetError::Description {
            class_id: class_id.to_string(),
            image: image_stem.to_string(),
            slot,
            message,
        };

        let first = slots.first().copied().unwrap_or(1);
        let file = hdf5::File::open(&path)
            .map_err(|e| error(first, format!("{}: {e}", path.display())))?;

        slots
            .iter()
            .map(|&slot| {
                let values: Vec<f64> = file
                    .dataset(&slot_key(slot))
                    .and_then(|dataset| dataset.read_raw::<f64>())
                    .map_err(|e| error(slot, e.to_string()))?;
                codes_from_numbers(&values).map_err(|message| error(slot, message))
            })
            .collect()
    }
}
