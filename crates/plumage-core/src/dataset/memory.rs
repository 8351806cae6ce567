//! In-memory image and description storage.
//!
//! Used to drive [`SampleProvider`](super::SampleProvider) deterministically
//! in tests and benchmarks without a dataset on disk.

use std::collections::HashMap;
use std::path::PathBuf;

use image::DynamicImage;

use super::source::ImageSource;
use super::store::{slot_key, DescriptionStore};
use crate::error::DatasetError;

/// Images held in memory, grouped by class.
#[derive(Default)]
pub struct MemoryImageSource {
    classes: HashMap<String, Vec<(String, DynamicImage)>>,
}

impl MemoryImageSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image to a class. Listing keeps insertion order.
    pub fn insert(&mut self, class_id: &str, file_name: &str, image: DynamicImage) {
        self.classes
            .entry(class_id.to_string())
            .or_default()
            .push((file_name.to_string(), image));
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_image(mut self, class_id: &str, file_name: &str, image: DynamicImage) -> Self {
        self.insert(class_id, file_name, image);
        self
    }
}

impl ImageSource for MemoryImageSource {
    fn list_images(&self, class_id: &str) -> Result<Vec<String>, DatasetError> {
        self.classes
            .get(class_id)
            .map(|images| images.iter().map(|(name, _)| name.clone()).collect())
            .ok_or_else(|| DatasetError::ClassDirectory {
                path: PathBuf::from(class_id),
                message: "class not present".to_string(),
            })
    }

    fn load_image(&self, class_id: &str, file_name: &str) -> Result<DynamicImage, DatasetError> {
        self.classes
            .get(class_id)
            .and_then(|images| images.iter().find(|(name, _)| name == file_name))
            .map(|(_, image)| image.clone())
            .ok_or_else(|| DatasetError::Decode {
                path: PathBuf::from(class_id).join(file_name),
                message: "image not present".to_string(),
            })
    }
}

/// Descriptions held in memory, keyed by (class, image stem, slot).
#[derive(Default)]
pub struct MemoryDescriptionStore {
    entries: HashMap<(String, String, usize), Vec<u32>>,
}

impl MemoryDescriptionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store character codes for a slot.
    pub fn insert(&mut self, class_id: &str, image_stem: &str, slot: usize, codes: Vec<u32>) {
        self.entries
            .insert((class_id.to_string(), image_stem.to_string(), slot), codes);
    }

    /// Store a description given as text.
    pub fn insert_text(&mut self, class_id: &str, image_stem: &str, slot: usize, text: &str) {
        self.insert(
            class_id,
            image_stem,
            slot,
            text.chars().map(u32::from).collect(),
        );
    }
}

impl DescriptionStore for MemoryDescriptionStore {
    fn load(&self, class_id: &str, image_stem: &str, slot: usize) -> Result<Vec<u32>, DatasetError> {
        self.entries
            .get(&(class_id.to_string(), image_stem.to_string(), slot))
            .cloned()
            .ok_or_else(|| DatasetError::Description {
                class_id: class_id.to_string(),
                image: image_stem.to_string(),
                slot,
                message: format!("no {} entry", slot_key(slot)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_image_source_lists_in_insertion_order() {
        let source = MemoryImageSource::new()
            .with_image("001.A", "z.jpg", DynamicImage::new_rgb8(2, 2))
            .with_image("001.A", "a.jpg", DynamicImage::new_rgb8(2, 2));

        assert_eq!(source.list_images("001.A").unwrap(), vec!["z.jpg", "a.jpg"]);
        assert!(source.load_image("001.A", "a.jpg").is_ok());
        assert!(source.load_image("001.A", "b.jpg").is_err());
        assert!(source.list_images("002.B").is_err());
    }

    #[test]
    fn test_memory_description_store() {
        let mut store = MemoryDescriptionStore::new();
        store.insert_text("001.A", "a", 3, "red");

        assert_eq!(store.load("001.A", "a", 3).unwrap(), vec![114, 101, 100]);
        assert!(store.load("001.A", "a", 4).is_err());
    }
}
