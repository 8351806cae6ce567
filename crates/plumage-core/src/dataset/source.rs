//! Image access for batch sampling.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use walkdir::WalkDir;

use crate::error::DatasetError;

/// Read access to the images of each class.
pub trait ImageSource: Send + Sync {
    /// File names of the images available for a class.
    fn list_images(&self, class_id: &str) -> Result<Vec<String>, DatasetError>;

    /// Decode one image of a class.
    fn load_image(&self, class_id: &str, file_name: &str) -> Result<DynamicImage, DatasetError>;
}

/// Images laid out as `<dir>/<class_id>/<file_name>`.
///
/// Directories are listed again on every call.
pub struct DirectoryImageSource {
    dir: PathBuf,
    supported_formats: Vec<String>,
}

impl DirectoryImageSource {
    /// Create a source rooted at the image directory.
    pub fn new(dir: PathBuf, supported_formats: Vec<String>) -> Self {
        Self {
            dir,
            supported_formats,
        }
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

impl ImageSource for DirectoryImageSource {
    fn list_images(&self, class_id: &str) -> Result<Vec<String>, DatasetError> {
        let class_dir = self.dir.join(class_id);
        if !class_dir.is_dir() {
            return Err(DatasetError::ClassDirectory {
                path: class_dir,
                message: "not a directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&class_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = entry.map_err(|e| DatasetError::ClassDirectory {
                path: class_dir.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if !path.is_file() || !self.is_supported(path) {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) => files.push(name.to_string()),
                None => tracing::warn!("Skipping non UTF-8 file name {:?}", path),
            }
        }

        // Sort for deterministic ordering under a seeded sampler
        files.sort();
        Ok(files)
    }

    fn load_image(&self, class_id: &str, file_name: &str) -> Result<DynamicImage, DatasetError> {
        let path = self.dir.join(class_id).join(file_name);
        let decode_error = |message: String| DatasetError::Decode {
            path: path.clone(),
            message,
        };

        image::ImageReader::open(&path)
            .map_err(|e| decode_error(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| decode_error(format!("Cannot detect image format: {e}")))?
            .decode()
            .map_err(|e| decode_error(e.to_string()))
    }
}
