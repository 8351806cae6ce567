//! Class catalog read from the dataset manifest.

use std::path::Path;

use crate::error::DatasetError;

/// A class identifier and its numeric label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// Directory name shared by the image and description trees, e.g. `023.Brandt_Cormorant`
    pub id: String,
    /// Numeric prefix of `id`
    pub label: i64,
}

/// Ordered list of the classes a dataset samples from.
#[derive(Debug, Clone)]
pub struct ClassCatalog {
    entries: Vec<ClassEntry>,
}

impl ClassCatalog {
    /// Read a manifest with one class identifier per line.
    ///
    /// Blank lines are skipped. Every identifier must carry a numeric label.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let content = std::fs::read_to_string(path).map_err(|e| DatasetError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let catalog = Self::from_ids(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )?;
        if catalog.is_empty() {
            return Err(DatasetError::EmptyCatalog(path.to_path_buf()));
        }

        tracing::info!("Loaded {} classes from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// Build a catalog from class identifiers, keeping their order.
    pub fn from_ids<I, S>(ids: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                let label = parse_label(&id)?;
                Ok(ClassEntry { id, label })
            })
            .collect::<Result<Vec<_>, DatasetError>>()?;
        Ok(Self { entries })
    }

    /// All classes in manifest order.
    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse the numeric label in front of the first `.` of a class identifier.
///
/// `"023.some_bird_name"` → `23`.
pub fn parse_label(class_id: &str) -> Result<i64, DatasetError> {
    let prefix = class_id.split('.').next().unwrap_or_default();
    prefix
        .parse::<i64>()
        .map_err(|_| DatasetError::MalformedClassId {
            class_id: class_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("023.some_bird_name").unwrap(), 23);
        assert_eq!(parse_label("200.Common_Yellowthroat").unwrap(), 200);
        assert_eq!(parse_label("7").unwrap(), 7);
    }

    #[test]
    fn test_parse_label_rejects_missing_number() {
        assert!(matches!(
            parse_label("Black_footed_Albatross"),
            Err(DatasetError::MalformedClassId { .. })
        ));
        assert!(parse_label(".001").is_err());
        assert!(parse_label("").is_err());
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let mut manifest = tempfile::NamedTempFile::new().unwrap();
        writeln!(manifest, "001.Black_footed_Albatross").unwrap();
        writeln!(manifest).unwrap();
        writeln!(manifest, "023.Brandt_Cormorant  ").unwrap();
        writeln!(manifest).unwrap();

        let catalog = ClassCatalog::load(manifest.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.entries()[0].id, "001.Black_footed_Albatross");
        assert_eq!(catalog.entries()[1].id, "023.Brandt_Cormorant");
        assert_eq!(catalog.entries()[1].label, 23);
    }

    #[test]
    fn test_load_rejects_malformed_line() {
        let mut manifest = tempfile::NamedTempFile::new().unwrap();
        writeln!(manifest, "001.Black_footed_Albatross").unwrap();
        writeln!(manifest, "cormorant").unwrap();

        let err = ClassCatalog::load(manifest.path()).unwrap_err();
        assert!(err.to_string().contains("cormorant"));
    }

    #[test]
    fn test_load_rejects_empty_manifest() {
        let manifest = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            ClassCatalog::load(manifest.path()),
            Err(DatasetError::EmptyCatalog(_))
        ));
    }

    #[test]
    fn test_load_missing_manifest() {
        let err = ClassCatalog::load(Path::new("/nonexistent/classes.txt")).unwrap_err();
        assert!(matches!(err, DatasetError::Manifest { .. }));
    }
}
