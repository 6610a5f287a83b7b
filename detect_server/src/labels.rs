//! Class labels of the detection network.
//!
use std::{fs, path::Path};

use common::{PipelineError, Result};

use crate::bbox::{Candidate, Detection};

/// Class labels in network output order, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
    labels: Vec<String>,
}

impl ClassTable {
    /// Load labels from a file with one label per line.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| PipelineError::artifact(path, err))?;

        let table = Self::from_lines(&content);
        if table.is_empty() {
            return Err(PipelineError::artifact(path, "no class labels found"));
        }

        log::info!("Loaded {} class labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Build a table from text with one label per line.
    ///
    /// Surrounding whitespace is stripped, a trailing newline does not add a label.
    pub fn from_lines(content: &str) -> Self {
        Self {
            labels: content.lines().map(|line| line.trim().to_owned()).collect(),
        }
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    /// Attach the label of its class to a candidate.
    pub fn resolve(&self, candidate: Candidate) -> Result<Detection> {
        self.get(candidate.class_id)
            .map(|label| Detection::new(candidate, label))
            .ok_or_else(|| {
                PipelineError::InferenceError(format!(
                    "class id {} out of range for {} labels",
                    candidate.class_id,
                    self.len()
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ClassTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use crate::bbox::BBox;

    use super::*;

    #[test]
    fn test_load_labels() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "person\nbicycle\n  traffic light \n")?;

        let table = ClassTable::from_path(file.path())?;
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some("person"));
        assert_eq!(table.get(2), Some("traffic light"));
        assert_eq!(table.get(3), None);

        Ok(())
    }

    #[test]
    fn test_missing_or_empty_file_fails() {
        assert!(matches!(
            ClassTable::from_path("does/not/exist.names"),
            Err(PipelineError::ArtifactLoadError { .. })
        ));

        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            ClassTable::from_path(file.path()),
            Err(PipelineError::ArtifactLoadError { .. })
        ));
    }

    #[test]
    fn test_resolve() {
        let table: ClassTable = ["person", "car"].into_iter().collect();
        let candidate = Candidate {
            bbox: BBox::new(0, 0, 1, 1),
            confidence: 0.9,
            class_id: 1,
        };

        assert_eq!(table.resolve(candidate).unwrap().label, "car");
        assert!(matches!(
            table.resolve(Candidate {
                class_id: 2,
                ..candidate
            }),
            Err(PipelineError::InferenceError(_))
        ));
    }
}
