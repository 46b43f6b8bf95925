use super::{DocumentLoader, LoadedFile};
use crate::error::IngestError;
use crate::models::{Document, DocumentKind, DocumentMetadata};
use std::fs;
use std::path::Path;

/// Plain UTF-8 text: the whole file is one document.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path, source: &str) -> Result<LoadedFile, IngestError> {
        let content = fs::read_to_string(path)?;
        Ok(LoadedFile {
            documents: vec![Document::new(
                content,
                DocumentMetadata::new(source, DocumentKind::Text),
            )],
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn text_file_loads_verbatim() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("test_file.txt");
        fs::write(&path, "Test content for ingestion.")?;

        let loaded = TextLoader.load(&path, "test_file.txt")?;

        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.documents[0].content, "Test content for ingestion.");
        assert_eq!(loaded.documents[0].metadata.source, "test_file.txt");
        assert_eq!(loaded.documents[0].metadata.kind, DocumentKind::Text);
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("binary.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0xc3])?;

        assert!(TextLoader.load(&path, "binary.txt").is_err());
        Ok(())
    }
}
