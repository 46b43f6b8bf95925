use super::{DocumentLoader, LoadedFile};
use crate::error::IngestError;
use crate::models::{Document, DocumentKind, DocumentMetadata};
use std::path::Path;

/// One document per data row, rendered as `column: value` pairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvLoader;

impl DocumentLoader for CsvLoader {
    fn load(&self, path: &Path, source: &str) -> Result<LoadedFile, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut loaded = LoadedFile::default();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            if record.iter().all(|value| value.is_empty()) {
                continue;
            }

            let content = record
                .iter()
                .enumerate()
                .map(|(column, value)| {
                    let name = headers
                        .get(column)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("column_{column}"));
                    format!("{name}: {value}")
                })
                .collect::<Vec<_>>()
                .join(", ");

            loaded.documents.push(Document::new(
                content,
                DocumentMetadata::new(source, DocumentKind::CsvRow).with_row(row),
            ));
        }

        Ok(loaded)
    }
}
