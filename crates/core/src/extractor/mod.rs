//! Per-format document loaders.
//!
//! Each loader turns one file into zero or more [`Document`]s. Problems that
//! lose part of a file (a table that could not be read, a page without text)
//! are reported as [`IngestWarning`]s next to whatever was recovered; problems
//! that lose the whole file are returned as [`IngestError`]s.

mod delimited;
mod docx;
mod pdf;
mod table;
mod text;

pub use delimited::CsvLoader;
pub use docx::DocxLoader;
pub use pdf::{detect_text_tables, PdfLoader};
pub use table::render_table;
pub use text::TextLoader;

use crate::error::IngestError;
use crate::models::{Document, DocumentKind, DocumentMetadata};
use serde::Serialize;
use std::path::Path;
use tracing::warn;

pub type TableRows = Vec<Vec<String>>;

/// Outcome of looking for tables in a file.
#[derive(Debug, Clone, PartialEq)]
pub enum TableExtraction {
    Found(Vec<TableRows>),
    NoneFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestWarning {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct LoadedFile {
    pub documents: Vec<Document>,
    pub warnings: Vec<IngestWarning>,
}

impl LoadedFile {
    fn warn(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(source = %source, message = %message, "partial extraction");
        self.warnings.push(IngestWarning {
            source: source.to_string(),
            message,
        });
    }

    /// Adds one document per extracted table, or a warning when extraction failed.
    fn push_tables(&mut self, source: &str, kind: DocumentKind, tables: TableExtraction) {
        match tables {
            TableExtraction::Found(tables) => {
                for (index, rows) in tables.iter().enumerate() {
                    let rendered = render_table(rows);
                    if rendered.trim().is_empty() {
                        continue;
                    }
                    self.documents.push(Document::new(
                        rendered,
                        DocumentMetadata::new(source, kind).with_table_index(index),
                    ));
                }
            }
            TableExtraction::NoneFound => {}
            TableExtraction::Failed(reason) => {
                self.warn(source, format!("table extraction unavailable: {reason}"));
            }
        }
    }
}

pub trait DocumentLoader {
    /// Loads `path`; `source` is the file name recorded on every document.
    fn load(&self, path: &Path, source: &str) -> Result<LoadedFile, IngestError>;
}

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "pdf", "docx", "csv"];

pub fn loader_for(path: &Path) -> Option<Box<dyn DocumentLoader>> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "txt" => Some(Box::new(TextLoader)),
        "pdf" => Some(Box::new(PdfLoader)),
        "docx" => Some(Box::new(DocxLoader)),
        "csv" => Some(Box::new(CsvLoader)),
        _ => None,
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Loads a single file with the loader matching its extension.
///
/// Returns `Ok(None)` for unsupported extensions.
pub fn load_file(path: &Path) -> Result<Option<LoadedFile>, IngestError> {
    let Some(loader) = loader_for(path) else {
        return Ok(None);
    };

    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    loader.load(path, source).map(Some)
}
