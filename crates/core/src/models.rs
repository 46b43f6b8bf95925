use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "pdf_page")]
    PdfPage,
    #[serde(rename = "pdf_table")]
    PdfTable,
    #[serde(rename = "docx_text")]
    DocxText,
    #[serde(rename = "docx_table")]
    DocxTable,
    #[serde(rename = "csv")]
    CsvRow,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::PdfPage => "pdf_page",
            DocumentKind::PdfTable => "pdf_table",
            DocumentKind::DocxText => "docx_text",
            DocumentKind::DocxTable => "docx_table",
            DocumentKind::CsvRow => "csv",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance carried from a loaded document onto every chunk cut from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// File name of the input the document was loaded from.
    pub source: String,
    pub kind: DocumentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl DocumentMetadata {
    pub fn new(source: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            source: source.into(),
            kind,
            page: None,
            table_index: None,
            row: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_table_index(mut self, index: usize) -> Self {
        self.table_index = Some(index);
        self
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// A window of a normalized document; `start..end` are char offsets into it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub ordinal: usize,
    pub start: usize,
    pub end: usize,
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// Lowercase, collapse whitespace runs, trim.
    #[default]
    Standard,
    /// Standard, plus drop everything outside `[a-z0-9.,:/ ]`.
    Strict,
}

impl std::str::FromStr for NormalizationPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError(format!(
                "unknown normalization policy '{other}' (expected 'standard' or 'strict')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub normalization: NormalizationPolicy,
    pub embed_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 700,
            chunk_overlap_chars: 150,
            normalization: NormalizationPolicy::Standard,
            embed_batch_size: 32,
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_max_chars == 0 {
            return Err(ConfigError("chunk_max_chars must be greater than zero".to_string()));
        }
        if self.chunk_overlap_chars >= self.chunk_max_chars {
            return Err(ConfigError(format!(
                "chunk_overlap_chars ({}) must be less than chunk_max_chars ({})",
                self.chunk_overlap_chars, self.chunk_max_chars
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(ConfigError("embed_batch_size must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl RetrievalOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError("top_k must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Identity of the embedding model an index was built with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingModelInfo {
    pub model_id: String,
    pub dimensions: usize,
}

impl fmt::Display for EmbeddingModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.model_id, self.dimensions)
    }
}

/// Answer plus the context passages it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub contexts: Vec<String>,
}

pub(crate) fn non_zero_duration(name: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError(format!("{name} must be greater than zero")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ingestion_options_are_valid() {
        assert!(IngestionOptions::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let options = IngestionOptions {
            chunk_max_chars: 100,
            chunk_overlap_chars: 100,
            ..IngestionOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(RetrievalOptions { top_k: 0 }.validate().is_err());
    }

    #[test]
    fn normalization_policy_parses_case_insensitively() {
        assert_eq!("Strict".parse::<NormalizationPolicy>().ok(), Some(NormalizationPolicy::Strict));
        assert!("loose".parse::<NormalizationPolicy>().is_err());
    }

    #[test]
    fn document_kind_serializes_with_type_tags() {
        let json = serde_json::to_string(&DocumentKind::CsvRow).unwrap();
        assert_eq!(json, "\"csv\"");
        assert_eq!(DocumentKind::PdfTable.to_string(), "pdf_table");
    }
}
