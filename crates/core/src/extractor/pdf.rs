use super::{DocumentLoader, LoadedFile, TableExtraction, TableRows};
use crate::error::IngestError;
use crate::models::{Document, DocumentKind, DocumentMetadata};
use lopdf::Document as PdfDocument;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// One document per page with text, plus one per table detected in the page text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path, source: &str) -> Result<LoadedFile, IngestError> {
        let document =
            PdfDocument::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let pages = document
            .get_pages()
            .into_keys()
            .map(|page_no| {
                let text = document
                    .extract_text(&[page_no])
                    .map_err(|error| error.to_string());
                (page_no, text)
            })
            .collect::<Vec<_>>();

        assemble_pages(path, source, pages)
    }
}

/// Turns per-page extraction results into page and table documents.
///
/// A page whose text could not be extracted yields a single warning; its
/// tables are not looked for separately.
fn assemble_pages(
    path: &Path,
    source: &str,
    pages: Vec<(u32, Result<String, String>)>,
) -> Result<LoadedFile, IngestError> {
    let mut loaded = LoadedFile::default();
    let mut tables = Vec::new();
    let mut failed_pages = Vec::new();

    for (page_no, text) in pages {
        let text = match text {
            Ok(text) => text,
            Err(error) => {
                failed_pages.push(format!("page {page_no}: {error}"));
                continue;
            }
        };

        if text.trim().is_empty() {
            debug!(source = %source, page = page_no, "page has no extractable text");
            continue;
        }

        tables.extend(detect_text_tables(&text)?);
        loaded.documents.push(Document::new(
            text,
            DocumentMetadata::new(source, DocumentKind::PdfPage).with_page(page_no),
        ));
    }

    if loaded.documents.is_empty() {
        let reason = if failed_pages.is_empty() {
            "pdf had no readable page text".to_string()
        } else {
            failed_pages.join("; ")
        };
        return Err(IngestError::PdfParse(format!("{reason}: {}", path.display())));
    }

    for failure in &failed_pages {
        loaded.warn(
            source,
            format!("text extraction failed for {failure}; its text and tables were skipped"),
        );
    }

    let extraction = if tables.is_empty() {
        TableExtraction::NoneFound
    } else {
        TableExtraction::Found(tables)
    };
    loaded.push_tables(source, DocumentKind::PdfTable, extraction);

    Ok(loaded)
}

/// Finds runs of two or more consecutive lines that split into the same
/// number (at least two) of cells on tabs or wide spacing.
pub fn detect_text_tables(text: &str) -> Result<Vec<TableRows>, IngestError> {
    let separator = Regex::new(r"\t+| {2,}")?;
    let mut tables = Vec::new();
    let mut current: TableRows = Vec::new();

    let flush = |current: &mut TableRows, tables: &mut Vec<TableRows>| {
        if current.len() >= 2 {
            tables.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for line in text.lines() {
        let cells: Vec<String> = separator
            .split(line.trim())
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect();

        if cells.len() < 2 {
            flush(&mut current, &mut tables);
            continue;
        }

        if current.first().is_some_and(|row| row.len() != cells.len()) {
            flush(&mut current, &mut tables);
        }
        current.push(cells);
    }
    flush(&mut current, &mut tables);

    Ok(tables)
}
