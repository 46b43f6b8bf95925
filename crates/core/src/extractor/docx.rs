use super::{DocumentLoader, LoadedFile, TableExtraction, TableRows};
use crate::error::IngestError;
use crate::models::{Document, DocumentKind, DocumentMetadata};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BODY_ENTRY: &str = "word/document.xml";

/// Body paragraphs as one document, plus one document per table.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxLoader;

impl DocumentLoader for DocxLoader {
    fn load(&self, path: &Path, source: &str) -> Result<LoadedFile, IngestError> {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        let mut xml = String::new();
        archive.by_name(BODY_ENTRY)?.read_to_string(&mut xml)?;

        let body = parse_body(&xml)?;
        let mut loaded = LoadedFile::default();

        let text = body.paragraphs.join("\n");
        if !text.is_empty() {
            loaded.documents.push(Document::new(
                text,
                DocumentMetadata::new(source, DocumentKind::DocxText),
            ));
        }
        loaded.push_tables(source, DocumentKind::DocxTable, body.tables);

        Ok(loaded)
    }
}

#[derive(Debug)]
pub(crate) struct DocxBody {
    pub paragraphs: Vec<String>,
    pub tables: TableExtraction,
}

#[derive(Debug, Default)]
struct TableBuilder {
    rows: TableRows,
    row: Option<Vec<String>>,
    cell: Option<String>,
}

/// Walks the WordprocessingML body: `p` paragraphs, `t` runs and
/// `tbl`/`tr`/`tc` tables under whatever namespace prefix the producer chose.
/// CDATA sections inside runs are kept verbatim; comments and every other
/// element are skipped.
pub(crate) fn parse_body(xml: &str) -> Result<DocxBody, IngestError> {
    let token = Regex::new(concat!(
        r"(?s)<!\[CDATA\[(.*?)\]\]>",
        r"|<!--.*?-->",
        r"|<(/?)(?:[A-Za-z_][\w.-]*:)?(p|tbl|tr|tc|t|tab|br|cr)\b[^>]*?(/?)>",
        r"|<[^>]*>",
        r"|([^<]+)",
    ))?;

    let mut paragraphs = Vec::new();
    let mut tables = Vec::new();
    let mut open_tables: Vec<TableBuilder> = Vec::new();
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut table_error: Option<String> = None;

    for captures in token.captures_iter(xml) {
        if let Some(raw) = captures.get(1) {
            if in_text {
                paragraph.push_str(raw.as_str());
            }
            continue;
        }
        if let Some(text) = captures.get(5) {
            if in_text {
                paragraph.push_str(&unescape_xml(text.as_str()));
            }
            continue;
        }
        let Some(name) = captures.get(3).map(|m| m.as_str()) else {
            continue;
        };
        let closing = captures.get(2).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = captures.get(4).is_some_and(|m| !m.as_str().is_empty());

        match (name, closing, self_closing) {
            ("t", false, false) => in_text = true,
            ("t", true, _) => in_text = false,
            ("tab", false, _) => paragraph.push('\t'),
            ("br" | "cr", false, _) => paragraph.push('\n'),
            ("p", false, false) => paragraph.clear(),
            ("p", true, _) => {
                let finished = std::mem::take(&mut paragraph);
                if finished.trim().is_empty() {
                    continue;
                }
                if open_tables.is_empty() {
                    paragraphs.push(finished);
                } else if let Some(cell) = open_tables.last_mut().and_then(|table| table.cell.as_mut()) {
                    if !cell.is_empty() {
                        cell.push(' ');
                    }
                    cell.push_str(finished.trim());
                }
            }
            ("tbl", false, false) => open_tables.push(TableBuilder::default()),
            ("tbl", true, _) => match open_tables.pop() {
                Some(table) => {
                    if table.row.is_some() || table.cell.is_some() {
                        table_error.get_or_insert_with(|| "unterminated table row".to_string());
                    }
                    tables.push(table.rows);
                }
                None => {
                    table_error.get_or_insert_with(|| "table end without start".to_string());
                }
            },
            ("tr", false, false) => match open_tables.last_mut() {
                Some(table) => table.row = Some(Vec::new()),
                None => {
                    table_error.get_or_insert_with(|| "row outside of a table".to_string());
                }
            },
            ("tr", true, _) => {
                let closed = open_tables.last_mut().and_then(|table| {
                    let row = table.row.take()?;
                    table.rows.push(row);
                    Some(())
                });
                if closed.is_none() {
                    table_error.get_or_insert_with(|| "row end without start".to_string());
                }
            }
            ("tc", false, false) => match open_tables.last_mut() {
                Some(table) if table.row.is_some() => table.cell = Some(String::new()),
                _ => {
                    table_error.get_or_insert_with(|| "cell outside of a row".to_string());
                }
            },
            ("tc", true, _) => {
                let placed = open_tables.last_mut().is_some_and(|table| {
                    match (table.cell.take(), table.row.as_mut()) {
                        (Some(cell), Some(row)) => {
                            row.push(cell);
                            true
                        }
                        _ => false,
                    }
                });
                if !placed {
                    table_error.get_or_insert_with(|| "cell end without start".to_string());
                }
            }
            _ => {}
        }
    }

    if !open_tables.is_empty() {
        table_error.get_or_insert_with(|| "unterminated table".to_string());
    }

    let tables = match table_error {
        Some(reason) => TableExtraction::Failed(reason),
        None if tables.is_empty() => TableExtraction::NoneFound,
        None => TableExtraction::Found(tables),
    };

    Ok(DocxBody { paragraphs, tables })
}

fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(position) = rest.find('&') {
        out.push_str(&rest[..position]);
        rest = &rest[position..];
        let Some(end) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::FileOptions;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Season &amp; Playoffs</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t xml:space="preserve">The Lakers </w:t></w:r><w:r><w:t>won.</w:t></w:r></w:p>
<w:tbl><w:tblPr/><w:tr><w:tc><w:p><w:r><w:t>Team</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Wins</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>Lakers</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>52</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:p><w:r><w:t>After the table.</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn paragraphs_and_tables_are_separated() {
        let body = parse_body(BODY).unwrap();

        assert_eq!(
            body.paragraphs,
            vec!["Season & Playoffs", "The Lakers won.", "After the table."]
        );
        assert_eq!(
            body.tables,
            TableExtraction::Found(vec![vec![
                vec!["Team".to_string(), "Wins".to_string()],
                vec!["Lakers".to_string(), "52".to_string()],
            ]])
        );
    }

    #[test]
    fn unbalanced_table_reports_failure_but_keeps_text() {
        let xml = "<w:body><w:p><w:r><w:t>Intro</w:t></w:r></w:p><w:tbl><w:tr><w:tc></w:body>";
        let body = parse_body(xml).unwrap();

        assert_eq!(body.paragraphs, vec!["Intro"]);
        assert!(matches!(body.tables, TableExtraction::Failed(_)));
    }

    #[test]
    fn other_prefixes_and_cdata_are_read() {
        let xml = concat!(
            r#"<wx:document xmlns:wx="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><wx:body>"#,
            "<!-- <wx:p><wx:r><wx:t>hidden</wx:t></wx:r></wx:p> -->",
            "<wx:p><wx:r><wx:t><![CDATA[Lakers <3 & Celtics]]></wx:t></wx:r></wx:p>",
            "<wx:tbl><wx:tr><wx:tc><wx:p><wx:r><wx:t>MVP</wx:t></wx:r></wx:p></wx:tc></wx:tr></wx:tbl>",
            "</wx:body></wx:document>",
        );

        let body = parse_body(xml).unwrap();

        assert_eq!(body.paragraphs, vec!["Lakers <3 & Celtics"]);
        assert_eq!(body.tables, TableExtraction::Found(vec![vec![vec!["MVP".to_string()]]]));
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(unescape_xml("a &lt;b&gt; &#65;&#x42; &unknown; &"), "a <b> AB &unknown; &");
    }

    #[test]
    fn docx_archive_loads_text_and_tables() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("report.docx");
        let mut writer = zip::ZipWriter::new(File::create(&path)?);
        writer.start_file(BODY_ENTRY, FileOptions::default())?;
        writer.write_all(BODY.as_bytes())?;
        writer.finish()?;

        let loaded = DocxLoader.load(&path, "report.docx")?;

        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(loaded.documents[0].metadata.kind, DocumentKind::DocxText);
        assert_eq!(
            loaded.documents[0].content,
            "Season & Playoffs\nThe Lakers won.\nAfter the table."
        );
        assert_eq!(loaded.documents[1].metadata.kind, DocumentKind::DocxTable);
        assert_eq!(loaded.documents[1].metadata.table_index, Some(0));
        assert_eq!(loaded.documents[1].content, "Team    Wins\nLakers  52");
        Ok(())
    }

    #[test]
    fn archive_without_body_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.docx");
        let mut writer = zip::ZipWriter::new(File::create(&path)?);
        writer.start_file("other.xml", FileOptions::default())?;
        writer.write_all(b"<x/>")?;
        writer.finish()?;

        assert!(DocxLoader.load(&path, "empty.docx").is_err());
        Ok(())
    }
}
