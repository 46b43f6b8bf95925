use crate::error::IngestError;
use crate::models::{Chunk, Document, IngestionOptions};
use sha2::{Digest, Sha256};

/// Break points in order of preference; a break falls just after the separator.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        if max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({overlap_chars}) must be less than max_chars ({max_chars})"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_max_chars, value.chunk_overlap_chars)
    }
}

/// Splits `text` into overlapping windows and returns their char spans.
///
/// Every window holds at most `max_chars` chars and consecutive windows share
/// exactly `overlap_chars` chars, so `first + rest[overlap..]` rebuilds the input.
pub fn split_spans(text: &str, config: ChunkingConfig) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut spans = Vec::new();
    if total == 0 {
        return spans;
    }

    let mut start = 0;
    loop {
        if total - start <= config.max_chars {
            spans.push((start, total));
            break;
        }

        let end = find_break(&chars, start, config);
        spans.push((start, end));
        start = end - config.overlap_chars;
    }

    spans
}

fn find_break(chars: &[char], start: usize, config: ChunkingConfig) -> usize {
    let hard_end = start + config.max_chars;
    // Stay past the overlap so the next window starts later, and skip breaks
    // that would leave a window less than half full.
    let min_end = start + (config.overlap_chars + 1).max(config.max_chars / 2);

    for separator in SEPARATORS {
        let pattern: Vec<char> = separator.chars().collect();
        let found = (min_end..=hard_end)
            .rev()
            .find(|&end| end >= pattern.len() && chars[end - pattern.len()..end] == pattern[..]);
        if let Some(end) = found {
            return end;
        }
    }

    hard_end
}

pub fn chunk_document(document: &Document, config: ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = document.content.chars().collect();

    split_spans(&document.content, config)
        .into_iter()
        .enumerate()
        .map(|(ordinal, (start, end))| {
            let content: String = chars[start..end].iter().collect();
            Chunk {
                chunk_id: make_chunk_id(document, ordinal, &content),
                ordinal,
                start,
                end,
                content,
                metadata: document.metadata.clone(),
            }
        })
        .collect()
}

pub fn chunk_documents(documents: &[Document], config: ChunkingConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|document| chunk_document(document, config))
        .collect()
}

fn make_chunk_id(document: &Document, ordinal: usize, text: &str) -> String {
    let metadata = &document.metadata;
    let mut hasher = Sha256::new();
    hasher.update(metadata.source.as_bytes());
    hasher.update(metadata.kind.as_str().as_bytes());
    hasher.update(metadata.page.unwrap_or(0).to_le_bytes());
    hasher.update((metadata.table_index.map_or(0, |index| index + 1) as u64).to_le_bytes());
    hasher.update((metadata.row.map_or(0, |row| row + 1) as u64).to_le_bytes());
    hasher.update((ordinal as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
