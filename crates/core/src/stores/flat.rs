use crate::error::IndexError;
use crate::models::{Chunk, EmbeddingModelInfo, ScoredChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Exact cosine-similarity search over every stored vector.
///
/// Built once per ingestion run and read-only afterwards; a rebuild replaces
/// the whole index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    model: EmbeddingModelInfo,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    pub fn build(
        model: EmbeddingModelInfo,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::InvalidInput(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                if vector.len() != model.dimensions {
                    return Err(IndexError::DimensionMismatch {
                        expected: model.dimensions,
                        actual: vector.len(),
                    });
                }
                Ok(IndexEntry { chunk, vector })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { model, entries })
    }

    pub fn empty(model: EmbeddingModelInfo) -> Self {
        Self {
            model,
            entries: Vec::new(),
        }
    }

    pub fn model_info(&self) -> &EmbeddingModelInfo {
        &self.model
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    pub(crate) fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn search_vector(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query_vector.len() != self.model.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.model.dimensions,
                actual: query_vector.len(),
            });
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query_vector, &entry.vector)))
            .collect();

        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|left, right| descending_nan_last(left.1, right.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.search_vector(query_vector, k)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn model(&self) -> &EmbeddingModelInfo {
        &self.model
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut left_norm = 0f32;
    let mut right_norm = 0f32;
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    let denominator = left_norm.sqrt() * right_norm.sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

fn descending_nan_last(left: f32, right: f32) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
    }
}
