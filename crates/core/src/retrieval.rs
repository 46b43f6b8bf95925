use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::models::{RetrievalOptions, ScoredChunk};
use crate::traits::VectorIndex;
use tracing::debug;

/// Embeds a question and returns its nearest chunks.
pub struct Retriever<E, V> {
    embedder: E,
    index: V,
    top_k: usize,
}

impl<E, V> Retriever<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    pub fn new(embedder: E, index: V, options: RetrievalOptions) -> Self {
        Self {
            embedder,
            index,
            top_k: options.top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>, PipelineError> {
        let query_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(PipelineError::Embedding)?;
        let hits = self.index.search(&query_vector, self.top_k).await?;

        debug!(top_k = self.top_k, hits = hits.len(), "retrieved context");
        Ok(hits)
    }
}
