use crate::error::{IndexError, ModelError, PipelineError};
use crate::models::{EmbeddingModelInfo, RagAnswer, ScoredChunk};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// At most `k` chunks, most similar first.
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding model the indexed vectors were produced with.
    fn model(&self) -> &EmbeddingModelInfo;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Answers one question end to end.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str) -> Result<RagAnswer, PipelineError>;
}

#[async_trait]
impl<V: VectorIndex + ?Sized> VectorIndex for Arc<V> {
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        (**self).search(query_vector, k).await
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn model(&self) -> &EmbeddingModelInfo {
        (**self).model()
    }
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).generate(prompt).await
    }
}
