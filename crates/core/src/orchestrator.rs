use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::models::{RagAnswer, RetrievalOptions};
use crate::prompt::build_prompt;
use crate::retrieval::Retriever;
use crate::traits::{Answerer, Generator, VectorIndex};
use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

/// Retrieve, prompt, generate. The generated text is returned verbatim.
pub struct RagPipeline<E, V, G>
where
    E: Embedder,
    V: VectorIndex,
    G: Generator,
{
    retriever: Retriever<E, V>,
    generator: G,
}

impl<E, V, G> RagPipeline<E, V, G>
where
    E: Embedder,
    V: VectorIndex,
    G: Generator,
{
    pub fn new(embedder: E, index: V, generator: G, options: RetrievalOptions) -> Self {
        Self {
            retriever: Retriever::new(embedder, index, options),
            generator,
        }
    }

    pub async fn run(&self, question: &str) -> Result<RagAnswer, PipelineError> {
        let started = Instant::now();

        let hits = self.retriever.retrieve(question).await?;
        let contexts: Vec<String> = hits.into_iter().map(|hit| hit.chunk.content).collect();

        let prompt = build_prompt(&contexts, question);

        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(PipelineError::Generation)?;

        info!(
            contexts = contexts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "question answered"
        );
        Ok(RagAnswer { answer, contexts })
    }
}

#[async_trait]
impl<E, V, G> Answerer for RagPipeline<E, V, G>
where
    E: Embedder,
    V: VectorIndex,
    G: Generator,
{
    async fn answer(&self, question: &str) -> Result<RagAnswer, PipelineError> {
        self.run(question).await
    }
}
