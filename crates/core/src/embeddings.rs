use crate::error::ModelError;
use crate::models::EmbeddingModelInfo;
use crate::policy::CallPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps text to fixed-length vectors.
///
/// The same model must embed the indexed chunks and the incoming questions;
/// [`Embedder::model_info`] is what the index snapshot records to check that.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn model_info(&self) -> EmbeddingModelInfo {
        EmbeddingModelInfo {
            model_id: self.model_id().to_string(),
            dimensions: self.dimensions(),
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Malformed {
                backend: self.model_id().to_string(),
                details: "no embedding returned".to_string(),
            })
    }
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        (**self).embed_batch(texts).await
    }
}

/// Hashed character-trigram vectors; deterministic and offline.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl CharacterNgramEmbedder {
    pub const MODEL_ID: &'static str = "char-trigram";

    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        Self::MODEL_ID
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Sentence embeddings from an Ollama-compatible `/api/embed` endpoint.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: usize,
    policy: CallPolicy,
}

impl OllamaEmbedder {
    pub const BACKEND: &'static str = "ollama-embed";

    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        policy: CallPolicy,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            client: Client::new(),
            endpoint: service_url(base_url, "api/embed")?,
            model: model.into(),
            dimensions,
            policy,
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: Self::BACKEND.to_string(),
                status: status.as_u16(),
                details,
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(ModelError::Malformed {
                backend: Self::BACKEND.to_string(),
                details: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }
        if let Some(vector) = parsed
            .embeddings
            .iter()
            .find(|vector| vector.len() != self.dimensions)
        {
            return Err(ModelError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");
        self.policy.run(Self::BACKEND, || self.request(texts)).await
    }
}

/// Joins `path` onto a service base URL, keeping any path prefix of the base.
pub(crate) fn service_url(base_url: &str, path: &str) -> Result<Url, ModelError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join(path)?)
}
