use crate::embeddings::service_url;
use crate::error::ModelError;
use crate::policy::CallPolicy;
use crate::traits::Generator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Single non-streaming completion from an Ollama-compatible `/api/generate`.
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
    policy: CallPolicy,
}

impl OllamaGenerator {
    pub const BACKEND: &'static str = "ollama-generate";

    pub fn new(base_url: &str, model: impl Into<String>, policy: CallPolicy) -> Result<Self, ModelError> {
        Ok(Self {
            client: Client::new(),
            endpoint: service_url(base_url, "api/generate")?,
            model: model.into(),
            temperature: 0.0,
            policy,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, prompt: &str) -> Result<String, ModelError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: self.temperature,
                },
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

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "generating answer");
        self.policy.run(Self::BACKEND, || self.request(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails the first `failures` calls with 503, then echoes the request settings.
    async fn spawn_generate_server(failures: u32) -> (String, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().route(
            "/api/generate",
            post(move |Json(body): Json<Value>| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < failures {
                        return Err(StatusCode::SERVICE_UNAVAILABLE);
                    }
                    Ok(Json(json!({
                        "model": body["model"],
                        "response": format!(
                            "stream={} temperature={}",
                            body["stream"], body["options"]["temperature"]
                        ),
                        "done": true,
                    })))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{address}"), calls)
    }

    fn policy(max_retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(5),
            max_retries,
            retry_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn sends_deterministic_non_streaming_request() {
        let (base, calls) = spawn_generate_server(0).await;
        let generator = OllamaGenerator::new(&base, "llama3.1", policy(1)).unwrap();

        let text = generator.generate("prompt").await.unwrap();

        assert_eq!(text, "stream=false temperature=0.0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_backend_is_retried_once() {
        let (base, calls) = spawn_generate_server(1).await;
        let generator = OllamaGenerator::new(&base, "llama3.1", policy(1)).unwrap();

        assert!(generator.generate("prompt").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_failure_surfaces_status() {
        let (base, calls) = spawn_generate_server(10).await;
        let generator = OllamaGenerator::new(&base, "llama3.1", policy(1)).unwrap();

        let result = generator.generate("prompt").await;

        assert!(matches!(
            result,
            Err(ModelError::BackendResponse { status: 503, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
