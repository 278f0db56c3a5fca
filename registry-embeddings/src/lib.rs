//! Text → vector embeddings (spec §4.C1): one small trait, two backends
//! selected by configuration, mirroring the mock/live split the teacher
//! uses for its model router.

use async_trait::async_trait;
use registry_types::{GatewayError, GatewayResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// `encode` is pure and batch-friendly: it must not mutate its input and
/// must return one vector per input text, in order.
#[async_trait]
pub trait EmbeddingsClient: Send + Sync {
    async fn encode(&self, texts: &[String]) -> GatewayResult<Vec<Vec<f32>>>;
    /// The embedding length this client currently produces. May change at
    /// runtime if a backend's actual output disagrees with how it was
    /// configured (spec §4.C1: the actual dimension always wins).
    fn dimension(&self) -> usize;
}

/// Deterministic local backend: feature-hashes tokens into a fixed-size
/// vector. No network calls, no model weights — stands in for an on-box
/// transformer without pulling an ML runtime into the dependency graph.
pub struct LocalEmbeddingsClient {
    dimension: usize,
}

impl LocalEmbeddingsClient {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        for token in text.split_whitespace() {
            let mut hash: u64 = 1469598103934665603;
            for byte in token.as_bytes() {
                hash ^= *byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash as usize) % self.dimension;
            let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingsClient for LocalEmbeddingsClient {
    async fn encode(&self, texts: &[String]) -> GatewayResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.hash_embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Remote LLM-gateway backend. Falls back to [`LocalEmbeddingsClient`] when
/// no endpoint/key is configured, matching the teacher's
/// mock-unless-configured model router shape.
pub struct RemoteLlmEmbeddingsClient {
    endpoint: Option<String>,
    api_key: Option<String>,
    dimension: AtomicUsize,
    http: reqwest::Client,
    fallback: LocalEmbeddingsClient,
}

const ENV_EMBEDDINGS_API_URL: &str = "GATEWAY_EMBEDDINGS_API_URL";
const ENV_EMBEDDINGS_API_KEY: &str = "GATEWAY_EMBEDDINGS_API_KEY";

impl RemoteLlmEmbeddingsClient {
    pub fn from_env(configured_dimension: usize) -> Self {
        Self {
            endpoint: std::env::var(ENV_EMBEDDINGS_API_URL).ok(),
            api_key: std::env::var(ENV_EMBEDDINGS_API_KEY).ok(),
            dimension: AtomicUsize::new(configured_dimension),
            http: reqwest::Client::new(),
            fallback: LocalEmbeddingsClient::new(configured_dimension),
        }
    }

    fn record_actual_dimension(&self, actual: usize) {
        let configured = self.dimension.swap(actual, Ordering::Relaxed);
        if configured != actual {
            tracing::warn!(
                configured,
                actual,
                "remote embeddings dimension disagreed with configuration, using actual dimension"
            );
        }
    }
}

#[derive(serde::Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
}

#[derive(serde::Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(serde::Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingsClient for RemoteLlmEmbeddingsClient {
    async fn encode(&self, texts: &[String]) -> GatewayResult<Vec<Vec<f32>>> {
        let (Some(endpoint), Some(api_key)) = (self.endpoint.as_deref(), self.api_key.as_deref())
        else {
            tracing::warn!("no remote embeddings endpoint configured, falling back to local backend");
            return self.fallback.encode(texts).await;
        };

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&EmbeddingsRequest { input: texts })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GatewayError::internal(format!("embeddings request failed: {e}")))?;

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::internal(format!("embeddings response malformed: {e}")))?;

        if let Some(first) = parsed.data.first() {
            self.record_actual_dimension(first.embedding.len());
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }
}

/// Builds an [`EmbeddingsClient`] for the configured provider
/// (`embeddings.provider ∈ {local, remote-llm}`, spec §6.3).
pub fn build(provider: &str, dimension: usize) -> GatewayResult<Arc<dyn EmbeddingsClient>> {
    match provider {
        "local" => Ok(Arc::new(LocalEmbeddingsClient::new(dimension))),
        "remote-llm" => Ok(Arc::new(RemoteLlmEmbeddingsClient::from_env(dimension))),
        other => Err(GatewayError::invalid(format!(
            "unknown embeddings provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_backend_is_deterministic_and_fixed_dimension() {
        let client = LocalEmbeddingsClient::new(32);
        let texts = vec!["hello world".to_string(), "hello world".to_string()];
        let vectors = client.encode(&texts).await.unwrap();
        assert_eq!(vectors[0].len(), 32);
        assert_eq!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn local_backend_distinguishes_different_text() {
        let client = LocalEmbeddingsClient::new(16);
        let a = client.encode(&["alpha".to_string()]).await.unwrap();
        let b = client.encode(&["beta".to_string()]).await.unwrap();
        assert_ne!(a[0], b[0]);
    }

    #[tokio::test]
    async fn remote_backend_falls_back_without_configuration() {
        std::env::remove_var(ENV_EMBEDDINGS_API_URL);
        std::env::remove_var(ENV_EMBEDDINGS_API_KEY);
        let client = RemoteLlmEmbeddingsClient::from_env(16);
        let vectors = client.encode(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors[0].len(), 16);
    }

    #[test]
    fn build_rejects_unknown_provider() {
        assert!(build("unknown", 16).is_err());
    }
}
