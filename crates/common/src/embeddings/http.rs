//! HTTP embedding client for OpenAI-compatible, Azure OpenAI and Ollama engines

use super::Embedder;
use crate::config::{EmbeddingConfig, EmbeddingEngine};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::UserRef;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
/// Upper bound on a provider-supplied Retry-After delay
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

/// Embedding client over HTTP
pub struct HttpEmbedder {
    client: reqwest::Client,
    engine: EmbeddingEngine,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    max_retries: u32,
    timeout: Duration,
    prefix_field_name: Option<String>,
    azure_api_version: String,
    forward_user_info: bool,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbedder {
    /// Build a client from the embedding section of the config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = match (config.engine, config.api_base.as_deref()) {
            (_, Some(base)) => base.trim_end_matches('/').to_string(),
            (EmbeddingEngine::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (EmbeddingEngine::Ollama, None) => OLLAMA_BASE_URL.to_string(),
            (engine, None) => {
                return Err(AppError::Configuration {
                    message: format!("embedding.api_base is required for {}", engine.as_str()),
                })
            }
        };

        let api_key = match (config.engine, config.api_key.clone()) {
            (EmbeddingEngine::Ollama, key) => key.unwrap_or_default(),
            (_, Some(key)) => key,
            (engine, None) => {
                return Err(AppError::Configuration {
                    message: format!("embedding.api_key is required for {}", engine.as_str()),
                })
            }
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            engine: config.engine,
            base_url,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries.max(1),
            timeout,
            prefix_field_name: config.prefix_field_name.clone(),
            azure_api_version: config.azure_api_version.clone(),
            forward_user_info: config.forward_user_info,
        })
    }

    fn endpoint(&self) -> String {
        match self.engine {
            EmbeddingEngine::AzureOpenAi => format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                self.base_url, self.model, self.azure_api_version
            ),
            EmbeddingEngine::Ollama => format!("{}/api/embed", self.base_url),
            _ => format!("{}/embeddings", self.base_url),
        }
    }

    fn body(&self, texts: &[String], prefix: Option<&str>) -> Value {
        let mut body = json!({ "input": texts });
        if self.engine != EmbeddingEngine::AzureOpenAi {
            body["model"] = json!(self.model);
        }
        if let (Some(field), Some(prefix)) = (self.prefix_field_name.as_deref(), prefix) {
            body[field] = json!(prefix);
        }
        body
    }

    fn request(&self, body: &Value, user: Option<&UserRef>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");

        builder = match self.engine {
            EmbeddingEngine::AzureOpenAi => builder.header("api-key", &self.api_key),
            _ => builder.header("Authorization", format!("Bearer {}", self.api_key)),
        };

        if let (true, Some(user)) = (self.forward_user_info, user) {
            let name = urlencoding::encode(&user.name).replace("%20", " ");
            builder = builder
                .header("X-OpenWebUI-User-Name", name)
                .header("X-OpenWebUI-User-Id", &user.id)
                .header("X-OpenWebUI-User-Email", &user.email)
                .header("X-OpenWebUI-User-Role", &user.role);
        }

        builder.json(body)
    }

    /// Send one batch, honouring Retry-After on 429 up to `max_retries` attempts
    async fn request_with_retry(
        &self,
        texts: &[String],
        prefix: Option<&str>,
        user: Option<&UserRef>,
    ) -> Result<Vec<Vec<f32>>> {
        let body = self.body(texts, prefix);
        let mut retry_after_secs = 1.0;

        for attempt in 0..self.max_retries {
            let response = self
                .request(&body, user)
                .send()
                .await
                .map_err(|e| self.map_transport_error(e))?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                retry_after_secs = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .map(|s| s.min(MAX_RETRY_AFTER_SECS))
                    .unwrap_or(1.0);
                if attempt + 1 == self.max_retries {
                    break;
                }
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = self.max_retries,
                    retry_after_secs = retry_after_secs,
                    "Embedding provider rate limited, retrying"
                );
                tokio::time::sleep(Duration::from_secs_f64(retry_after_secs)).await;
                continue;
            }

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::EmbeddingError {
                    message: format!("API error {}: {}", status, body),
                });
            }

            let embeddings = self.parse(response).await?;
            if embeddings.len() != texts.len() {
                return Err(AppError::EmbeddingError {
                    message: format!(
                        "Provider returned {} embeddings for {} inputs",
                        embeddings.len(),
                        texts.len()
                    ),
                });
            }
            return Ok(embeddings);
        }

        Err(AppError::RateLimited { retry_after_secs })
    }

    async fn parse(&self, response: reqwest::Response) -> Result<Vec<Vec<f32>>> {
        let parse_err = |e: reqwest::Error| AppError::EmbeddingError {
            message: format!("Failed to parse response: {}", e),
        };
        match self.engine {
            EmbeddingEngine::Ollama => {
                let result: OllamaResponse = response.json().await.map_err(parse_err)?;
                Ok(result.embeddings)
            }
            _ => {
                let result: OpenAIResponse = response.json().await.map_err(parse_err)?;
                Ok(result.data.into_iter().map(|e| e.embedding).collect())
            }
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::EmbeddingTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AppError::HttpClient(e)
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(
        &self,
        texts: &[String],
        prefix: Option<&str>,
        user: Option<&UserRef>,
    ) -> Result<Vec<Vec<f32>>> {
        // Without a prefix field the prefix travels inside the text itself
        let prefixed: Vec<String>;
        let (texts, prefix) = match (prefix, self.prefix_field_name.is_some()) {
            (Some(p), false) => {
                prefixed = texts.iter().map(|t| format!("{}{}", p, t)).collect();
                (prefixed.as_slice(), None)
            }
            _ => (texts, prefix),
        };

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let start = Instant::now();
            let result = self.request_with_retry(chunk, prefix, user).await;
            metrics::record_embedding(
                start.elapsed().as_secs_f64(),
                &self.model,
                chunk.len(),
                result.is_ok(),
            );
            tracing::debug!(
                engine = self.engine.as_str(),
                model = %self.model,
                batch_size = chunk.len(),
                "Embedding batch completed"
            );
            all_embeddings.extend(result?);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(engine: EmbeddingEngine, base: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            engine,
            api_key: Some("test-key".into()),
            api_base: Some(base.to_string()),
            model: "embed-small".into(),
            batch_size: 2,
            max_retries: 3,
            ..Default::default()
        }
    }

    fn openai_body(vectors: &[[f32; 2]]) -> Value {
        json!({
            "data": vectors.iter().map(|v| json!({"embedding": v})).collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn test_openai_batches_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&[[1.0, 0.0], [0.0, 1.0]])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["c"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&[[0.5, 0.5]])))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::from_config(&config(EmbeddingEngine::OpenAi, &server.uri())).unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let embeddings = embedder.embed_batch(&texts, None, None).await.unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
    }

    #[tokio::test]
    async fn test_prefix_prepended_without_field_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["query: hello"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&[[1.0, 0.0]])))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::from_config(&config(EmbeddingEngine::OpenAi, &server.uri())).unwrap();
        let v = embedder.embed("hello", Some("query: "), None).await.unwrap();
        assert_eq!(v, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_prefix_sent_as_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["hello"], "input_type": "query"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&[[1.0, 0.0]])))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(EmbeddingEngine::OpenAi, &server.uri());
        cfg.prefix_field_name = Some("input_type".into());
        let embedder = HttpEmbedder::from_config(&cfg).unwrap();
        embedder.embed("hello", Some("query"), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_azure_retries_on_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/embed-small/embeddings"))
            .and(query_param("api-version", "2023-05-15"))
            .and(header("api-key", "test-key"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/embed-small/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&[[0.0, 1.0]])))
            .mount(&server)
            .await;

        let embedder =
            HttpEmbedder::from_config(&config(EmbeddingEngine::AzureOpenAi, &server.uri())).unwrap();
        let v = embedder.embed("x", None, None).await.unwrap();
        assert_eq!(v, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::from_config(&config(EmbeddingEngine::OpenAi, &server.uri())).unwrap();
        let err = embedder.embed("x", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_oversized_retry_after_is_clamped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1e20"))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(EmbeddingEngine::OpenAi, &server.uri());
        cfg.max_retries = 1;
        let embedder = HttpEmbedder::from_config(&cfg).unwrap();
        let err = embedder.embed("x", None, None).await.unwrap_err();
        match err {
            AppError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, MAX_RETRY_AFTER_SECS)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ollama_and_user_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(header("X-OpenWebUI-User-Name", "Budi Santoso"))
            .and(header("X-OpenWebUI-User-Role", "user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.25, 0.75]]})))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(EmbeddingEngine::Ollama, &server.uri());
        cfg.forward_user_info = true;
        let embedder = HttpEmbedder::from_config(&cfg).unwrap();
        let user = UserRef {
            id: "u1".into(),
            name: "Budi Santoso".into(),
            email: "budi@example.com".into(),
            role: "user".into(),
        };
        let v = embedder.embed("x", None, Some(&user)).await.unwrap();
        assert_eq!(v, vec![0.25, 0.75]);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&[[1.0, 0.0]])))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::from_config(&config(EmbeddingEngine::OpenAi, &server.uri())).unwrap();
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embedder.embed_batch(&texts, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::EmbeddingError { .. }));
    }
}
