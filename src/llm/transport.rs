use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::LlmConfig;

/// Outcome of a single completion call, before retry classification.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to model {model} failed: {source}")]
    Network {
        model: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model {model} returned HTTP {status}: {body}")]
    Http {
        model: String,
        status: StatusCode,
        body: String,
    },
    #[error("model {model} returned no usable completion text")]
    EmptyCompletion { model: String },
    #[error("model {model} rejected the prompt: {reason}")]
    Rejected { model: String, reason: String },
}

impl TransportError {
    /// Retriable failures are worth trying against another candidate model;
    /// terminal ones would recur identically (bad request, auth, content
    /// rejection), so the invoker stops immediately.
    pub fn is_retriable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            TransportError::EmptyCompletion { .. } => true,
            TransportError::Rejected { .. } => false,
        }
    }
}

/// Seam between the invoker and the wire. Tests script outcomes and count
/// calls through this; production goes over HTTP.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String, TransportError>;
}

/// OpenAI-style `POST {base}/chat/completions` client.
pub struct HttpChatTransport {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpChatTransport {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client for the completion API")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn network_error(model: &str, source: reqwest::Error) -> TransportError {
        TransportError::Network {
            model: model.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn complete(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String, TransportError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let request_body = json!({
            "model": model,
            "messages": messages,
            "temperature": 0.3,
            "max_tokens": 1024,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::network_error(model, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                model: model.to_string(),
                status,
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Self::network_error(model, e))?;

        let choice = &payload["choices"][0];
        if choice["finish_reason"].as_str() == Some("content_filter") {
            return Err(TransportError::Rejected {
                model: model.to_string(),
                reason: "completion blocked by content filter".to_string(),
            });
        }

        match choice["message"]["content"].as_str() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(TransportError::EmptyCompletion {
                model: model.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    name: Option<String>,
}

/// List the models available behind the completion API.
pub async fn fetch_available_models(
    api_url: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Vec<String>> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client for the completion API")?;
    let mut request = client.get(format!("{}/models", api_url));
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .context("Failed to reach the completion API")?;
    if !response.status().is_success() {
        anyhow::bail!("Failed to fetch models: {}", response.status());
    }

    let models: ModelsResponse = response
        .json()
        .await
        .context("Failed to parse the model listing")?;
    Ok(models
        .data
        .into_iter()
        .map(|model| model.name.unwrap_or(model.id))
        .collect())
}
