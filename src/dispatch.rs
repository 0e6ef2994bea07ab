use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::classify::{Classifier, Intent};
use crate::config::LlmConfig;
use crate::handlers::{general, news, weather};
use crate::handlers::{ForecastSource, HeadlinesSource};
use crate::llm::{ChatTransport, FallbackPolicy, ModelInvoker};

/// Response for one routed message: the display text plus an echo of the
/// classification that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub intent: String,
    pub location: String,
    pub topic: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("message must not be empty")]
    EmptyMessage,
}

/// Orchestrates classifier → handler → reply assembly. Holds only shared
/// immutable collaborators; each call operates on request-local data, so
/// concurrent calls need no coordination.
pub struct Dispatcher {
    llm: LlmConfig,
    invoker: ModelInvoker,
    forecast: Option<Arc<dyn ForecastSource>>,
    headlines: Option<Arc<dyn HeadlinesSource>>,
}

impl Dispatcher {
    pub fn new(
        llm: LlmConfig,
        transport: Arc<dyn ChatTransport>,
        forecast: Option<Arc<dyn ForecastSource>>,
        headlines: Option<Arc<dyn HeadlinesSource>>,
    ) -> Self {
        let policy = FallbackPolicy::new(llm.fallback_models.clone());
        Self {
            llm,
            invoker: ModelInvoker::new(transport, policy),
            forecast,
            headlines,
        }
    }

    pub async fn respond(&self, message: &str) -> Result<ChatReply, DispatchError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DispatchError::EmptyMessage);
        }

        let classification = Classifier::new(&self.invoker, &self.llm)
            .classify(message)
            .await;
        info!(
            "classified message as {} (location: {:?}, topic: {:?}, activity: {:?})",
            classification.intent.as_str(),
            classification.location,
            classification.topic,
            classification.activity
        );

        let reply = match classification.intent {
            Intent::Weather => {
                weather::handle(&classification.location, self.forecast.as_deref()).await
            }
            Intent::News => {
                news::handle(&classification.topic, message, self.headlines.as_deref()).await
            }
            Intent::General => general::handle(message, &self.invoker, &self.llm).await,
        };

        Ok(ChatReply {
            reply,
            intent: classification.intent.as_str().to_string(),
            location: classification.location,
            topic: classification.topic,
        })
    }
}
