use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::degrade::{self, Stage};
use crate::llm::{extract_json, ModelInvoker};

const DEGRADED: &str = "I'm having trouble reaching my language model right now. \
I can still look up live weather (\"weather in Tokyo\") or headlines (\"news about technology\") for you.";

const PERSONA: &str = "You are Concierge, a friendly and concise personal assistant. \
Answer helpfully in at most a couple of short paragraphs. \
You also have dedicated weather and news lookups; mention them when the user asks about live conditions or headlines.";

const TONE_SYSTEM: &str = "Classify the emotional tone of the user's message. \
Respond with a single JSON object and nothing else: {\"tone\": \"positive\" | \"neutral\" | \"negative\"}.";

/// Catch-all small talk handler: the raw message goes to the model under a
/// persona prompt, with a static pointer at the structured paths as the
/// final degradation stage.
pub async fn handle(message: &str, invoker: &ModelInvoker, llm: &LlmConfig) -> String {
    if llm.disabled {
        return DEGRADED.to_string();
    }

    let stages: Vec<Stage<'_, String>> = vec![model_reply(message, invoker, llm).boxed()];
    degrade::chain(stages, || DEGRADED.to_string()).await
}

/// Main reply plus an auxiliary tone check, issued concurrently. Both are
/// read-only and independent; the tone call failing only costs the
/// empathetic prefix, never the reply.
async fn model_reply(message: &str, invoker: &ModelInvoker, llm: &LlmConfig) -> Option<String> {
    let reply = invoker.invoke(&llm.model, Some(PERSONA), message);
    let tone = tone_check(message, invoker, llm);
    let (reply, tone) = tokio::join!(reply, tone);

    let reply = match reply {
        Ok(text) => text.trim().to_string(),
        Err(err) => {
            warn!("general reply unavailable: {}", err);
            return None;
        }
    };

    match tone.as_deref() {
        Some("negative") => Some(format!("Sorry it's been a rough one. {}", reply)),
        _ => Some(reply),
    }
}

async fn tone_check(message: &str, invoker: &ModelInvoker, llm: &LlmConfig) -> Option<String> {
    let raw = match invoker.invoke(&llm.model, Some(TONE_SYSTEM), message).await {
        Ok(raw) => raw,
        Err(err) => {
            debug!("tone check unavailable: {}", err);
            return None;
        }
    };
    let value = extract_json(&raw)?;
    let tone = value["tone"].as_str()?.trim().to_lowercase();
    debug!("message tone: {}", tone);
    Some(tone)
}
