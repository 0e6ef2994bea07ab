use futures_util::FutureExt;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::degrade::{self, Stage};
use crate::llm::{extract_json, ModelInvoker};

/// Coarse category assigned to a user message. Always one of these three;
/// anything else coming back from the model is rejected before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Weather,
    News,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Weather => "weather",
            Intent::News => "news",
            Intent::General => "general",
        }
    }

    /// Normalize a model-produced label: trimmed, case-insensitive.
    /// Unrecognized labels yield `None` so the caller can fall back.
    fn from_label(label: &str) -> Option<Intent> {
        match label.trim().to_lowercase().as_str() {
            "weather" => Some(Intent::Weather),
            "news" => Some(Intent::News),
            "general" => Some(Intent::General),
            _ => None,
        }
    }
}

/// Intent plus extracted slots. Built fresh per request; slots default to
/// empty strings when nothing was extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub location: String,
    pub topic: String,
    pub activity: String,
}

impl Classification {
    fn bare(intent: Intent) -> Self {
        Self {
            intent,
            location: String::new(),
            topic: String::new(),
            activity: String::new(),
        }
    }
}

/// Tokens dropped when deriving slot values and news keywords. Shared with
/// the news handler so both sides agree on what carries no signal.
pub(crate) const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "can", "could", "do", "for", "get", "give",
    "headline", "headlines", "hey", "how", "in", "is", "it", "latest", "like", "me", "my",
    "news", "now", "of", "on", "per", "please", "show", "some", "tell", "that", "the", "there",
    "to", "today", "tomorrow", "update", "updates", "was", "what", "whats", "when", "where",
    "will", "you",
];

lazy_static! {
    static ref WEATHER_RE: Regex = Regex::new(
        r"(?i)\b(weather|forecast|temperature|rain(?:y|ing)?|snow(?:y|ing)?|sunny|cloudy|humid(?:ity)?|wind(?:y)?|storm(?:y)?|umbrella|degrees|sunrise|sunset)\b"
    )
    .unwrap();
    static ref NEWS_RE: Regex = Regex::new(
        r"(?i)\b(news|headlines?|articles?|stor(?:y|ies)|breaking|bulletins?|updates?)\b"
    )
    .unwrap();
    static ref SLOT_RE: Regex =
        Regex::new(r"(?i)\b(?:in|about|for|near|at)\s+(.+?)\s*(?:[?!.,]|$)").unwrap();
}

const CLASSIFY_SYSTEM: &str = "You are an intent classifier for a personal assistant. \
Respond with a single JSON object and nothing else.";

fn classification_prompt(message: &str) -> String {
    format!(
        "Classify the user message into exactly one intent: \"weather\", \"news\" or \"general\".\n\
Also extract slots when present: \"location\" (place the user asks about), \"topic\" \
(subject of a news request), \"activity\" (what the user wants to do).\n\
Respond with JSON of the shape:\n\
{{\"intent\": \"weather|news|general\", \"location\": \"\", \"topic\": \"\", \"activity\": \"\"}}\n\
Use empty strings for slots that do not apply.\n\n\
Message: {}",
        message
    )
}

/// Two-tier classifier: the language model is the highest-value path but
/// also the least reliable one, so every failure mode degrades to the
/// deterministic keyword matcher instead of failing the request.
pub struct Classifier<'a> {
    invoker: &'a ModelInvoker,
    llm: &'a LlmConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(invoker: &'a ModelInvoker, llm: &'a LlmConfig) -> Self {
        Self { invoker, llm }
    }

    pub async fn classify(&self, message: &str) -> Classification {
        let stages: Vec<Stage<'_, Classification>> = vec![self.via_model(message).boxed()];
        degrade::chain(stages, || fallback_classify(message)).await
    }

    async fn via_model(&self, message: &str) -> Option<Classification> {
        if self.llm.disabled {
            debug!("language-model path disabled, using keyword fallback");
            return None;
        }

        let prompt = classification_prompt(message);
        let raw = match self
            .invoker
            .invoke(&self.llm.model, Some(CLASSIFY_SYSTEM), &prompt)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!("model classification unavailable: {}", err);
                return None;
            }
        };

        let value = extract_json(&raw)?;
        let intent = Intent::from_label(value["intent"].as_str()?)?;
        Some(Classification {
            intent,
            location: slot(&value, "location"),
            topic: slot(&value, "topic"),
            activity: slot(&value, "activity"),
        })
    }
}

fn slot(value: &Value, key: &str) -> String {
    value[key].as_str().map(str::trim).unwrap_or("").to_string()
}

/// Deterministic keyword classification. The weather vocabulary is checked
/// before the news one; a message matching both (e.g. "weather update")
/// classifies as weather. Neither matching means `general`.
pub(crate) fn fallback_classify(message: &str) -> Classification {
    if WEATHER_RE.is_match(message) {
        Classification {
            location: slot_value(message, &WEATHER_RE),
            ..Classification::bare(Intent::Weather)
        }
    } else if NEWS_RE.is_match(message) {
        Classification {
            topic: slot_value(message, &NEWS_RE),
            ..Classification::bare(Intent::News)
        }
    } else {
        Classification::bare(Intent::General)
    }
}

/// Slot extraction for the fallback path: a prepositional phrase wins;
/// otherwise strip the matched keywords and stopwords and keep whatever
/// remains of the message.
fn slot_value(message: &str, keyword_re: &Regex) -> String {
    if let Some(captures) = SLOT_RE.captures(message) {
        let phrase = captures[1].trim();
        if !phrase.is_empty() {
            return phrase.to_string();
        }
    }
    residual_tokens(message, keyword_re)
}

fn residual_tokens(message: &str, keyword_re: &Regex) -> String {
    let stripped = keyword_re.replace_all(message, " ");
    let cleaned: String = stripped
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|token| token.len() > 1 && !STOPWORDS.contains(&token.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}
