use std::env;
use std::time::Duration;

pub const DEFAULT_LLM_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_WEATHER_URL: &str = "https://api.weatherapi.com/v1";
pub const DEFAULT_NEWS_URL: &str = "https://newsapi.org/v2";

/// Fixed fallback candidates tried after the preferred model.
pub const FALLBACK_MODELS: &[&str] = &["gpt-4o-mini", "gpt-3.5-turbo"];

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Settings for the chat-completion service.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Preferred model, tried before the fallback candidates.
    pub model: String,
    pub fallback_models: Vec<String>,
    /// Kill switch: skip the model entirely and rely on keyword fallback.
    pub disabled: bool,
    /// Network-level timeout applied to every outbound call.
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_LLM_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            disabled: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_url: String,
    pub api_key: String,
    /// Network-level timeout applied to every outbound call.
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            api_url,
            api_key,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Process-wide configuration, built once in `main` and passed by reference.
/// A missing credential leaves the matching section `None`, which downgrades
/// the handler to a "not configured" reply instead of failing requests.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub weather: Option<SourceConfig>,
    pub news: Option<SourceConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let llm = LlmConfig {
            api_url: env_or("LLM_API_URL", DEFAULT_LLM_URL),
            api_key: env_opt("LLM_API_KEY"),
            model: env_or("LLM_MODEL", DEFAULT_MODEL),
            disabled: env_flag("LLM_DISABLED"),
            ..LlmConfig::default()
        };

        let weather = env_opt("WEATHER_API_KEY")
            .map(|api_key| SourceConfig::new(env_or("WEATHER_API_URL", DEFAULT_WEATHER_URL), api_key));

        let news = env_opt("NEWS_API_KEY")
            .map(|api_key| SourceConfig::new(env_or("NEWS_API_URL", DEFAULT_NEWS_URL), api_key));

        Self { llm, weather, news }
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env_opt(name).as_deref().map(str::to_lowercase).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}
