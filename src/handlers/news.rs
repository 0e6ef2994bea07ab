use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use futures_util::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classify::STOPWORDS;
use crate::config::SourceConfig;
use crate::degrade::{self, Stage};

const NOT_CONFIGURED: &str =
    "News lookups aren't configured on this instance, so I can't fetch headlines right now.";
const NO_ARTICLES: &str =
    "I couldn't find any recent articles on that. Maybe try a different topic?";

/// Category used when no keyword survives derivation, and for the broadened
/// retry after a zero-result keyword query.
const DEFAULT_CATEGORY: &str = "general";
const MAX_KEYWORDS: usize = 4;
const MAX_DESCRIPTION_CHARS: usize = 140;

#[derive(Debug, Clone)]
pub struct Article {
    pub title: String,
    pub source_name: Option<String>,
    pub published_at: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait HeadlinesSource: Send + Sync {
    /// Fetch headlines for a keyword query, or for a category when no
    /// query is given. An empty list is a valid answer.
    async fn top_headlines(&self, query: Option<&str>, category: &str)
        -> Result<Vec<Article>>;
}

/// Produce the news reply for a classified topic slot (falling back to the
/// raw message for keyword derivation). Degradation order: keyword query,
/// then the broadened default-category query, then a static message.
pub async fn handle(topic: &str, message: &str, source: Option<&dyn HeadlinesSource>) -> String {
    let Some(source) = source else {
        return NOT_CONFIGURED.to_string();
    };

    let keywords = derive_keywords(topic, message);
    let mut stages: Vec<Stage<'_, String>> = Vec::new();
    if !keywords.is_empty() {
        stages.push(fetch_stage(source, Some(keywords.clone())).boxed());
    }
    stages.push(fetch_stage(source, None).boxed());

    degrade::chain(stages, || NO_ARTICLES.to_string()).await
}

async fn fetch_stage(source: &dyn HeadlinesSource, query: Option<String>) -> Option<String> {
    match source.top_headlines(query.as_deref(), DEFAULT_CATEGORY).await {
        Ok(articles) if !articles.is_empty() => Some(format_articles(&articles)),
        Ok(_) => {
            debug!("no articles for query {:?}, broadening", query);
            None
        }
        Err(err) => {
            warn!("headline lookup failed for query {:?}: {}", query, err);
            None
        }
    }
}

/// Compact keyword string for the upstream query: topic slot when present,
/// otherwise the raw message; lowercased, punctuation stripped, stopwords
/// dropped, at most the first few remaining tokens.
pub(crate) fn derive_keywords(topic: &str, message: &str) -> String {
    let basis = if topic.trim().is_empty() { message } else { topic };
    let lowered = basis.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|token| token.len() > 1 && !STOPWORDS.contains(token))
        .take(MAX_KEYWORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_articles(articles: &[Article]) -> String {
    let mut entries = Vec::with_capacity(articles.len());
    for (i, article) in articles.iter().enumerate() {
        let mut entry = format!("{}. {}", i + 1, article.title.trim());
        let source = article
            .source_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown source");
        entry.push_str(&format!("\n   {} — {}", source, format_stamp(article)));
        if let Some(description) = article
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            entry.push_str(&format!("\n   {}", truncate(description, MAX_DESCRIPTION_CHARS)));
        }
        if let Some(url) = article.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            entry.push_str(&format!("\n   {}", url));
        }
        entries.push(entry);
    }
    format!("Here's what I found:\n\n{}", entries.join("\n\n"))
}

fn format_stamp(article: &Article) -> String {
    let Some(raw) = article.published_at.as_deref() else {
        return "date unknown".to_string();
    };
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(stamp) => stamp.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

// newsapi.org response shapes, confined to the reqwest impl.
#[derive(Debug, Deserialize)]
struct ApiHeadlines {
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
struct ApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<ApiArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ApiArticleSource {
    name: Option<String>,
}

pub struct NewsApiSource {
    client: Client,
    api_url: String,
    api_key: String,
}

impl NewsApiSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client for the headlines service")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl HeadlinesSource for NewsApiSource {
    async fn top_headlines(
        &self,
        query: Option<&str>,
        category: &str,
    ) -> Result<Vec<Article>> {
        let mut params = vec![
            ("apiKey", self.api_key.clone()),
            ("pageSize", "5".to_string()),
            ("language", "en".to_string()),
        ];
        match query {
            Some(q) => params.push(("q", q.to_string())),
            None => params.push(("category", category.to_string())),
        }

        let response = self
            .client
            .get(format!("{}/top-headlines", self.api_url))
            .query(&params)
            .send()
            .await
            .context("Failed to reach the headlines service")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("headlines service returned HTTP {}", status);
        }

        let payload: ApiHeadlines = response
            .json()
            .await
            .context("Failed to parse the headlines response")?;

        Ok(payload
            .articles
            .into_iter()
            .filter_map(|a| {
                let title = a.title.filter(|t| !t.trim().is_empty())?;
                Some(Article {
                    title,
                    source_name: a.source.and_then(|s| s.name),
                    published_at: a.published_at,
                    description: a.description,
                    url: a.url,
                })
            })
            .collect())
    }
}
