use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::{NewsConfig, require_api_key};
use crate::error::{AssistError, Result};
use crate::models::NewsArticle;

const NEWS_API_BASE: &str = "https://newsapi.org/v2";
/// How many raw articles to request before filtering trims them down.
const RAW_PAGE_SIZE: usize = 20;
/// Sources replaced by the provider keep this sentinel name.
const REMOVED_SOURCE: &str = "[Removed]";

/// Search vocabulary for the news provider. Queries are reduced to the
/// terms they share with this list; the article labeller reuses it.
pub const DISASTER_VOCABULARY: &[&str] = &[
    "disaster",
    "earthquake",
    "flood",
    "cyclone",
    "storm",
    "tsunami",
    "landslide",
    "wildfire",
    "hurricane",
    "volcano",
    "heatwave",
    "drought",
    "weather",
];

/// Recent-articles provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch(&self, query: &str, page_size: usize) -> Result<Vec<NewsArticle>>;
}

/// NewsAPI `everything` client: boolean-OR keyword search, newest first,
/// filtered down to complete, categorizable articles.
pub struct NewsApiClient {
    client: Client,
    api_key: String,
    language: String,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(cfg: &NewsConfig) -> Result<Self> {
        let api_key = require_api_key(&cfg.api_key, "NewsAPI")?;
        Ok(Self {
            client: Client::new(),
            api_key,
            language: cfg.language.clone(),
            base_url: NEWS_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

/// Map a free-text query onto the fixed vocabulary. Terms outside the
/// vocabulary are discarded; an entirely unrelated query searches the whole
/// vocabulary instead of nothing.
fn search_query(query: &str) -> String {
    let lower = query.to_lowercase();
    let matched: Vec<&str> = lower
        .split_whitespace()
        .filter(|term| DISASTER_VOCABULARY.contains(term))
        .collect();
    if matched.is_empty() {
        DISASTER_VOCABULARY.join(" OR ")
    } else {
        matched.join(" OR ")
    }
}

/// Label an article with the first vocabulary keyword found in its title
/// and description. "weather" gets the friendlier "Weather Alert" label;
/// the rest are capitalized as-is.
fn categorize(title: &str, description: &str) -> Option<String> {
    let content = format!("{} {}", title.to_lowercase(), description.to_lowercase());
    let keyword = DISASTER_VOCABULARY.iter().find(|k| content.contains(*k))?;
    if *keyword == "weather" {
        return Some("Weather Alert".to_string());
    }
    let mut chars = keyword.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().collect::<String>() + chars.as_str())
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    async fn fetch(&self, query: &str, page_size: usize) -> Result<Vec<NewsArticle>> {
        let url = format!("{}/everything", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[
                ("q", search_query(query)),
                ("sortBy", "publishedAt".to_string()),
                ("language", self.language.clone()),
                ("pageSize", RAW_PAGE_SIZE.to_string()),
                ("apiKey", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| AssistError::Upstream(format!("news request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::Upstream(format!(
                "news API request failed with status {status}"
            )));
        }

        let data: EverythingResponse = response
            .json()
            .await
            .map_err(|e| AssistError::Parse(format!("failed to parse news response: {e}")))?;

        let articles: Vec<NewsArticle> = data
            .articles
            .into_iter()
            .filter_map(|raw| {
                let title = raw.title?;
                let description = raw.description?;
                let image_url = raw.url_to_image?;
                if title.is_empty()
                    || description.is_empty()
                    || image_url.is_empty()
                    || raw.source.name == REMOVED_SOURCE
                {
                    return None;
                }
                let category = categorize(&title, &description)?;
                Some(NewsArticle {
                    source: raw.source.name,
                    title,
                    description,
                    url: raw.url,
                    image_url,
                    published_at: raw.published_at,
                    category,
                })
            })
            .take(page_size)
            .collect();

        tracing::debug!(count = articles.len(), "fetched news articles");
        Ok(articles)
    }
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    source: RawSource,
    title: Option<String>,
    description: Option<String>,
    url: String,
    url_to_image: Option<String>,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: String,
}
