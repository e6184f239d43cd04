use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{GeminiConfig, require_api_key};
use crate::error::{AssistError, Result};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_RETRIES: u8 = 4;

/// Text-generation provider. The session controller only ever needs a
/// prompt in and prose out.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gemini-backed completion transport. Construction fails when the API key
/// is absent; a missing credential is a process configuration problem, not
/// something to discover mid-conversation.
pub struct GeminiTransport {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiTransport {
    pub fn new(cfg: &GeminiConfig) -> Result<Self> {
        let api_key = require_api_key(&cfg.api_key, "Gemini")?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model: cfg.model.clone(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl Completion for GeminiTransport {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        {"text": prompt}
                    ]
                }
            ]
        });

        let mut attempts = 0;
        loop {
            attempts += 1;

            let sent = self
                .client
                .post(self.endpoint())
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: GenerateContentResponse =
                            response.json().await.map_err(|e| {
                                AssistError::Parse(format!(
                                    "failed to parse Gemini response: {e}"
                                ))
                            })?;
                        return parsed.first_text().ok_or_else(|| {
                            AssistError::Upstream(
                                "Gemini returned no text candidates".to_string(),
                            )
                        });
                    }

                    // Client errors won't get better on retry.
                    if status.is_client_error() || attempts >= MAX_RETRIES {
                        let detail = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(AssistError::Upstream(format!(
                            "Gemini API error ({status}) after {attempts} attempt(s): {detail}"
                        )));
                    }
                }
                Err(e) => {
                    if attempts >= MAX_RETRIES {
                        return Err(AssistError::Upstream(format!(
                            "failed to reach Gemini API after {attempts} attempts: {e}"
                        )));
                    }
                }
            }

            // Exponential backoff with jitter before the next attempt
            let base_delay = Duration::from_millis(200 * 2u64.pow(u32::from(attempts - 1)));
            let jitter = rand::thread_rng().gen_range(0.8..=1.2);
            let delay = Duration::from_millis((base_delay.as_millis() as f64 * jitter) as u64);
            tracing::debug!(attempt = attempts, ?delay, "retrying Gemini request");
            sleep(delay).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        self.candidates
            .first()?
            .content
            .parts
            .iter()
            .find_map(|part| part.text.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
