use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;

use crate::config::ServiceConfig;

const MAX_PROMPT_CHARS: usize = 12_000;

/// Single-completion seam over the language-model backend. Mocked in tests.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client with exponential backoff on rate limiting.
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retries: usize,
    retry_delay_ms: u64,
}

impl LlmClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let Some(api_key) = config.llm_api_key.clone() else {
            bail!("LLM_API_KEY is required for summarize/tagging endpoints");
        };
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .context("failed to build LLM HTTP client")?;
        Ok(Self {
            client,
            base_url: config.llm_base_url.clone(),
            api_key,
            model: config.llm_model.clone(),
            retries: config.http_retries,
            retry_delay_ms: config.http_retry_delay_ms,
        })
    }
}

#[async_trait]
impl Completer for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2,
        });

        let mut last_error = None::<String>;
        for attempt in 0..=self.retries {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let payload: Value = response
                            .json()
                            .await
                            .context("failed to decode LLM JSON response")?;
                        return extract_message(&payload);
                    }
                    last_error = Some(format!("LLM HTTP {}", status.as_u16()));
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < self.retries {
                        sleep(Duration::from_millis(
                            self.retry_delay_ms.saturating_mul(1 << attempt),
                        ))
                        .await;
                        continue;
                    }
                    break;
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < self.retries {
                        sleep(Duration::from_millis(
                            self.retry_delay_ms.saturating_mul(1 << attempt),
                        ))
                        .await;
                        continue;
                    }
                }
            }
        }
        let message = last_error.unwrap_or_else(|| "LLM request failed".to_string());
        bail!("{message}")
    }
}

fn extract_message(payload: &Value) -> Result<String> {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("invalid LLM response shape"))
}

pub fn summary_prompt(title: &str, text: &str) -> String {
    format!(
        "Summarize the following wiki page in at most three sentences. \
         Answer with the summary only.\n\nTitle: {title}\n\n{}",
        crate::convert::truncate_for_prompt(text, MAX_PROMPT_CHARS)
    )
}

pub fn label_prompt(title: &str, text: &str, allowed_labels: &[String]) -> String {
    format!(
        "Pick the labels that apply to the following wiki page. \
         Choose only from this list: {}. \
         Answer with a comma-separated list and nothing else; \
         answer \"none\" if nothing applies.\n\nTitle: {title}\n\n{}",
        allowed_labels.join(", "),
        crate::convert::truncate_for_prompt(text, MAX_PROMPT_CHARS)
    )
}

/// Parse a comma- or newline-separated label reply into normalized tokens.
pub fn parse_label_reply(reply: &str) -> Vec<String> {
    let mut labels = Vec::new();
    for token in reply.split([',', '\n']) {
        let normalized = token.trim().trim_matches('"').to_ascii_lowercase();
        if normalized.is_empty() || normalized == "none" {
            continue;
        }
        if !labels.contains(&normalized) {
            labels.push(normalized);
        }
    }
    labels
}
