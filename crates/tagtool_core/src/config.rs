use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};

pub const DEFAULT_USER_AGENT: &str = "tagtool/0.2";
pub const DEFAULT_BIND: &str = "127.0.0.1:8321";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRIES: usize = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 350;
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Process configuration, resolved once at startup from the environment
/// (after dotenvy has loaded `.env` in the binary).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub wiki_base_url: String,
    pub wiki_token: Option<String>,
    pub user_agent: String,
    pub http_timeout_ms: u64,
    pub http_retries: usize,
    pub http_retry_delay_ms: u64,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub bind: String,
    /// Safety gate: when false, bulk endpoints force dry-run regardless of
    /// what the caller requested.
    pub allow_writes: bool,
    pub sections_file: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let Some(wiki_base_url) = env_string("WIKI_BASE_URL") else {
            bail!("WIKI_BASE_URL is required (e.g. https://wiki.example.org)");
        };
        Ok(Self {
            wiki_base_url: wiki_base_url.trim_end_matches('/').to_string(),
            wiki_token: env_string("WIKI_TOKEN"),
            user_agent: env_string("WIKI_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            http_timeout_ms: env_parsed("WIKI_HTTP_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS),
            http_retries: env_parsed("WIKI_HTTP_RETRIES").unwrap_or(DEFAULT_RETRIES),
            http_retry_delay_ms: env_parsed("WIKI_HTTP_RETRY_DELAY_MS")
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            llm_api_key: env_string("LLM_API_KEY"),
            llm_base_url: env_string("LLM_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            bind: env_string("TAGTOOL_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            allow_writes: env_flag("TAGTOOL_ALLOW_WRITES"),
            sections_file: env_string("TAGTOOL_SECTIONS_FILE").map(PathBuf::from),
        })
    }

    /// Apply the write gate to a requested dry-run flag.
    pub fn effective_dry_run(&self, requested_dry_run: bool) -> bool {
        if !self.allow_writes && !requested_dry_run {
            log::warn!("writes are disabled (TAGTOOL_ALLOW_WRITES); forcing dry-run");
            return true;
        }
        requested_dry_run
    }
}

fn env_string(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}

fn env_flag(key: &str) -> bool {
    env_string(key)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::ServiceConfig;

    fn config(allow_writes: bool) -> ServiceConfig {
        ServiceConfig {
            wiki_base_url: "https://wiki.example.org".to_string(),
            wiki_token: None,
            user_agent: super::DEFAULT_USER_AGENT.to_string(),
            http_timeout_ms: super::DEFAULT_TIMEOUT_MS,
            http_retries: super::DEFAULT_RETRIES,
            http_retry_delay_ms: super::DEFAULT_RETRY_DELAY_MS,
            llm_api_key: None,
            llm_base_url: super::DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: super::DEFAULT_LLM_MODEL.to_string(),
            bind: super::DEFAULT_BIND.to_string(),
            allow_writes,
            sections_file: None,
        }
    }

    #[test]
    fn write_gate_forces_dry_run_when_writes_disabled() {
        let gated = config(false);
        assert!(gated.effective_dry_run(true));
        assert!(gated.effective_dry_run(false));
    }

    #[test]
    fn write_gate_passes_through_when_writes_enabled() {
        let open = config(true);
        assert!(open.effective_dry_run(true));
        assert!(!open.effective_dry_run(false));
    }
}
