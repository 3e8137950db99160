use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;

use crate::config::ServiceConfig;

const BACKEND_PAGE_LIMIT: usize = 50;

/// A wiki page as this service sees it. Pages are never created or deleted
/// here; only their label set is mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub space_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Space {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub space_type: String,
    pub status: String,
}

/// One backend page of a space listing, echoing backend pagination fields.
#[derive(Debug, Clone, Serialize)]
pub struct SpacePage {
    pub spaces: Vec<Space>,
    pub start: usize,
    pub limit: usize,
    pub size: usize,
    pub total: usize,
}

/// Wiki backend operations the services depend on. Mocked in tests.
#[async_trait]
pub trait WikiApi: Send + Sync {
    async fn get_page(&self, page_id: &str) -> Result<Page>;
    async fn get_labels(&self, page_id: &str) -> Result<Vec<String>>;
    async fn add_labels(&self, page_id: &str, labels: &[String]) -> Result<Vec<String>>;
    async fn remove_labels(&self, page_id: &str, labels: &[String]) -> Result<Vec<String>>;
    async fn get_child_pages(&self, page_id: &str) -> Result<Vec<String>>;
    async fn get_pages_in_space(&self, space_key: &str) -> Result<Vec<Page>>;
    async fn get_spaces(
        &self,
        query: Option<&str>,
        start: usize,
        limit: usize,
    ) -> Result<SpacePage>;
}

/// Client for a Confluence-style REST backend.
pub struct HttpWikiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    user_agent: String,
    retries: usize,
    retry_delay_ms: u64,
}

impl HttpWikiClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .context("failed to build wiki HTTP client")?;
        Ok(Self {
            client,
            base_url: config.wiki_base_url.clone(),
            token: config.wiki_token.clone(),
            user_agent: config.user_agent.clone(),
            retries: config.http_retries,
            retry_delay_ms: config.http_retry_delay_ms,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/rest/api/{path}", self.base_url)
    }

    /// Label names can carry characters with URL meaning; append the name as
    /// a percent-encoded path segment rather than interpolating it.
    fn label_delete_url(&self, page_id: &str, label: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_url(&format!("content/{page_id}/label")))
            .with_context(|| format!("invalid wiki base URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("wiki base URL cannot carry a path: {}", self.base_url))?
            .push(label);
        Ok(url)
    }

    /// Issue one API call with bounded retries on transport errors, 429 and
    /// 5xx. 4xx other than 429 is not retried.
    async fn request_json(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut last_error = None::<String>;
        for attempt in 0..=self.retries {
            let mut request = self
                .client
                .request(method.clone(), url)
                .header("User-Agent", self.user_agent.clone())
                .query(query);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if status == reqwest::StatusCode::NO_CONTENT {
                            return Ok(Value::Null);
                        }
                        return response
                            .json::<Value>()
                            .await
                            .context("failed to decode wiki API JSON response");
                    }
                    last_error = Some(format!("HTTP {} for {url}", status.as_u16()));
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < self.retries {
                        sleep(Duration::from_millis(
                            self.retry_delay_ms.saturating_mul(attempt as u64 + 1),
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
                            self.retry_delay_ms.saturating_mul(attempt as u64 + 1),
                        ))
                        .await;
                        continue;
                    }
                }
            }
        }
        let message = last_error.unwrap_or_else(|| "wiki API request failed".to_string());
        bail!("{message}")
    }
}

#[async_trait]
impl WikiApi for HttpWikiClient {
    async fn get_page(&self, page_id: &str) -> Result<Page> {
        let payload = self
            .request_json(
                Method::GET,
                &self.api_url(&format!("content/{page_id}")),
                &[("expand", "space,body.storage".to_string())],
                None,
            )
            .await?;
        parse_page(&payload).with_context(|| format!("invalid page payload for {page_id}"))
    }

    async fn get_labels(&self, page_id: &str) -> Result<Vec<String>> {
        let payload = self
            .request_json(
                Method::GET,
                &self.api_url(&format!("content/{page_id}/label")),
                &[("limit", "200".to_string())],
                None,
            )
            .await?;
        let mut labels = Vec::new();
        if let Some(results) = payload.get("results").and_then(Value::as_array) {
            for entry in results {
                if let Some(name) = entry.get("name").and_then(Value::as_str)
                    && !name.trim().is_empty()
                {
                    labels.push(name.to_string());
                }
            }
        }
        Ok(labels)
    }

    async fn add_labels(&self, page_id: &str, labels: &[String]) -> Result<Vec<String>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let body = Value::Array(
            labels
                .iter()
                .map(|name| serde_json::json!({ "prefix": "global", "name": name }))
                .collect(),
        );
        let payload = self
            .request_json(
                Method::POST,
                &self.api_url(&format!("content/{page_id}/label")),
                &[],
                Some(&body),
            )
            .await?;
        // The backend answers with the page's full label set; report the
        // requested names it now carries.
        let mut present = Vec::new();
        if let Some(results) = payload.get("results").and_then(Value::as_array) {
            for entry in results {
                if let Some(name) = entry.get("name").and_then(Value::as_str)
                    && labels.iter().any(|label| label == name)
                {
                    present.push(name.to_string());
                }
            }
            return Ok(present);
        }
        Ok(labels.to_vec())
    }

    async fn remove_labels(&self, page_id: &str, labels: &[String]) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for label in labels {
            let url = self.label_delete_url(page_id, label)?;
            match self
                .request_json(Method::DELETE, url.as_str(), &[], None)
                .await
            {
                Ok(_) => removed.push(label.clone()),
                // A label deleted out from under us is still gone.
                Err(error) if error.to_string().contains("HTTP 404") => {
                    removed.push(label.clone());
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("failed to remove label {label} from {page_id}"));
                }
            }
        }
        Ok(removed)
    }

    async fn get_child_pages(&self, page_id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut start = 0usize;
        loop {
            let payload = self
                .request_json(
                    Method::GET,
                    &self.api_url(&format!("content/{page_id}/child/page")),
                    &[
                        ("start", start.to_string()),
                        ("limit", BACKEND_PAGE_LIMIT.to_string()),
                    ],
                    None,
                )
                .await?;
            let results = payload
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in &results {
                if let Some(id) = entry.get("id").and_then(Value::as_str) {
                    ids.push(id.to_string());
                }
            }
            if results.len() < BACKEND_PAGE_LIMIT {
                break;
            }
            start += results.len();
        }
        Ok(ids)
    }

    async fn get_pages_in_space(&self, space_key: &str) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        let mut start = 0usize;
        loop {
            let payload = self
                .request_json(
                    Method::GET,
                    &self.api_url("content"),
                    &[
                        ("spaceKey", space_key.to_string()),
                        ("type", "page".to_string()),
                        ("expand", "space".to_string()),
                        ("start", start.to_string()),
                        ("limit", BACKEND_PAGE_LIMIT.to_string()),
                    ],
                    None,
                )
                .await?;
            let results = payload
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in &results {
                if let Some(page) = parse_page(entry) {
                    pages.push(page);
                }
            }
            if results.len() < BACKEND_PAGE_LIMIT {
                break;
            }
            start += results.len();
        }
        Ok(pages)
    }

    async fn get_spaces(
        &self,
        query: Option<&str>,
        start: usize,
        limit: usize,
    ) -> Result<SpacePage> {
        let mut params = vec![("start", start.to_string()), ("limit", limit.to_string())];
        if let Some(term) = query {
            params.push(("query", term.to_string()));
        }
        let payload = self
            .request_json(Method::GET, &self.api_url("space"), &params, None)
            .await?;
        let mut spaces = Vec::new();
        if let Some(results) = payload.get("results").and_then(Value::as_array) {
            for entry in results {
                if let Some(space) = parse_space(entry) {
                    spaces.push(space);
                }
            }
        }
        let size = spaces.len();
        Ok(SpacePage {
            start: read_usize(&payload, "start").unwrap_or(start),
            limit: read_usize(&payload, "limit").unwrap_or(limit),
            size: read_usize(&payload, "size").unwrap_or(size),
            total: read_usize(&payload, "totalSize").unwrap_or(size),
            spaces,
        })
    }
}

fn parse_page(payload: &Value) -> Option<Page> {
    let id = payload.get("id").and_then(Value::as_str)?;
    let title = payload
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let space_key = payload
        .get("space")
        .and_then(|space| space.get("key"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let body = payload
        .get("body")
        .and_then(|body| body.get("storage"))
        .and_then(|storage| storage.get("value"))
        .and_then(Value::as_str)
        .map(ToString::to_string);
    Some(Page {
        id: id.to_string(),
        title: title.to_string(),
        space_key: space_key.to_string(),
        body,
    })
}

fn parse_space(payload: &Value) -> Option<Space> {
    let key = payload.get("key").and_then(Value::as_str)?;
    Some(Space {
        key: key.to_string(),
        name: payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(key)
            .to_string(),
        space_type: payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("global")
            .to_string(),
        status: payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("current")
            .to_string(),
    })
}

fn read_usize(payload: &Value, key: &str) -> Option<usize> {
    payload
        .get(key)
        .and_then(Value::as_u64)
        .map(|value| value as usize)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{HttpWikiClient, parse_page, parse_space};
    use crate::config::{
        DEFAULT_BIND, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, DEFAULT_RETRIES,
        DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS, DEFAULT_USER_AGENT, ServiceConfig,
    };

    fn client() -> HttpWikiClient {
        let config = ServiceConfig {
            wiki_base_url: "https://wiki.example.org".to_string(),
            wiki_token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_ms: DEFAULT_TIMEOUT_MS,
            http_retries: DEFAULT_RETRIES,
            http_retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            llm_api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            bind: DEFAULT_BIND.to_string(),
            allow_writes: false,
            sections_file: None,
        };
        HttpWikiClient::new(&config).expect("client")
    }

    #[test]
    fn label_delete_url_encodes_the_label_segment() {
        let url = client()
            .label_delete_url("123", "doc-a/b?c")
            .expect("delete url");
        assert_eq!(
            url.as_str(),
            "https://wiki.example.org/rest/api/content/123/label/doc-a%2Fb%3Fc"
        );
    }

    #[test]
    fn label_delete_url_leaves_plain_labels_alone() {
        let url = client()
            .label_delete_url("123", "doc-guide")
            .expect("delete url");
        assert_eq!(
            url.as_str(),
            "https://wiki.example.org/rest/api/content/123/label/doc-guide"
        );
    }

    #[test]
    fn parse_page_reads_space_and_body() {
        let payload = json!({
            "id": "123",
            "title": "Alpha",
            "space": { "key": "DOCS" },
            "body": { "storage": { "value": "<p>hello</p>" } }
        });
        let page = parse_page(&payload).expect("page");
        assert_eq!(page.id, "123");
        assert_eq!(page.space_key, "DOCS");
        assert_eq!(page.body.as_deref(), Some("<p>hello</p>"));
    }

    #[test]
    fn parse_page_requires_an_id() {
        assert!(parse_page(&json!({ "title": "No id" })).is_none());
    }

    #[test]
    fn parse_space_defaults_type_and_status() {
        let space = parse_space(&json!({ "key": "OPS" })).expect("space");
        assert_eq!(space.name, "OPS");
        assert_eq!(space.space_type, "global");
        assert_eq!(space.status, "current");
    }
}
