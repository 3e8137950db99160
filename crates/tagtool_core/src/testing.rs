//! In-memory collaborators for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::llm::Completer;
use crate::wiki::{Page, Space, SpacePage, WikiApi};

#[derive(Default)]
pub struct MockWiki {
    pub pages: HashMap<String, Page>,
    pub labels: Mutex<HashMap<String, Vec<String>>>,
    pub children: HashMap<String, Vec<String>>,
    pub spaces: Vec<Space>,
    pub space_pages: HashMap<String, Vec<Page>>,
    pub fail_labels_for: HashSet<String>,
    pub add_calls: Mutex<Vec<(String, Vec<String>)>>,
    pub remove_calls: Mutex<Vec<(String, Vec<String>)>>,
    pub space_listing_calls: Mutex<usize>,
}

impl MockWiki {
    pub fn with_page(mut self, id: &str, title: &str, space_key: &str, body: &str) -> Self {
        self.pages.insert(
            id.to_string(),
            Page {
                id: id.to_string(),
                title: title.to_string(),
                space_key: space_key.to_string(),
                body: if body.is_empty() {
                    None
                } else {
                    Some(body.to_string())
                },
            },
        );
        self
    }

    pub fn with_labels(self, id: &str, labels: &[&str]) -> Self {
        self.labels.lock().expect("labels lock").insert(
            id.to_string(),
            labels.iter().map(|label| label.to_string()).collect(),
        );
        self
    }

    pub fn with_children(mut self, id: &str, children: &[&str]) -> Self {
        self.children.insert(
            id.to_string(),
            children.iter().map(|child| child.to_string()).collect(),
        );
        self
    }

    pub fn with_space(mut self, key: &str, name: &str, space_type: &str, status: &str) -> Self {
        self.spaces.push(Space {
            key: key.to_string(),
            name: name.to_string(),
            space_type: space_type.to_string(),
            status: status.to_string(),
        });
        self
    }

    pub fn failing_labels_for(mut self, id: &str) -> Self {
        self.fail_labels_for.insert(id.to_string());
        self
    }

    pub fn remove_call_count(&self) -> usize {
        self.remove_calls.lock().expect("remove lock").len()
    }

    pub fn add_call_count(&self) -> usize {
        self.add_calls.lock().expect("add lock").len()
    }
}

#[async_trait]
impl WikiApi for MockWiki {
    async fn get_page(&self, page_id: &str) -> Result<Page> {
        match self.pages.get(page_id) {
            Some(page) => Ok(page.clone()),
            None => bail!("page not found: {page_id}"),
        }
    }

    async fn get_labels(&self, page_id: &str) -> Result<Vec<String>> {
        if self.fail_labels_for.contains(page_id) {
            bail!("label fetch failed for {page_id}");
        }
        Ok(self
            .labels
            .lock()
            .expect("labels lock")
            .get(page_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_labels(&self, page_id: &str, labels: &[String]) -> Result<Vec<String>> {
        self.add_calls
            .lock()
            .expect("add lock")
            .push((page_id.to_string(), labels.to_vec()));
        let mut stored = self.labels.lock().expect("labels lock");
        let entry = stored.entry(page_id.to_string()).or_default();
        for label in labels {
            if !entry.contains(label) {
                entry.push(label.clone());
            }
        }
        Ok(labels.to_vec())
    }

    async fn remove_labels(&self, page_id: &str, labels: &[String]) -> Result<Vec<String>> {
        self.remove_calls
            .lock()
            .expect("remove lock")
            .push((page_id.to_string(), labels.to_vec()));
        let mut stored = self.labels.lock().expect("labels lock");
        if let Some(entry) = stored.get_mut(page_id) {
            entry.retain(|label| !labels.contains(label));
        }
        Ok(labels.to_vec())
    }

    async fn get_child_pages(&self, page_id: &str) -> Result<Vec<String>> {
        Ok(self.children.get(page_id).cloned().unwrap_or_default())
    }

    async fn get_pages_in_space(&self, space_key: &str) -> Result<Vec<Page>> {
        match self.space_pages.get(space_key) {
            Some(pages) => Ok(pages.clone()),
            None => bail!("space not found: {space_key}"),
        }
    }

    async fn get_spaces(
        &self,
        query: Option<&str>,
        start: usize,
        limit: usize,
    ) -> Result<SpacePage> {
        *self.space_listing_calls.lock().expect("calls lock") += 1;
        // The backend searches name and key, case-insensitively.
        let matching = self
            .spaces
            .iter()
            .filter(|space| match query {
                Some(term) => {
                    let term = term.to_lowercase();
                    space.name.to_lowercase().contains(&term)
                        || space.key.to_lowercase().contains(&term)
                }
                None => true,
            })
            .cloned()
            .collect::<Vec<_>>();
        let total = matching.len();
        let spaces = matching
            .into_iter()
            .skip(start)
            .take(limit)
            .collect::<Vec<_>>();
        let size = spaces.len();
        Ok(SpacePage {
            spaces,
            start,
            limit,
            size,
            total,
        })
    }
}

/// Completer that records every prompt and answers with a fixed reply.
#[derive(Default)]
pub struct MockCompleter {
    pub reply: String,
    pub calls: Mutex<Vec<String>>,
}

impl MockCompleter {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }
}
