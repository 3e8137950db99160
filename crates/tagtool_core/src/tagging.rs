use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::convert::storage_to_text;
use crate::llm::{Completer, label_prompt, parse_label_reply, summary_prompt};
use crate::scope::collect_tree_ids;
use crate::sections::SectionRegistry;
use crate::tags::is_automated;
use crate::wiki::WikiApi;

/// Per-page outcome of a tagging pass, the mirror image of the reset
/// outcome: `to_add_tags` for simulated runs, `added_tags` for real ones.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageTagOutcome {
    Tagged { added_tags: Vec<String> },
    DryRun { to_add_tags: Vec<String> },
    NoTags,
    Error { error: String, skipped: bool },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageTagResult {
    pub page_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub outcome: PageTagOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkTagReport {
    pub root_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub total: usize,
    pub processed: usize,
    pub added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_add: Option<usize>,
    pub no_tags: usize,
    pub errors: usize,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: Vec<PageTagResult>,
}

impl BulkTagReport {
    fn failed(root_id: &str, dry_run: bool, message: String) -> Self {
        Self {
            root_id: root_id.to_string(),
            section: None,
            total: 0,
            processed: 0,
            added: 0,
            to_add: if dry_run { Some(0) } else { None },
            no_tags: 0,
            errors: 1,
            dry_run,
            error: Some(message),
            details: Vec::new(),
        }
    }
}

/// Applies AI-proposed labels across a page tree, gated by the section
/// whitelist so only pre-approved labels ever reach the wiki.
pub struct BulkTagService {
    wiki: Arc<dyn WikiApi>,
    llm: Arc<dyn Completer>,
    registry: Arc<SectionRegistry>,
}

impl BulkTagService {
    pub fn new(
        wiki: Arc<dyn WikiApi>,
        llm: Arc<dyn Completer>,
        registry: Arc<SectionRegistry>,
    ) -> Self {
        Self {
            wiki,
            llm,
            registry,
        }
    }

    /// Tag the tree rooted at `root_id`. The root must belong to a known
    /// section; an unrecognized root is a zero-progress report, not an error
    /// at the HTTP boundary.
    pub async fn tag_tree(&self, root_id: &str, dry_run: bool) -> BulkTagReport {
        let section = match self.registry.detect_section(root_id) {
            Ok(section) => section.to_string(),
            Err(error) => return BulkTagReport::failed(root_id, dry_run, format!("{error:#}")),
        };
        let whitelist = match self.registry.whitelist(&section) {
            Ok(labels) => labels.to_vec(),
            Err(error) => return BulkTagReport::failed(root_id, dry_run, format!("{error:#}")),
        };
        let page_ids = match collect_tree_ids(self.wiki.as_ref(), root_id).await {
            Ok(ids) => ids,
            Err(error) => return BulkTagReport::failed(root_id, dry_run, format!("{error:#}")),
        };

        let total = page_ids.len();
        let mut added = 0usize;
        let mut to_add = 0usize;
        let mut no_tags = 0usize;
        let mut errors = 0usize;
        let mut details = Vec::with_capacity(total);

        for page_id in page_ids {
            let result = self.tag_page(&page_id, &whitelist, dry_run).await;
            match &result.outcome {
                PageTagOutcome::Tagged { .. } => added += 1,
                PageTagOutcome::DryRun { .. } => to_add += 1,
                PageTagOutcome::NoTags => no_tags += 1,
                PageTagOutcome::Error { error, .. } => {
                    log::warn!("tagging failed for page {page_id}: {error}");
                    errors += 1;
                }
            }
            details.push(result);
        }

        BulkTagReport {
            root_id: root_id.to_string(),
            section: Some(section),
            total,
            processed: details.len(),
            added: if dry_run { 0 } else { added },
            to_add: if dry_run { Some(to_add) } else { None },
            no_tags,
            errors,
            dry_run,
            error: None,
            details,
        }
    }

    /// Tag a single page; failures are contained here so one bad page never
    /// aborts the batch.
    pub async fn tag_page(
        &self,
        page_id: &str,
        whitelist: &[String],
        dry_run: bool,
    ) -> PageTagResult {
        let mut title = None;
        let outcome = match self
            .tag_page_inner(page_id, whitelist, dry_run, &mut title)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => PageTagOutcome::Error {
                error: format!("{error:#}"),
                skipped: true,
            },
        };
        PageTagResult {
            page_id: page_id.to_string(),
            title,
            outcome,
        }
    }

    async fn tag_page_inner(
        &self,
        page_id: &str,
        whitelist: &[String],
        dry_run: bool,
        title: &mut Option<String>,
    ) -> Result<PageTagOutcome> {
        let page = self.wiki.get_page(page_id).await?;
        *title = Some(page.title.clone());
        let existing = self.wiki.get_labels(page_id).await?;

        let text = storage_to_text(page.body.as_deref().unwrap_or_default());
        let reply = self
            .llm
            .complete(&label_prompt(&page.title, &text, whitelist))
            .await
            .context("label completion failed")?;

        let to_add = parse_label_reply(&reply)
            .into_iter()
            .filter(|label| is_automated(label))
            .filter(|label| whitelist.contains(label))
            .filter(|label| !existing.contains(label))
            .collect::<Vec<_>>();

        if to_add.is_empty() {
            return Ok(PageTagOutcome::NoTags);
        }
        if dry_run {
            return Ok(PageTagOutcome::DryRun {
                to_add_tags: to_add,
            });
        }
        let added = self.wiki.add_labels(page_id, &to_add).await?;
        Ok(PageTagOutcome::Tagged { added_tags: added })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub page_id: String,
    pub title: String,
    pub summary: String,
}

/// Fetch one page, flatten its body and ask the model for a short summary.
/// Read-only; wiki or model failures propagate to the caller.
pub async fn summarize_page(
    wiki: &dyn WikiApi,
    llm: &dyn Completer,
    page_id: &str,
) -> Result<PageSummary> {
    let page = wiki.get_page(page_id).await?;
    let text = storage_to_text(page.body.as_deref().unwrap_or_default());
    let summary = llm
        .complete(&summary_prompt(&page.title, &text))
        .await
        .context("summary completion failed")?;
    Ok(PageSummary {
        page_id: page.id,
        title: page.title,
        summary,
    })
}
