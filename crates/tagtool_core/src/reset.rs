use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::scope::{collect_tree_ids, validate_root_space};
use crate::tags::filter_by_categories;
use crate::wiki::WikiApi;

/// Per-page outcome of a reset pass. The dry-run and applied variants carry
/// deliberately distinct field names (`to_remove_tags` vs `removed_tags`);
/// downstream consumers key off them to tell simulated from executed runs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageResetOutcome {
    Removed { removed_tags: Vec<String> },
    DryRun { to_remove_tags: Vec<String> },
    NoTags,
    Error { error: String, skipped: bool },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageResetResult {
    pub page_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub outcome: PageResetOutcome,
}

/// Scope-level aggregate. `to_remove` is present only for dry runs, where
/// `removed` is always zero; real runs omit `to_remove` entirely.
#[derive(Debug, Clone, Serialize)]
pub struct ResetSummary {
    pub total: usize,
    pub processed: usize,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_remove: Option<usize>,
    pub no_tags: usize,
    pub errors: usize,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: Vec<PageResetResult>,
}

impl ResetSummary {
    /// Zero-progress summary for a scope that failed validation. Reported
    /// inside an HTTP 200 body; callers inspect the `error` key.
    fn failed(dry_run: bool, message: String) -> Self {
        Self {
            total: 0,
            processed: 0,
            removed: 0,
            to_remove: if dry_run { Some(0) } else { None },
            no_tags: 0,
            errors: 1,
            dry_run,
            error: Some(message),
            details: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResetScope {
    Space,
    Tree,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkResetReport {
    pub scope: ResetScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    #[serde(flatten)]
    pub summary: ResetSummary,
}

/// Removes previously-applied automated labels over a space or page-tree
/// scope, one page at a time, never touching user-owned labels.
pub struct TagResetService {
    wiki: Arc<dyn WikiApi>,
}

impl TagResetService {
    pub fn new(wiki: Arc<dyn WikiApi>) -> Self {
        Self { wiki }
    }

    /// Reset a single page. Every failure is contained here: an error on one
    /// page never aborts the rest of the batch.
    pub async fn reset_page(
        &self,
        page_id: &str,
        title: Option<&str>,
        categories: &[String],
        dry_run: bool,
    ) -> PageResetResult {
        let outcome = match self.reset_page_inner(page_id, categories, dry_run).await {
            Ok(outcome) => outcome,
            Err(error) => PageResetOutcome::Error {
                error: format!("{error:#}"),
                skipped: true,
            },
        };
        PageResetResult {
            page_id: page_id.to_string(),
            title: title.map(ToString::to_string),
            outcome,
        }
    }

    async fn reset_page_inner(
        &self,
        page_id: &str,
        categories: &[String],
        dry_run: bool,
    ) -> Result<PageResetOutcome> {
        let labels = self.wiki.get_labels(page_id).await?;
        let to_remove = filter_by_categories(&labels, categories);
        if to_remove.is_empty() {
            return Ok(PageResetOutcome::NoTags);
        }
        if dry_run {
            return Ok(PageResetOutcome::DryRun {
                to_remove_tags: to_remove,
            });
        }
        let removed = self.wiki.remove_labels(page_id, &to_remove).await?;
        Ok(PageResetOutcome::Removed {
            removed_tags: removed,
        })
    }

    /// Reset every page of a space.
    pub async fn reset_space(
        &self,
        space_key: &str,
        categories: &[String],
        dry_run: bool,
    ) -> BulkResetReport {
        let summary = match self.wiki.get_pages_in_space(space_key).await {
            Ok(pages) => {
                let targets = pages
                    .into_iter()
                    .map(|page| (page.id, Some(page.title)))
                    .collect::<Vec<_>>();
                self.reset_over(targets, categories, dry_run).await
            }
            Err(error) => ResetSummary::failed(
                dry_run,
                format!("failed to list pages in space {space_key}: {error:#}"),
            ),
        };
        BulkResetReport {
            scope: ResetScope::Space,
            root_id: None,
            summary,
        }
    }

    /// Reset a root page and all of its transitive descendants. The root's
    /// space membership is validated before anything is touched.
    pub async fn reset_tree(
        &self,
        space_key: &str,
        root_id: &str,
        categories: &[String],
        dry_run: bool,
    ) -> BulkResetReport {
        let summary = match self.resolve_tree(space_key, root_id).await {
            Ok(page_ids) => {
                let targets = page_ids
                    .into_iter()
                    .map(|id| (id, None))
                    .collect::<Vec<_>>();
                self.reset_over(targets, categories, dry_run).await
            }
            Err(error) => ResetSummary::failed(dry_run, format!("{error:#}")),
        };
        BulkResetReport {
            scope: ResetScope::Tree,
            root_id: Some(root_id.to_string()),
            summary,
        }
    }

    /// Validate the root, then resolve the full descendant list up front.
    async fn resolve_tree(&self, space_key: &str, root_id: &str) -> Result<Vec<String>> {
        validate_root_space(self.wiki.as_ref(), root_id, space_key).await?;
        collect_tree_ids(self.wiki.as_ref(), root_id).await
    }

    /// Sequential aggregation over a resolved scope: a page's reset completes
    /// before the next page's fetch begins.
    async fn reset_over(
        &self,
        targets: Vec<(String, Option<String>)>,
        categories: &[String],
        dry_run: bool,
    ) -> ResetSummary {
        let total = targets.len();
        let mut removed = 0usize;
        let mut to_remove = 0usize;
        let mut no_tags = 0usize;
        let mut errors = 0usize;
        let mut details = Vec::with_capacity(total);

        for (page_id, title) in targets {
            let result = self
                .reset_page(&page_id, title.as_deref(), categories, dry_run)
                .await;
            match &result.outcome {
                PageResetOutcome::Removed { .. } => removed += 1,
                PageResetOutcome::DryRun { .. } => to_remove += 1,
                PageResetOutcome::NoTags => no_tags += 1,
                PageResetOutcome::Error { error, .. } => {
                    log::warn!("reset failed for page {page_id}: {error}");
                    errors += 1;
                }
            }
            details.push(result);
        }

        ResetSummary {
            total,
            processed: details.len(),
            removed: if dry_run { 0 } else { removed },
            to_remove: if dry_run { Some(to_remove) } else { None },
            no_tags,
            errors,
            dry_run,
            error: None,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::{PageResetOutcome, TagResetService};
    use crate::testing::MockWiki;
    use crate::wiki::Page;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn service(wiki: MockWiki) -> (Arc<MockWiki>, TagResetService) {
        let wiki = Arc::new(wiki);
        (wiki.clone(), TagResetService::new(wiki))
    }

    #[tokio::test]
    async fn dry_run_reports_candidates_without_mutating() {
        let (wiki, service) = service(
            MockWiki::default()
                .with_page("1", "Alpha", "DOCS", "")
                .with_labels("1", &["doc-howto", "handmade", "kb-faq"]),
        );

        let result = service.reset_page("1", Some("Alpha"), &[], true).await;
        assert_eq!(
            result.outcome,
            PageResetOutcome::DryRun {
                to_remove_tags: strings(&["doc-howto", "kb-faq"])
            }
        );
        assert_eq!(wiki.remove_call_count(), 0);

        let json = serde_json::to_value(&result).expect("serialize");
        assert!(json.get("to_remove_tags").is_some());
        assert!(json.get("removed_tags").is_none());
        assert_eq!(json["status"], Value::from("dry_run"));
    }

    #[tokio::test]
    async fn real_run_removes_and_reports_removed_tags() {
        let (wiki, service) = service(
            MockWiki::default()
                .with_page("1", "Alpha", "DOCS", "")
                .with_labels("1", &["doc-howto", "handmade"]),
        );

        let result = service.reset_page("1", None, &[], false).await;
        assert_eq!(
            result.outcome,
            PageResetOutcome::Removed {
                removed_tags: strings(&["doc-howto"])
            }
        );
        assert_eq!(wiki.remove_call_count(), 1);

        let json = serde_json::to_value(&result).expect("serialize");
        assert!(json.get("removed_tags").is_some());
        assert!(json.get("to_remove_tags").is_none());
        // User-owned label survives.
        let labels = wiki.labels.lock().expect("labels");
        assert_eq!(labels["1"], strings(&["handmade"]));
    }

    #[tokio::test]
    async fn page_without_automated_labels_is_no_tags() {
        let (wiki, service) = service(
            MockWiki::default()
                .with_page("1", "Alpha", "DOCS", "")
                .with_labels("1", &["handmade", "draft"]),
        );
        let result = service.reset_page("1", None, &[], false).await;
        assert_eq!(result.outcome, PageResetOutcome::NoTags);
        assert_eq!(wiki.remove_call_count(), 0);
    }

    #[tokio::test]
    async fn category_filter_restricts_removal_set() {
        let (_, service) = service(
            MockWiki::default().with_labels("1", &["doc-howto", "kb-faq", "tool-jira"]),
        );
        let result = service
            .reset_page("1", None, &strings(&["kb"]), true)
            .await;
        assert_eq!(
            result.outcome,
            PageResetOutcome::DryRun {
                to_remove_tags: strings(&["kb-faq"])
            }
        );
    }

    #[tokio::test]
    async fn dry_run_is_idempotent_on_an_unchanged_page() {
        let (_, service) =
            service(MockWiki::default().with_labels("1", &["doc-a", "domain-b"]));
        let first = service.reset_page("1", None, &[], true).await;
        let second = service.reset_page("1", None, &[], true).await;
        assert_eq!(first.outcome, second.outcome);
    }

    #[tokio::test]
    async fn per_page_error_does_not_abort_the_batch() {
        let mut wiki = MockWiki::default()
            .with_labels("1", &["doc-a"])
            .with_labels("3", &["kb-b"])
            .failing_labels_for("2");
        wiki.space_pages.insert(
            "DOCS".to_string(),
            ["1", "2", "3"]
                .iter()
                .map(|id| Page {
                    id: id.to_string(),
                    title: format!("Page {id}"),
                    space_key: "DOCS".to_string(),
                    body: None,
                })
                .collect(),
        );
        let (_, service) = service(wiki);

        let report = service.reset_space("DOCS", &[], false).await;
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.processed, 3);
        assert_eq!(report.summary.removed, 2);
        assert_eq!(report.summary.errors, 1);
        assert!(matches!(
            report.summary.details[1].outcome,
            PageResetOutcome::Error { .. }
        ));
        assert!(matches!(
            report.summary.details[2].outcome,
            PageResetOutcome::Removed { .. }
        ));
    }

    #[tokio::test]
    async fn dry_run_summary_reports_zero_removed_and_a_to_remove_count() {
        let mut wiki = MockWiki::default()
            .with_labels("1", &["doc-a"])
            .with_labels("2", &["handmade"]);
        wiki.space_pages.insert(
            "DOCS".to_string(),
            ["1", "2"]
                .iter()
                .map(|id| Page {
                    id: id.to_string(),
                    title: String::new(),
                    space_key: "DOCS".to_string(),
                    body: None,
                })
                .collect(),
        );
        let (_, service) = service(wiki);

        let report = service.reset_space("DOCS", &[], true).await;
        assert_eq!(report.summary.removed, 0);
        assert_eq!(report.summary.to_remove, Some(1));
        assert_eq!(report.summary.no_tags, 1);

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["to_remove"], serde_json::json!(1));
        assert_eq!(json["scope"], serde_json::json!("space"));
    }

    #[tokio::test]
    async fn real_summary_omits_to_remove() {
        let mut wiki = MockWiki::default().with_labels("1", &["doc-a"]);
        wiki.space_pages.insert(
            "DOCS".to_string(),
            vec![Page {
                id: "1".to_string(),
                title: String::new(),
                space_key: "DOCS".to_string(),
                body: None,
            }],
        );
        let (_, service) = service(wiki);

        let report = service.reset_space("DOCS", &[], false).await;
        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json.get("to_remove").is_none());
        assert_eq!(json["removed"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn tree_reset_validates_root_space_membership() {
        let (wiki, service) = service(
            MockWiki::default()
                .with_page("10", "Root", "DIFFERENT", "")
                .with_labels("10", &["doc-a"]),
        );

        let report = service.reset_tree("EXPECTED", "10", &[], false).await;
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.errors, 1);
        let message = report.summary.error.expect("error message");
        assert!(message.contains("does not belong to space"));
        assert_eq!(wiki.remove_call_count(), 0);
    }

    #[tokio::test]
    async fn tree_reset_with_missing_root_is_a_zero_progress_report() {
        let (wiki, service) = service(MockWiki::default());
        let report = service.reset_tree("DOCS", "nope", &[], false).await;
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.errors, 1);
        assert!(report.summary.error.is_some());
        assert_eq!(wiki.remove_call_count(), 0);
    }

    #[tokio::test]
    async fn tree_reset_walks_descendants_breadth_first() {
        let (_, service) = service(
            MockWiki::default()
                .with_page("10", "Root", "DOCS", "")
                .with_children("10", &["11", "12"])
                .with_children("11", &["13"])
                .with_labels("10", &["doc-a"])
                .with_labels("13", &["kb-b"]),
        );

        let report = service.reset_tree("DOCS", "10", &[], true).await;
        assert_eq!(report.summary.total, 4);
        let order = report
            .summary
            .details
            .iter()
            .map(|detail| detail.page_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, ["10", "11", "12", "13"]);
        assert_eq!(report.summary.to_remove, Some(2));
        assert_eq!(report.root_id.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn repeated_child_id_is_visited_only_once() {
        let (_, service) = service(
            MockWiki::default()
                .with_page("10", "Root", "DOCS", "")
                .with_children("10", &["11"])
                .with_children("11", &["10", "12"]),
        );
        let report = service.reset_tree("DOCS", "10", &[], true).await;
        assert_eq!(report.summary.total, 3);
        assert!(report.summary.error.is_none());
    }
}
