use std::sync::Arc;

use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;

use tagtool_core::config::ServiceConfig;
use tagtool_core::llm::Completer;
use tagtool_core::reset::TagResetService;
use tagtool_core::sections::SectionRegistry;
use tagtool_core::spaces::{SpaceQuery, SpaceService};
use tagtool_core::tagging::{BulkTagService, summarize_page};
use tagtool_core::tags::parse_categories;
use tagtool_core::wiki::WikiApi;

#[derive(Clone)]
pub struct AppState {
    pub config: ServiceConfig,
    pub registry: Arc<SectionRegistry>,
    pub wiki: Arc<dyn WikiApi>,
    pub llm: Option<Arc<dyn Completer>>,
}

pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    categories: Option<String>,
    dry_run: Option<bool>,
    root_id: Option<String>,
}

/// Bulk tag reset over a space or a page tree. Always answers HTTP 200:
/// scope-validation failures come back embedded in the report body.
pub async fn bulk_reset(
    path: web::Path<String>,
    query: web::Query<ResetQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let space_key = path.into_inner();
    let categories = parse_categories(query.categories.as_deref());
    let dry_run = state.config.effective_dry_run(query.dry_run.unwrap_or(true));

    let service = TagResetService::new(state.wiki.clone());
    let report = match &query.root_id {
        Some(root_id) => {
            service
                .reset_tree(&space_key, root_id, &categories, dry_run)
                .await
        }
        None => service.reset_space(&space_key, &categories, dry_run).await,
    };
    HttpResponse::Ok().json(report)
}

#[derive(Debug, Deserialize)]
pub struct TagQuery {
    dry_run: Option<bool>,
}

/// Whitelist-scoped AI tagging over the tree under `root_id`. Same
/// 200-with-embedded-diagnostics contract as the reset endpoint.
pub async fn bulk_tag(
    path: web::Path<String>,
    query: web::Query<TagQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let Some(llm) = &state.llm else {
        return llm_disabled();
    };
    let root_id = path.into_inner();
    let dry_run = state.config.effective_dry_run(query.dry_run.unwrap_or(true));

    let service = BulkTagService::new(state.wiki.clone(), llm.clone(), state.registry.clone());
    HttpResponse::Ok().json(service.tag_tree(&root_id, dry_run).await)
}

#[derive(Debug, Deserialize)]
pub struct SpacesQuery {
    query: Option<String>,
    start: Option<usize>,
    limit: Option<usize>,
    exclude_types: Option<String>,
    exclude_statuses: Option<String>,
    name_contains: Option<String>,
}

impl SpacesQuery {
    fn to_space_query(&self) -> SpaceQuery {
        SpaceQuery {
            query: self
                .query
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            start: self.start.unwrap_or(0),
            limit: self.limit.unwrap_or(0),
            exclude_types: split_csv(self.exclude_types.as_deref()),
            exclude_statuses: split_csv(self.exclude_statuses.as_deref()),
            name_contains: self
                .name_contains
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }
}

pub async fn list_spaces(
    query: web::Query<SpacesQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let service = SpaceService::new(state.wiki.clone());
    match service.list_spaces(&query.to_space_query()).await {
        Ok(listing) => HttpResponse::Ok().json(listing),
        Err(error) => backend_failure(&error),
    }
}

pub async fn space_meta(
    query: web::Query<SpacesQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let service = SpaceService::new(state.wiki.clone());
    match service.space_meta(&query.to_space_query()).await {
        Ok(meta) => HttpResponse::Ok().json(meta),
        Err(error) => backend_failure(&error),
    }
}

pub async fn page_summary(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let Some(llm) = &state.llm else {
        return llm_disabled();
    };
    let page_id = path.into_inner();
    match summarize_page(state.wiki.as_ref(), llm.as_ref(), &page_id).await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(error) => backend_failure(&error),
    }
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn llm_disabled() -> HttpResponse {
    HttpResponse::ServiceUnavailable()
        .json(json!({ "error": "language-model backend is not configured (LLM_API_KEY)" }))
}

fn backend_failure(error: &anyhow::Error) -> HttpResponse {
    HttpResponse::BadGateway().json(json!({ "error": format!("{error:#}") }))
}
