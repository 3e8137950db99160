use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::wiki::{Space, WikiApi};

/// Cap on the page size requested from the backend while filtering.
const MAX_BACKEND_PAGE_SIZE: usize = 100;
/// Cap on backend round-trips per filtered listing request.
const MAX_FETCH_PAGES: usize = 10;
const FETCH_MULTIPLIER: usize = 3;

pub const DEFAULT_LIST_LIMIT: usize = 25;

#[derive(Debug, Clone, Default)]
pub struct SpaceQuery {
    /// Backend search term, forwarded as-is to the listing call. Distinct
    /// from `name_contains`, which filters after the fetch.
    pub query: Option<String>,
    pub start: usize,
    pub limit: usize,
    pub exclude_types: Vec<String>,
    pub exclude_statuses: Vec<String>,
    pub name_contains: Option<String>,
}

impl SpaceQuery {
    fn has_filters(&self) -> bool {
        !self.exclude_types.is_empty()
            || !self.exclude_statuses.is_empty()
            || self.name_contains.is_some()
    }

    fn limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIST_LIMIT
        } else {
            self.limit
        }
    }
}

/// Listing result. In the filtered case `total` counts every filtered match
/// accumulated before truncation, not the backend's unfiltered total.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceListing {
    pub spaces: Vec<Space>,
    pub start: usize,
    pub limit: usize,
    pub size: usize,
    pub total: usize,
}

/// Aggregated counts over a (possibly filtered) listing, for `/spaces/meta`.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceMeta {
    pub total: usize,
    pub types: BTreeMap<String, usize>,
    pub statuses: BTreeMap<String, usize>,
}

pub struct SpaceService {
    wiki: Arc<dyn WikiApi>,
}

impl SpaceService {
    pub fn new(wiki: Arc<dyn WikiApi>) -> Self {
        Self { wiki }
    }

    /// List spaces. Without filters this is a single-page pass-through to
    /// the backend; with filters active, pagination restarts from offset
    /// zero and backend pages are accumulated until the caller's limit is
    /// satisfied or the backend runs short.
    pub async fn list_spaces(&self, query: &SpaceQuery) -> Result<SpaceListing> {
        let limit = query.limit();
        if !query.has_filters() {
            let page = self
                .wiki
                .get_spaces(query.query.as_deref(), query.start, limit)
                .await?;
            return Ok(SpaceListing {
                spaces: page.spaces,
                start: page.start,
                limit: page.limit,
                size: page.size,
                total: page.total,
            });
        }

        let matches = self.collect_filtered(query).await?;
        let total = matches.len();
        let spaces = matches.into_iter().take(limit).collect::<Vec<_>>();
        let size = spaces.len();
        Ok(SpaceListing {
            spaces,
            start: 0,
            limit,
            size,
            total,
        })
    }

    /// Count types and statuses over the same accumulation `list_spaces`
    /// would filter.
    pub async fn space_meta(&self, query: &SpaceQuery) -> Result<SpaceMeta> {
        let spaces = if query.has_filters() {
            self.collect_filtered(query).await?
        } else {
            self.wiki
                .get_spaces(query.query.as_deref(), query.start, query.limit())
                .await?
                .spaces
        };

        let mut types = BTreeMap::new();
        let mut statuses = BTreeMap::new();
        for space in &spaces {
            *types.entry(space.space_type.clone()).or_insert(0usize) += 1;
            *statuses.entry(space.status.clone()).or_insert(0usize) += 1;
        }
        Ok(SpaceMeta {
            total: spaces.len(),
            types,
            statuses,
        })
    }

    async fn collect_filtered(&self, query: &SpaceQuery) -> Result<Vec<Space>> {
        let limit = query.limit();
        let fetch_limit = limit
            .saturating_mul(FETCH_MULTIPLIER)
            .min(MAX_BACKEND_PAGE_SIZE);
        let mut matches = Vec::new();
        let mut offset = 0usize;

        for _ in 0..MAX_FETCH_PAGES {
            let page = self
                .wiki
                .get_spaces(query.query.as_deref(), offset, fetch_limit)
                .await?;
            let fetched = page.spaces.len();
            for space in page.spaces {
                if keep_space(&space, query) {
                    matches.push(space);
                }
            }
            if matches.len() >= limit || fetched < fetch_limit {
                break;
            }
            offset += fetched;
        }
        Ok(matches)
    }
}

/// Name filter first, then the exclusion sets: a space is dropped when its
/// type or its status is excluded (independent sets, logical OR).
fn keep_space(space: &Space, query: &SpaceQuery) -> bool {
    if let Some(fragment) = &query.name_contains
        && !space
            .name
            .to_lowercase()
            .contains(&fragment.to_lowercase())
    {
        return false;
    }
    if query.exclude_types.contains(&space.space_type) {
        return false;
    }
    if query.exclude_statuses.contains(&space.status) {
        return false;
    }
    true
}
