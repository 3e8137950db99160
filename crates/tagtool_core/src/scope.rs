//! Scope resolution: turning a space key or a root page id into the concrete
//! ordered page list a bulk operation will walk. Computed once per request,
//! before any mutation.

use std::collections::{HashSet, VecDeque};

use anyhow::Result;

use crate::wiki::{Page, WikiApi};

/// Fetch the tree root and confirm it lives in the expected space.
pub async fn validate_root_space(
    wiki: &dyn WikiApi,
    root_id: &str,
    space_key: &str,
) -> Result<Page> {
    let root = wiki
        .get_page(root_id)
        .await
        .map_err(|error| anyhow::anyhow!("failed to fetch root page {root_id}: {error:#}"))?;
    if root.space_key != space_key {
        anyhow::bail!(
            "page {root_id} does not belong to space {space_key} (found {})",
            root.space_key
        );
    }
    Ok(root)
}

/// Breadth-first traversal over direct-children listings, root included.
/// A page id seen twice is skipped: the backend promises an acyclic tree,
/// but a malformed back-reference must not loop us forever.
pub async fn collect_tree_ids(wiki: &dyn WikiApi, root_id: &str) -> Result<Vec<String>> {
    let mut visited = HashSet::from([root_id.to_string()]);
    let mut ordered = vec![root_id.to_string()];
    let mut queue = VecDeque::from([root_id.to_string()]);
    while let Some(page_id) = queue.pop_front() {
        let children = wiki
            .get_child_pages(&page_id)
            .await
            .map_err(|error| anyhow::anyhow!("failed to list children of {page_id}: {error:#}"))?;
        for child in children {
            if !visited.insert(child.clone()) {
                log::warn!("page {child} appears twice in tree under {root_id}; skipping");
                continue;
            }
            ordered.push(child.clone());
            queue.push_back(child);
        }
    }
    Ok(ordered)
}
