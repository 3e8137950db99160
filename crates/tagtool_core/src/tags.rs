/// Category prefixes that mark a label as applied by automated tagging.
/// Labels outside these categories are user-owned and never touched.
pub const AUTOMATED_CATEGORIES: [&str; 4] = ["doc", "domain", "kb", "tool"];

/// Category of an automated label, `None` for user-owned labels.
pub fn category_of(label: &str) -> Option<&'static str> {
    AUTOMATED_CATEGORIES
        .iter()
        .copied()
        .find(|category| is_in_category(label, category))
}

pub fn is_automated(label: &str) -> bool {
    category_of(label).is_some()
}

/// Exact `"{category}-"` prefix match; a category name appearing elsewhere
/// in the label does not count.
fn is_in_category(label: &str, category: &str) -> bool {
    label
        .strip_prefix(category)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some()
}

/// Subset of `labels` eligible for removal. Empty `categories` means every
/// automated label; otherwise only labels whose category is listed.
pub fn filter_by_categories(labels: &[String], categories: &[String]) -> Vec<String> {
    labels
        .iter()
        .filter(|label| {
            if categories.is_empty() {
                is_automated(label)
            } else {
                categories
                    .iter()
                    .any(|category| is_in_category(label, category))
            }
        })
        .cloned()
        .collect()
}

/// Parse a comma-separated category query parameter into trimmed names.
pub fn parse_categories(raw: Option<&str>) -> Vec<String> {
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
