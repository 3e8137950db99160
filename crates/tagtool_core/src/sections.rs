use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// A named grouping of wiki pages identified by its known root page ids,
/// carrying the allow-list of labels automated tagging may apply inside it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub root_page_ids: Vec<String>,
    pub allowed_labels: Vec<String>,
}

/// Immutable section table, built once at startup and injected into the
/// services that consult it. Lookup order follows table order: when a root
/// page id appears in more than one section, the first section wins.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SectionRegistry {
    pub sections: Vec<Section>,
}

impl Default for SectionRegistry {
    fn default() -> Self {
        Self {
            sections: vec![
                Section {
                    name: "helpdesk".to_string(),
                    root_page_ids: vec!["19398659".to_string(), "19404831".to_string()],
                    allowed_labels: vec![
                        "doc-howto".to_string(),
                        "doc-troubleshooting".to_string(),
                        "kb-faq".to_string(),
                        "kb-known-issue".to_string(),
                        "tool-jira".to_string(),
                        "tool-servicedesk".to_string(),
                    ],
                },
                Section {
                    name: "rehab".to_string(),
                    root_page_ids: vec!["19431235".to_string()],
                    allowed_labels: vec![
                        "doc-policy".to_string(),
                        "doc-procedure".to_string(),
                        "domain-rehab".to_string(),
                        "kb-faq".to_string(),
                    ],
                },
                Section {
                    name: "personal".to_string(),
                    root_page_ids: vec!["19699862097".to_string()],
                    allowed_labels: vec![
                        "doc-notes".to_string(),
                        "doc-draft".to_string(),
                        "domain-personal".to_string(),
                    ],
                },
            ],
        }
    }
}

impl SectionRegistry {
    /// First section listing `root_id` among its root page ids.
    pub fn detect_section(&self, root_id: &str) -> Result<&str> {
        for section in &self.sections {
            if section.root_page_ids.iter().any(|id| id == root_id) {
                return Ok(&section.name);
            }
        }
        bail!("unknown root page id: {root_id}")
    }

    /// Like [`Self::detect_section`] but substitutes `default` on a miss.
    pub fn detect_section_safe<'a>(&'a self, root_id: &str, default: &'a str) -> &'a str {
        self.detect_section(root_id).unwrap_or(default)
    }

    /// Allow-list of labels for a named section.
    pub fn whitelist(&self, section_name: &str) -> Result<&[String]> {
        for section in &self.sections {
            if section.name == section_name {
                return Ok(&section.allowed_labels);
            }
        }
        bail!("unknown section: {section_name}")
    }
}

/// Load a registry from a TOML file. Returns the built-in table when the
/// file does not exist.
pub fn load_registry(path: &Path) -> Result<SectionRegistry> {
    if !path.exists() {
        return Ok(SectionRegistry::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let registry: SectionRegistry = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if registry.sections.is_empty() {
        bail!("section table in {} is empty", path.display());
    }
    Ok(registry)
}
