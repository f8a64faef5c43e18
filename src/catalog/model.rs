use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{SkyloopError, SkyloopResult};
use crate::timestamp::grammar::{Grammar, GrammarTable};

/// Static description of one remote image feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    /// Unique source key.
    pub key: String,
    /// Human-readable label used in captions.
    #[serde(default)]
    pub label: String,
    /// Directory listing URL; frame hrefs resolve against it.
    pub base_url: String,
    /// Filename grammar for this feed.
    #[serde(alias = "grammarId")]
    pub grammar: Grammar,
    /// Accepted image extensions, without the leading dot.
    #[serde(alias = "fileExtensions")]
    pub extensions: Vec<String>,
    /// Representative "latest" image, used for health probes and latest-only mode.
    #[serde(default)]
    pub latest_url: Option<String>,
}

impl SourceDescriptor {
    /// Label for captions, falling back to the key.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.key
        } else {
            &self.label
        }
    }

    /// Return `true` when `name` ends with one of the accepted extensions (case-insensitive).
    pub fn accepts_extension(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.extensions.iter().any(|ext| {
            let ext = ext.trim_start_matches('.').to_ascii_lowercase();
            lower
                .strip_suffix(ext.as_str())
                .is_some_and(|stem| stem.ends_with('.'))
        })
    }
}

/// The supplied table of feeds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    sources: Vec<SourceDescriptor>,
}

impl Catalog {
    /// Build and validate a catalog from descriptors.
    pub fn new(sources: Vec<SourceDescriptor>) -> SkyloopResult<Self> {
        let catalog = Self { sources };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog JSON array from disk.
    pub fn from_path(path: impl AsRef<Path>) -> SkyloopResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Parse a catalog JSON array.
    pub fn from_json_str(text: &str) -> SkyloopResult<Self> {
        let catalog: Catalog = serde_json::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check key uniqueness and per-source fields.
    pub fn validate(&self) -> SkyloopResult<()> {
        let mut seen = HashSet::new();
        for s in &self.sources {
            if s.key.trim().is_empty() {
                return Err(SkyloopError::validation("source key must be non-empty"));
            }
            if !seen.insert(s.key.as_str()) {
                return Err(SkyloopError::validation(format!(
                    "duplicate source key '{}'",
                    s.key
                )));
            }
            if s.extensions.is_empty() {
                return Err(SkyloopError::validation(format!(
                    "source '{}' must list at least one image extension",
                    s.key
                )));
            }
            reqwest::Url::parse(&s.base_url).map_err(|e| {
                SkyloopError::validation(format!("source '{}' has invalid base_url: {e}", s.key))
            })?;
        }
        Ok(())
    }

    /// Look up a source by key.
    pub fn get(&self, key: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.key == key)
    }

    /// Look up a source by key, failing with a validation error when absent.
    pub fn require(&self, key: &str) -> SkyloopResult<&SourceDescriptor> {
        self.get(key)
            .ok_or_else(|| SkyloopError::validation(format!("unknown source '{key}'")))
    }

    /// All sources in catalog order.
    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Grammar table keyed by source key.
    pub fn grammar_table(&self) -> GrammarTable {
        self.sources
            .iter()
            .map(|s| (s.key.clone(), s.grammar))
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/catalog/model.rs"]
mod tests;
