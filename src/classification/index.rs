//! Keyword index built once from the backend catalog.

use std::collections::BTreeSet;

use crate::catalog::BackendCatalog;

/// One classifiable variant.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub variant_id: String,
    pub backend: String,
    pub display_name: String,
    pub priority: u8,
    /// Lowercase keywords.
    pub keywords: BTreeSet<String>,
}

/// Read-only keyword index over every enabled variant of every enabled backend.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    entries: Vec<IndexEntry>,
}

impl KeywordIndex {
    /// Build from the catalog. Disabled backends and variants whose status
    /// is not invocable are left out.
    pub fn build(catalog: &BackendCatalog) -> Self {
        let mut entries = Vec::new();
        for backend in catalog.enabled_backends() {
            for variant in backend.variants.values() {
                if !variant.status.is_enabled() {
                    log::debug!(
                        "Not indexing {}/{} (status {})",
                        backend.name,
                        variant.variant_id,
                        variant.status.as_str()
                    );
                    continue;
                }
                entries.push(IndexEntry {
                    variant_id: variant.variant_id.clone(),
                    backend: backend.name.clone(),
                    display_name: variant.display_name.clone(),
                    priority: variant.classification.priority,
                    keywords: variant
                        .classification
                        .keywords
                        .iter()
                        .map(|k| k.to_lowercase())
                        .collect(),
                });
            }
        }
        log::info!("Classification index built with {} variants", entries.len());
        Self { entries }
    }

    /// Build directly from entries.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
