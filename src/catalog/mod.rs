//! # Backend Catalog
//!
//! Registry of content-generation backends and the variants each owns.
//! Loaded once at startup from YAML (a single `backend:` or a `backends:`
//! list per file) and read-only afterwards; the classification index and
//! the routing dispatcher are both built from it.

pub mod backend;
pub mod variant;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use thiserror::Error;

pub use backend::{BackendConfig, EndpointStrategy, ResponseFields, DEFAULT_TIMEOUT_MS};
pub use variant::{ClassificationMeta, VariantDefinition, VariantStatus, MIN_RECOMMENDED_KEYWORDS};

use crate::capabilities::registry::is_yaml;

/// Errors raised while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// All known backends, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct BackendCatalog {
    backends: BTreeMap<String, BackendConfig>,
}

impl BackendCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, normalize and add a backend. A duplicate name replaces the
    /// previous entry.
    pub fn add_backend(&mut self, mut backend: BackendConfig) -> Result<(), CatalogError> {
        backend.normalize();
        validate_backend(&backend)?;
        if self.backends.contains_key(&backend.name) {
            log::warn!("Backend '{}' already registered; overwriting", backend.name);
        }
        log::debug!(
            "Registered backend '{}' ({}, {} variants)",
            backend.name,
            backend.strategy.kind(),
            backend.variants.len()
        );
        self.backends.insert(backend.name.clone(), backend);
        Ok(())
    }

    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    /// Enabled backends in name order.
    pub fn enabled_backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.values().filter(|b| b.enabled)
    }

    pub fn backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.values()
    }

    pub fn variant(&self, backend: &str, variant_id: &str) -> Option<&VariantDefinition> {
        self.backends.get(backend)?.variant(variant_id)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Replace base addresses by backend name. Unknown names are ignored.
    pub fn apply_url_overrides(&mut self, overrides: &HashMap<String, String>) {
        for (name, url) in overrides {
            match self.backends.get_mut(name) {
                Some(backend) => {
                    log::info!("Backend '{}' base_url overridden: {}", name, url);
                    backend.base_url = url.clone();
                }
                None => log::debug!("URL override for unknown backend '{}' ignored", name),
            }
        }
    }

    /// Timeout for backends that did not declare one.
    pub fn apply_default_timeout(&mut self, timeout_ms: u64) {
        for backend in self.backends.values_mut() {
            if backend.timeout_ms.is_none() {
                backend.timeout_ms = Some(timeout_ms);
            }
        }
    }

    /// Add every backend in a YAML document.
    pub fn load_yaml(&mut self, content: &str) -> Result<usize, CatalogError> {
        if let Ok(single) = serde_yaml::from_str::<BackendWrapper>(content) {
            self.add_backend(single.backend)?;
            return Ok(1);
        }
        let list: BackendListWrapper = serde_yaml::from_str(content)?;
        let count = list.backends.len();
        for backend in list.backends {
            self.add_backend(backend)?;
        }
        Ok(count)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        self.load_yaml(&content)
    }

    /// Load a file, or every YAML file below a directory. Files that fail
    /// to load are logged and skipped.
    pub fn load_path(&mut self, path: &Path) -> Result<usize, CatalogError> {
        if !path.exists() {
            log::warn!("Catalog path {} does not exist", path.display());
            return Ok(0);
        }
        if path.is_file() {
            return self.load_file(path);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.is_dir() {
                count += self.load_path(&entry_path)?;
            } else if is_yaml(&entry_path) {
                match self.load_file(&entry_path) {
                    Ok(n) => count += n,
                    Err(e) => {
                        log::warn!("Skipping catalog file {}: {}", entry_path.display(), e);
                    }
                }
            }
        }
        Ok(count)
    }
}

#[derive(Debug, serde::Deserialize)]
struct BackendWrapper {
    backend: BackendConfig,
}

#[derive(Debug, serde::Deserialize)]
struct BackendListWrapper {
    backends: Vec<BackendConfig>,
}

/// Hard errors reject the backend; incomplete endpoint metadata is only
/// logged, since the adapter reports it per call.
fn validate_backend(backend: &BackendConfig) -> Result<(), CatalogError> {
    if backend.name.trim().is_empty() {
        return Err(CatalogError::Validation("backend name is empty".to_string()));
    }
    if backend.base_url.trim().is_empty() {
        return Err(CatalogError::Validation(format!(
            "backend '{}' has no base_url",
            backend.name
        )));
    }

    for (key, variant) in &backend.variants {
        if variant.variant_id != *key {
            return Err(CatalogError::Validation(format!(
                "backend '{}': variant key '{}' does not match variant_id '{}'",
                backend.name, key, variant.variant_id
            )));
        }
        let priority = variant.classification.priority;
        if !(1..=10).contains(&priority) {
            return Err(CatalogError::Validation(format!(
                "backend '{}': variant '{}' priority {} is outside 1..10",
                backend.name, key, priority
            )));
        }
        if variant.classification.keywords.len() < MIN_RECOMMENDED_KEYWORDS {
            log::debug!(
                "Variant '{}/{}' has {} keywords (recommended: {})",
                backend.name,
                key,
                variant.classification.keywords.len(),
                MIN_RECOMMENDED_KEYWORDS
            );
        }

        match &backend.strategy {
            EndpointStrategy::PerVariant if variant.endpoint.is_none() => {
                log::warn!(
                    "Variant '{}/{}' has no endpoint on a per-variant backend",
                    backend.name,
                    key
                );
            }
            EndpointStrategy::Typed { endpoints, .. } => match variant.service_str("endpoint_key") {
                None => log::warn!(
                    "Variant '{}/{}' has no service_specific.endpoint_key",
                    backend.name,
                    key
                ),
                Some(k) if !endpoints.contains_key(k) => log::warn!(
                    "Variant '{}/{}' endpoint_key '{}' is not in the endpoints table",
                    backend.name,
                    key,
                    k
                ),
                Some(_) => {}
            },
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
backends:
  - name: text
    base_url: "http://text:8000"
    strategy:
      kind: single
      default_endpoint: "/v1.2/generate"
    variants:
      bullets:
        classification:
          priority: 4
          keywords: ["points", "list", "summary", "overview", "agenda"]
  - name: illustrator
    base_url: "http://illustrator:8000"
    enabled: false
    strategy:
      kind: per_variant
    variants:
      pyramid:
        endpoint: "/v1.0/pyramid/generate"
"#;

    #[test]
    fn test_load_backend_list() {
        let mut catalog = BackendCatalog::new();
        assert_eq!(catalog.load_yaml(CATALOG).unwrap(), 2);

        let text = catalog.backend("text").unwrap();
        assert_eq!(text.variants["bullets"].variant_id, "bullets");
        assert_eq!(catalog.variant("illustrator", "pyramid").unwrap().endpoint.as_deref(),
            Some("/v1.0/pyramid/generate"));

        let enabled: Vec<&str> = catalog.enabled_backends().map(|b| b.name.as_str()).collect();
        assert_eq!(enabled, vec!["text"]);
    }

    #[test]
    fn test_load_single_backend() {
        let yaml = r#"
backend:
  name: analytics
  base_url: "http://analytics"
  strategy:
    kind: typed
    endpoints: { chartjs: "/chartjs" }
"#;
        let mut catalog = BackendCatalog::new();
        assert_eq!(catalog.load_yaml(yaml).unwrap(), 1);
        assert!(catalog.backend("analytics").is_some());
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        let backend = BackendConfig::new("text", "http://t", EndpointStrategy::PerVariant)
            .with_variant(VariantDefinition::new("v").with_priority(11));
        let err = BackendCatalog::new().add_backend(backend).unwrap_err();
        assert!(err.to_string().contains("priority 11"));
    }

    #[test]
    fn test_missing_base_url_rejected() {
        let backend = BackendConfig::new("text", " ", EndpointStrategy::PerVariant);
        assert!(matches!(
            BackendCatalog::new().add_backend(backend),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_url_overrides() {
        let mut catalog = BackendCatalog::new();
        catalog.load_yaml(CATALOG).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("text".to_string(), "http://localhost:9000".to_string());
        overrides.insert("ghost".to_string(), "http://nowhere".to_string());
        catalog.apply_url_overrides(&overrides);
        assert_eq!(catalog.backend("text").unwrap().base_url, "http://localhost:9000");
    }

    #[test]
    fn test_default_timeout_fills_undeclared_only() {
        let mut catalog = BackendCatalog::new();
        catalog
            .add_backend(BackendConfig::new("a", "http://a", EndpointStrategy::PerVariant))
            .unwrap();
        catalog
            .add_backend(
                BackendConfig::new("b", "http://b", EndpointStrategy::PerVariant)
                    .with_timeout_ms(90_000),
            )
            .unwrap();
        catalog.apply_default_timeout(10_000);
        assert_eq!(catalog.backend("a").unwrap().timeout_ms(), 10_000);
        assert_eq!(catalog.backend("b").unwrap().timeout_ms(), 90_000);
    }

    #[test]
    fn test_load_path_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("catalog.yaml"), CATALOG).unwrap();
        std::fs::write(dir.path().join("broken.yml"), "backends: {").unwrap();

        let mut catalog = BackendCatalog::new();
        assert_eq!(catalog.load_path(dir.path()).unwrap(), 2);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_load_missing_path() {
        let mut catalog = BackendCatalog::new();
        assert_eq!(catalog.load_path(Path::new("/nonexistent/catalog")).unwrap(), 0);
        assert!(catalog.is_empty());
    }
}
