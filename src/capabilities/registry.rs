//! Capability catalog: the registry of capability definitions.
//!
//! The catalog is built explicitly at process start and passed by reference
//! to whatever needs it. Definitions come from:
//! 1. Programmatic registration (built-in capabilities)
//! 2. YAML files holding a single `capability:` or a `capabilities:` list
//! 3. Directories of such files (recursive)
//!
//! Registering an id that already exists replaces the prior definition.

use std::collections::HashMap;
use std::path::Path;

use super::capability::{CapabilityDefinition, CostTier};
use crate::error::ToolError;

/// Registry of capability definitions indexed by id.
#[derive(Debug, Default, Clone)]
pub struct CapabilityCatalog {
    capabilities: HashMap<String, CapabilityDefinition>,
}

impl CapabilityCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Last write wins; an overwrite is logged.
    ///
    /// Fails only when the definition's own schema is inconsistent.
    pub fn register(&mut self, definition: CapabilityDefinition) -> Result<(), ToolError> {
        definition
            .input_schema
            .check_consistency()
            .map_err(|v| ToolError::InvalidDefinition {
                capability_id: definition.id.clone(),
                message: format!("input field '{}': {}", v.field, v.message),
            })?;

        if let Some(previous) = self.capabilities.get(&definition.id) {
            log::warn!(
                "Capability '{}' already registered (tier {}); overwriting with tier {}",
                definition.id,
                previous.cost_tier.as_str(),
                definition.cost_tier.as_str()
            );
        } else {
            log::debug!("Registered capability '{}'", definition.id);
        }
        self.capabilities.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Remove a definition. Returns it if it was present.
    pub fn unregister(&mut self, id: &str) -> Option<CapabilityDefinition> {
        let removed = self.capabilities.remove(id);
        if removed.is_none() {
            log::debug!("Unregister of unknown capability '{}'", id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&CapabilityDefinition> {
        self.capabilities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(id)
    }

    /// All definitions, ordered by id.
    pub fn list(&self) -> Vec<&CapabilityDefinition> {
        let mut all: Vec<&CapabilityDefinition> = self.capabilities.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Definitions of one cost tier, ordered by id.
    pub fn list_by_tier(&self, tier: CostTier) -> Vec<&CapabilityDefinition> {
        self.list()
            .into_iter()
            .filter(|c| c.cost_tier == tier)
            .collect()
    }

    /// Case-insensitive substring search over name and description.
    pub fn search_by_description(&self, query: &str) -> Vec<&CapabilityDefinition> {
        let query_lower = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|c| {
                c.description.to_lowercase().contains(&query_lower)
                    || c.name.to_lowercase().contains(&query_lower)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Register every definition in a YAML file.
    pub fn register_from_file(&mut self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        self.register_from_yaml(&content)
    }

    /// Register every definition in a YAML document.
    pub fn register_from_yaml(&mut self, content: &str) -> Result<usize, Box<dyn std::error::Error>> {
        if let Ok(cap) = CapabilityDefinition::from_yaml(content) {
            self.register(cap)?;
            return Ok(1);
        }

        let list: CapabilityListWrapper = serde_yaml::from_str(content)?;
        let count = list.capabilities.len();
        for cap in list.capabilities {
            self.register(cap)?;
        }
        Ok(count)
    }

    /// Load all capability YAML files from a directory (recursive).
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let mut count = 0;
        if !dir.exists() {
            return Ok(0);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                count += self.load_directory(&path)?;
            } else if is_yaml(&path) {
                match self.register_from_file(&path) {
                    Ok(n) => count += n,
                    Err(e) => {
                        log::warn!("Failed to load capability from {}: {}", path.display(), e);
                    }
                }
            }
        }

        Ok(count)
    }
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext == "yaml" || ext == "yml")
}

#[derive(Debug, serde::Deserialize)]
struct CapabilityListWrapper {
    capabilities: Vec<CapabilityDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::schema::{FieldRule, FieldType, ParameterSchema};

    #[test]
    fn test_register_and_get() {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .register(CapabilityDefinition::new("classify_slide", CostTier::Low))
            .unwrap();

        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("classify_slide"));
        assert_eq!(catalog.get("classify_slide").unwrap().cost_tier, CostTier::Low);
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_overwrites() {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .register(CapabilityDefinition::new("render", CostTier::Low))
            .unwrap();
        catalog
            .register(CapabilityDefinition::new("render", CostTier::High))
            .unwrap();

        let all = catalog.list();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].cost_tier, CostTier::High);
    }

    #[test]
    fn test_unregister() {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .register(CapabilityDefinition::new("render", CostTier::Low))
            .unwrap();
        assert!(catalog.unregister("render").is_some());
        assert!(catalog.unregister("render").is_none());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_list_by_tier() {
        let mut catalog = CapabilityCatalog::new();
        catalog.register(CapabilityDefinition::new("a", CostTier::Low)).unwrap();
        catalog.register(CapabilityDefinition::new("b", CostTier::High)).unwrap();
        catalog.register(CapabilityDefinition::new("c", CostTier::High)).unwrap();

        let high: Vec<&str> = catalog
            .list_by_tier(CostTier::High)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(high, vec!["b", "c"]);
        assert!(catalog.list_by_tier(CostTier::Medium).is_empty());
    }

    #[test]
    fn test_inconsistent_schema_rejected() {
        let mut catalog = CapabilityCatalog::new();
        let def = CapabilityDefinition::new("bad", CostTier::Low).with_input_schema(
            ParameterSchema::new().field(
                "n",
                FieldRule::new(FieldType::Integer).with_range(Some(10.0), Some(1.0)),
            ),
        );
        let err = catalog.register(def).unwrap_err();
        assert!(matches!(err, ToolError::InvalidDefinition { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_search_by_description() {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .register(
                CapabilityDefinition::new("classify_slide", CostTier::Low)
                    .with_description("Rank content variants for a slide"),
            )
            .unwrap();
        assert_eq!(catalog.search_by_description("VARIANTS").len(), 1);
        assert!(catalog.search_by_description("chart").is_empty());
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("content");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(
            dir.path().join("single.yaml"),
            "capability:\n  id: one\n  cost_tier: low\n",
        )
        .unwrap();
        std::fs::write(
            nested.join("many.yml"),
            "capabilities:\n  - id: two\n    cost_tier: medium\n  - id: three\n    cost_tier: high\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "capability: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalog = CapabilityCatalog::new();
        let count = catalog.load_directory(dir.path()).unwrap();
        assert_eq!(count, 3);
        assert!(catalog.contains("one"));
        assert!(catalog.contains("three"));
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let mut catalog = CapabilityCatalog::new();
        let count = catalog
            .load_directory(Path::new("/nonexistent/deckhand/capabilities"))
            .unwrap();
        assert_eq!(count, 0);
    }
}
