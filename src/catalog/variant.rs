//! Content-generation variants.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a variant. Only production and beta are invocable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStatus {
    #[default]
    Production,
    Beta,
    Deprecated,
    Experimental,
}

impl VariantStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, VariantStatus::Production | VariantStatus::Beta)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantStatus::Production => "production",
            VariantStatus::Beta => "beta",
            VariantStatus::Deprecated => "deprecated",
            VariantStatus::Experimental => "experimental",
        }
    }
}

/// Keyword metadata consumed by the classification index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMeta {
    /// 1..=10, lower wins.
    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

fn default_priority() -> u8 {
    5
}

impl Default for ClassificationMeta {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            keywords: BTreeSet::new(),
        }
    }
}

/// Recommended minimum keyword count per variant.
pub const MIN_RECOMMENDED_KEYWORDS: usize = 5;

/// A template/flavor of content owned by exactly one backend.
///
/// Example YAML (under a backend's `variants:` map, keyed by id):
/// ```yaml
/// pyramid_3:
///   display_name: "3-level pyramid"
///   status: production
///   endpoint: "/v1.0/pyramid/generate"
///   classification:
///     priority: 2
///     keywords: ["pyramid", "hierarchy", "levels", "tiers", "foundation"]
///   service_specific:
///     count_field: num_levels
///     count: 3
///   required_fields: ["topic"]
///   output_format: html
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDefinition {
    /// Unique within its backend. Filled from the map key when omitted.
    #[serde(default)]
    pub variant_id: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: VariantStatus,

    #[serde(default)]
    pub classification: ClassificationMeta,

    /// Dedicated path, used by per-variant backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Backend-specific metadata (`endpoint_key`, `type_value`, `count_field`, ...).
    #[serde(default)]
    pub service_specific: Map<String, Value>,

    /// Overrides the adapter's default required fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_fields: Option<Vec<String>>,

    /// Overrides the adapter's default optional fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_fields: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Per-variant timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl VariantDefinition {
    pub fn new(variant_id: impl Into<String>) -> Self {
        let variant_id = variant_id.into();
        Self {
            display_name: variant_id.clone(),
            variant_id,
            description: String::new(),
            status: VariantStatus::Production,
            classification: ClassificationMeta::default(),
            endpoint: None,
            service_specific: Map::new(),
            required_fields: None,
            optional_fields: None,
            output_format: None,
            timeout_ms: None,
        }
    }

    pub fn with_status(mut self, status: VariantStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.classification.priority = priority;
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classification.keywords = keywords
            .into_iter()
            .map(|k| k.into().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_service_specific(mut self, key: impl Into<String>, value: Value) -> Self {
        self.service_specific.insert(key.into(), value);
        self
    }

    pub fn with_required_fields(mut self, fields: &[&str]) -> Self {
        self.required_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// A string entry of `service_specific`.
    pub fn service_str(&self, key: &str) -> Option<&str> {
        self.service_specific.get(key).and_then(Value::as_str)
    }

    /// Fill the id from its map key and lowercase keywords.
    pub(crate) fn normalize(&mut self, key: &str) {
        if self.variant_id.is_empty() {
            self.variant_id = key.to_string();
        }
        if self.display_name.is_empty() {
            self.display_name = self.variant_id.clone();
        }
        self.classification.keywords = std::mem::take(&mut self.classification.keywords)
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_enablement() {
        assert!(VariantStatus::Production.is_enabled());
        assert!(VariantStatus::Beta.is_enabled());
        assert!(!VariantStatus::Deprecated.is_enabled());
        assert!(!VariantStatus::Experimental.is_enabled());
    }

    #[test]
    fn test_normalize_fills_id_and_lowercases_keywords() {
        let yaml = r#"
classification:
  priority: 3
  keywords: ["Market ", "SHARE", ""]
"#;
        let mut variant: VariantDefinition = serde_yaml::from_str(yaml).unwrap();
        variant.normalize("pie_chart");
        assert_eq!(variant.variant_id, "pie_chart");
        assert_eq!(variant.display_name, "pie_chart");
        let keywords: Vec<&str> = variant
            .classification
            .keywords
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(keywords, vec!["market", "share"]);
        assert_eq!(variant.status, VariantStatus::Production);
    }

    #[test]
    fn test_builder_keywords_are_lowercase() {
        let variant = VariantDefinition::new("funnel").with_keywords(["Funnel", "Stages"]);
        assert!(variant.classification.keywords.contains("funnel"));
        assert!(variant.classification.keywords.contains("stages"));
    }
}
