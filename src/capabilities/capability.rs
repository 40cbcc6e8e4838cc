//! Capability definition: the unit of invocable functionality.
//!
//! A capability declares its parameter contract, its cost tier, the session
//! context it depends on, and whether the user must approve it first.
//! Definitions are immutable once registered.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::schema::ParameterSchema;

/// Coarse cost category of a capability.
///
/// The tier does not force approval by itself; approval is the independent
/// `requires_approval` flag. HIGH-tier content generation sets it by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Low,
    Medium,
    High,
}

impl CostTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostTier::Low => "low",
            CostTier::Medium => "medium",
            CostTier::High => "high",
        }
    }
}

impl std::str::FromStr for CostTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(CostTier::Low),
            "medium" => Ok(CostTier::Medium),
            "high" => Ok(CostTier::High),
            other => Err(format!("unknown cost tier: {}", other)),
        }
    }
}

/// A registered capability.
///
/// Example YAML:
/// ```yaml
/// capability:
///   id: "generate_slide_content"
///   name: "Generate slide content"
///   description: "Render slide bodies through the content backends"
///   cost_tier: high
///   requires_approval: true
///   requires_context: ["strawman"]
///   input_schema:
///     slides: { type: array, required: true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    /// Unique identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub cost_tier: CostTier,

    #[serde(default)]
    pub input_schema: ParameterSchema,

    /// Declared shape of the handler's output. Informational only.
    #[serde(default)]
    pub output_schema: ParameterSchema,

    /// Session context keys that must be present and truthy (or flagged
    /// via `has_<key>`) before the capability may run.
    #[serde(default)]
    pub requires_context: BTreeSet<String>,

    #[serde(default)]
    pub requires_approval: bool,
}

impl CapabilityDefinition {
    pub fn new(id: impl Into<String>, cost_tier: CostTier) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            cost_tier,
            input_schema: ParameterSchema::default(),
            output_schema: ParameterSchema::default(),
            requires_context: BTreeSet::new(),
            requires_approval: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input_schema(mut self, schema: ParameterSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: ParameterSchema) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn requiring_context(mut self, key: impl Into<String>) -> Self {
        self.requires_context.insert(key.into());
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Parse a capability nested under a `capability:` key.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let wrapper: CapabilityWrapper = serde_yaml::from_str(yaml)?;
        Ok(wrapper.capability)
    }
}

#[derive(Debug, Deserialize)]
struct CapabilityWrapper {
    capability: CapabilityDefinition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capability_yaml() {
        let yaml = r#"
capability:
  id: "generate_slide_content"
  name: "Generate slide content"
  description: "Render slide bodies through the content backends"
  cost_tier: high
  requires_approval: true
  requires_context: ["strawman"]
  input_schema:
    slides:
      type: array
      required: true
"#;
        let cap = CapabilityDefinition::from_yaml(yaml).unwrap();
        assert_eq!(cap.id, "generate_slide_content");
        assert_eq!(cap.cost_tier, CostTier::High);
        assert!(cap.requires_approval);
        assert!(cap.requires_context.contains("strawman"));
        assert_eq!(cap.input_schema.required_fields(), vec!["slides"]);
        assert!(cap.output_schema.is_empty());
    }

    #[test]
    fn test_approval_defaults_off_regardless_of_tier() {
        let yaml = r#"
capability:
  id: "expensive_preview"
  cost_tier: high
"#;
        let cap = CapabilityDefinition::from_yaml(yaml).unwrap();
        assert!(!cap.requires_approval);
    }

    #[test]
    fn test_cost_tier_from_str() {
        assert_eq!("HIGH".parse::<CostTier>().unwrap(), CostTier::High);
        assert_eq!("low".parse::<CostTier>().unwrap(), CostTier::Low);
        assert!("extreme".parse::<CostTier>().is_err());
    }
}
