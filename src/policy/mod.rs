//! # Policy Gate
//!
//! Decides whether a capability may run, strictly before any side effect.
//! Checks run in a fixed order and the first failure wins:
//!
//! ```text
//! validate_parameters   → ToolError::Validation
//! check_prerequisites   → ToolError::Prerequisite
//! check_approval        → ToolError::ApprovalRequired
//! ```
//!
//! The gate reads the session's decision snapshot and never writes it.

use serde_json::{Map, Value};

use crate::capabilities::CapabilityDefinition;
use crate::error::ToolError;
use crate::session::APPROVAL_FLAG;

/// Stateless authorization checks over a definition and a session snapshot.
#[derive(Debug, Clone)]
pub struct PolicyGate {
    /// Snapshot key holding the explicit-approval flag.
    approval_flag: String,
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self {
            approval_flag: APPROVAL_FLAG.to_string(),
        }
    }
}

impl PolicyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different snapshot key for the approval flag.
    pub fn with_approval_flag(mut self, key: impl Into<String>) -> Self {
        self.approval_flag = key.into();
        self
    }

    /// Check `params` against the declared input schema (first violation only).
    pub fn validate_parameters(
        &self,
        definition: &CapabilityDefinition,
        params: &Map<String, Value>,
    ) -> Result<(), ToolError> {
        definition
            .input_schema
            .validate(params)
            .map_err(|v| ToolError::Validation {
                field: v.field,
                message: v.message,
            })
    }

    /// Every `requires_context` key must be present and truthy, or have a
    /// `has_<key>` flag set to `true`.
    pub fn check_prerequisites(
        &self,
        definition: &CapabilityDefinition,
        session_context: &Map<String, Value>,
    ) -> Result<(), ToolError> {
        for key in &definition.requires_context {
            let present = session_context.get(key).map_or(false, is_truthy);
            let flagged = session_context.get(&format!("has_{}", key)) == Some(&Value::Bool(true));
            if !present && !flagged {
                log::info!(
                    "Capability '{}' blocked: missing session context '{}'",
                    definition.id,
                    key
                );
                return Err(ToolError::Prerequisite {
                    capability_id: definition.id.clone(),
                    message: format!("session context '{}' is not available", key),
                });
            }
        }
        Ok(())
    }

    /// Approval-required capabilities need the explicit-approval flag, unless
    /// `enforce` is off.
    pub fn check_approval(
        &self,
        definition: &CapabilityDefinition,
        session_context: &Map<String, Value>,
        enforce: bool,
    ) -> Result<(), ToolError> {
        if !definition.requires_approval || !enforce {
            return Ok(());
        }
        let approved = session_context.get(&self.approval_flag) == Some(&Value::Bool(true));
        if approved {
            Ok(())
        } else {
            log::info!(
                "Capability '{}' ({} tier) blocked pending user approval",
                definition.id,
                definition.cost_tier.as_str()
            );
            Err(ToolError::ApprovalRequired {
                capability_id: definition.id.clone(),
            })
        }
    }

    /// Run all three checks in order.
    pub fn authorize(
        &self,
        definition: &CapabilityDefinition,
        params: &Map<String, Value>,
        session_context: &Map<String, Value>,
        enforce_approval: bool,
    ) -> Result<(), ToolError> {
        self.validate_parameters(definition, params)?;
        self.check_prerequisites(definition, session_context)?;
        self.check_approval(definition, session_context, enforce_approval)
    }
}

/// JSON truthiness: null, false, 0, "" and empty containers are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CostTier, FieldRule, FieldType, ParameterSchema};
    use serde_json::json;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn content_capability() -> CapabilityDefinition {
        CapabilityDefinition::new("generate_slide_content", CostTier::High)
            .with_input_schema(
                ParameterSchema::new()
                    .field("slides", FieldRule::new(FieldType::Array).required()),
            )
            .requiring_context("strawman")
            .requiring_approval()
    }

    #[test]
    fn test_prerequisite_satisfied_by_context_value() {
        let gate = PolicyGate::new();
        let session = ctx(json!({"strawman": {"slides": [1]}}));
        assert!(gate.check_prerequisites(&content_capability(), &session).is_ok());
    }

    #[test]
    fn test_prerequisite_satisfied_by_has_flag() {
        let gate = PolicyGate::new();
        let session = ctx(json!({"has_strawman": true}));
        assert!(gate.check_prerequisites(&content_capability(), &session).is_ok());
    }

    #[test]
    fn test_prerequisite_falsy_value_fails() {
        let gate = PolicyGate::new();
        for session in [
            json!({}),
            json!({"strawman": ""}),
            json!({"strawman": []}),
            json!({"strawman": null, "has_strawman": false}),
            json!({"has_strawman": "true"}),
        ] {
            let err = gate
                .check_prerequisites(&content_capability(), &ctx(session))
                .unwrap_err();
            assert!(matches!(err, ToolError::Prerequisite { .. }));
            assert!(err.to_string().contains("strawman"));
        }
    }

    #[test]
    fn test_approval_required() {
        let gate = PolicyGate::new();
        let cap = content_capability();

        let err = gate
            .check_approval(&cap, &ctx(json!({"has_explicit_approval": false})), true)
            .unwrap_err();
        assert!(matches!(err, ToolError::ApprovalRequired { .. }));

        assert!(gate
            .check_approval(&cap, &ctx(json!({"has_explicit_approval": true})), true)
            .is_ok());
        assert!(gate.check_approval(&cap, &ctx(json!({})), false).is_ok());
    }

    #[test]
    fn test_high_tier_without_approval_flag_passes() {
        let gate = PolicyGate::new();
        let cap = CapabilityDefinition::new("preview", CostTier::High);
        assert!(gate.check_approval(&cap, &Map::new(), true).is_ok());
    }

    #[test]
    fn test_authorize_order_validation_first() {
        let gate = PolicyGate::new();
        let err = gate
            .authorize(&content_capability(), &Map::new(), &Map::new(), true)
            .unwrap_err();
        match err {
            ToolError::Validation { field, .. } => assert_eq!(field, "slides"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_approval_flag() {
        let gate = PolicyGate::new().with_approval_flag("user_signed_off");
        let cap = content_capability();
        assert!(gate
            .check_approval(&cap, &ctx(json!({"user_signed_off": true})), true)
            .is_ok());
        assert!(gate
            .check_approval(&cap, &ctx(json!({"has_explicit_approval": true})), true)
            .is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!({})));
        assert!(!is_truthy(&Value::Null));
    }
}
