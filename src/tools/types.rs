//! Capability invocation request and result types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorType, ToolError};

/// One invocation request from the decision maker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub capability_id: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Optional targets (slide ids, element ids) the call applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_ids: Vec<String>,

    /// Context merged over the session snapshot for this call's handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl CapabilityCall {
    pub fn new(capability_id: impl Into<String>) -> Self {
        Self {
            capability_id: capability_id.into(),
            ..Default::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_ids = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,

    pub capability_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,
}

impl CapabilityResult {
    pub fn ok(capability_id: impl Into<String>, data: Map<String, Value>, elapsed_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_type: None,
            capability_id: capability_id.into(),
            elapsed_ms: Some(elapsed_ms),
        }
    }

    /// Failed result carrying the error's message and tag.
    pub fn failure(capability_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_type: Some(error.kind()),
            capability_id: capability_id.into(),
            elapsed_ms: None,
        }
    }
}
