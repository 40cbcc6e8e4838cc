//! Backend configuration and endpoint-resolution strategies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::variant::VariantDefinition;

/// Default per-backend timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// How a backend maps a variant to its HTTP target path.
///
/// Fixed per backend, never mixed within one backend's variant set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointStrategy {
    /// One shared endpoint; the variant id travels in the body.
    Single {
        default_endpoint: String,
        /// Body field carrying the variant id.
        #[serde(default = "default_discriminator")]
        discriminator: String,
    },
    /// Each variant owns `variant.endpoint`.
    PerVariant,
    /// Path looked up by `variant.service_specific.endpoint_key` in `endpoints`.
    Typed {
        endpoints: BTreeMap<String, String>,
        /// Body field carrying the variant's type value.
        #[serde(default = "default_type_field")]
        type_field: String,
    },
}

fn default_discriminator() -> String {
    "variant_id".to_string()
}

fn default_type_field() -> String {
    "chart_type".to_string()
}

impl EndpointStrategy {
    /// Tag stamped on normalized responses as `backend_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointStrategy::Single { .. } => "single",
            EndpointStrategy::PerVariant => "per_variant",
            EndpointStrategy::Typed { .. } => "typed",
        }
    }
}

/// Names of the content fields in a backend's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFields {
    /// Required; renamed to `content`.
    pub primary: String,
    /// Optional; renamed to `annotation`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

impl ResponseFields {
    /// Default field names for a strategy's contract shape.
    pub fn default_for(strategy: &EndpointStrategy) -> Self {
        match strategy {
            EndpointStrategy::Single { .. } => Self {
                primary: "content".to_string(),
                secondary: None,
            },
            EndpointStrategy::PerVariant => Self {
                primary: "html".to_string(),
                secondary: None,
            },
            EndpointStrategy::Typed { .. } => Self {
                primary: "chart_html".to_string(),
                secondary: Some("observations".to_string()),
            },
        }
    }
}

fn default_true() -> bool {
    true
}

/// An external content-generation service.
///
/// Example YAML:
/// ```yaml
/// backend:
///   name: analytics
///   base_url: "http://analytics:8080"
///   strategy:
///     kind: typed
///     type_field: chart_type
///     endpoints:
///       chartjs: "/api/v1/chartjs"
///       d3: "/api/v1/d3"
///   response:
///     primary: chart_html
///     secondary: observations
///   variants:
///     pie_chart:
///       service_specific: { endpoint_key: chartjs, type_value: pie }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique backend name.
    pub name: String,

    pub base_url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub strategy: EndpointStrategy,

    /// Falls back to the catalog-wide default when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Response field names; strategy defaults when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseFields>,

    #[serde(default)]
    pub variants: BTreeMap<String, VariantDefinition>,
}

impl BackendConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        strategy: EndpointStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            enabled: true,
            strategy,
            timeout_ms: None,
            response: None,
            variants: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, variant: VariantDefinition) -> Self {
        self.variants.insert(variant.variant_id.clone(), variant);
        self
    }

    pub fn with_response_fields(mut self, fields: ResponseFields) -> Self {
        self.response = Some(fields);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn variant(&self, variant_id: &str) -> Option<&VariantDefinition> {
        self.variants.get(variant_id)
    }

    pub fn response_fields(&self) -> ResponseFields {
        self.response
            .clone()
            .unwrap_or_else(|| ResponseFields::default_for(&self.strategy))
    }

    /// Join the base address with a path, tolerating slashes on either side.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Fill variant ids from their map keys and normalize keywords.
    pub(crate) fn normalize(&mut self) {
        for (key, variant) in self.variants.iter_mut() {
            variant.normalize(key);
        }
    }
}
