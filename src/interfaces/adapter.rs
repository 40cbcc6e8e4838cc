//! ContentAdapter trait and the generic strategy-parameterized adapter.
//!
//! An adapter never performs I/O. It builds the outbound body, resolves the
//! target URL, and validates/normalizes the backend's reply; the dispatcher
//! drives the HTTP call in between.
//!
//! ```text
//! ServiceAdapter
//!   ├── EndpointStrategy   (single | per_variant | typed)  → URL
//!   ├── RequestBuilder     (discriminator, defaults, required fields)
//!   └── ResponseContract   (primary/secondary field → content/annotation)
//! ```

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog::{BackendConfig, EndpointStrategy, ResponseFields, VariantDefinition};

/// Semantic name the primary response field is copied to.
pub const CONTENT_KEY: &str = "content";
/// Semantic name the secondary response field is copied to.
pub const ANNOTATION_KEY: &str = "annotation";
/// Semantic values that could not be placed because the backend already
/// used the key for something else.
pub const COLLISIONS_KEY: &str = "semantic_collisions";

/// Adapter error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("Missing required field '{field}' for variant '{variant_id}'")]
    InvalidRequest { variant_id: String, field: String },

    #[error("Cannot resolve endpoint for backend '{backend}': {key}")]
    EndpointResolution { backend: String, key: String },

    #[error("Invalid response from '{backend}': {reason}")]
    InvalidResponse { backend: String, reason: String },
}

/// Contract every backend adapter fulfils.
pub trait ContentAdapter: Send + Sync {
    fn backend(&self) -> &BackendConfig;

    /// Tag stamped on normalized responses.
    fn backend_type(&self) -> &str {
        self.backend().strategy.kind()
    }

    /// Outbound body: parameters + discriminator, required fields enforced,
    /// then `context` layered on without overwriting explicit parameters.
    fn build_request(
        &self,
        variant: &VariantDefinition,
        parameters: &Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, AdapterError>;

    fn get_endpoint_url(&self, variant: &VariantDefinition) -> Result<String, AdapterError>;

    /// Shape check with a reason on failure.
    fn check_response(&self, response: &Value) -> Result<(), AdapterError>;

    fn validate_response(&self, response: &Value) -> bool {
        self.check_response(response).is_ok()
    }

    /// Every raw key passes through; semantic keys and stamps are added.
    fn transform_response(
        &self,
        response: &Map<String, Value>,
        variant: &VariantDefinition,
    ) -> Map<String, Value>;

    fn get_required_fields(&self, variant: &VariantDefinition) -> Vec<String>;

    fn get_optional_fields(&self, variant: &VariantDefinition) -> Vec<String>;

    fn is_variant_enabled(&self, variant: &VariantDefinition) -> bool {
        variant.status.is_enabled()
    }

    /// Variant override, else the backend default.
    fn get_timeout(&self, variant: &VariantDefinition) -> Duration {
        Duration::from_millis(variant.timeout_ms.unwrap_or(self.backend().timeout_ms()))
    }
}

// ============================================================================
// Request builders
// ============================================================================

/// Contract-shape specific request construction.
pub trait RequestBuilder: Send + Sync + fmt::Debug {
    /// Field and value identifying the variant to the backend.
    fn discriminator(&self, variant: &VariantDefinition) -> Option<(String, Value)>;

    fn default_required_fields(&self) -> Vec<String>;

    fn default_optional_fields(&self) -> Vec<String>;

    /// Variant-declared defaults, applied before the required-field check.
    fn apply_defaults(&self, _variant: &VariantDefinition, _body: &mut Map<String, Value>) {}
}

/// Single shared endpoint; the variant id travels in `discriminator`.
#[derive(Debug, Clone)]
pub struct SingleEndpointBuilder {
    pub discriminator: String,
}

impl RequestBuilder for SingleEndpointBuilder {
    fn discriminator(&self, variant: &VariantDefinition) -> Option<(String, Value)> {
        Some((
            self.discriminator.clone(),
            Value::String(variant.variant_id.clone()),
        ))
    }

    fn default_required_fields(&self) -> Vec<String> {
        vec!["slide_title".to_string()]
    }

    fn default_optional_fields(&self) -> Vec<String> {
        ["key_points", "slide_purpose", "audience", "tone"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Dedicated endpoint per variant; body is `{count_field?, topic, target_points?, context?}`.
#[derive(Debug, Clone, Default)]
pub struct PerVariantBuilder;

impl RequestBuilder for PerVariantBuilder {
    fn discriminator(&self, _variant: &VariantDefinition) -> Option<(String, Value)> {
        None
    }

    fn default_required_fields(&self) -> Vec<String> {
        vec!["topic".to_string()]
    }

    fn default_optional_fields(&self) -> Vec<String> {
        vec!["target_points".to_string(), "context".to_string()]
    }

    /// `service_specific.count_field` + `count` fill an absent count parameter.
    fn apply_defaults(&self, variant: &VariantDefinition, body: &mut Map<String, Value>) {
        if let (Some(field), Some(count)) = (
            variant.service_str("count_field"),
            variant.service_specific.get("count"),
        ) {
            if !body.contains_key(field) {
                body.insert(field.to_string(), count.clone());
            }
        }
    }
}

/// Endpoint chosen by a type key; the variant's type value travels in `type_field`.
#[derive(Debug, Clone)]
pub struct TypedBuilder {
    pub type_field: String,
}

impl RequestBuilder for TypedBuilder {
    /// `service_specific.type_value`, falling back to the variant id.
    fn discriminator(&self, variant: &VariantDefinition) -> Option<(String, Value)> {
        let value = variant
            .service_specific
            .get("type_value")
            .cloned()
            .unwrap_or_else(|| Value::String(variant.variant_id.clone()));
        Some((self.type_field.clone(), value))
    }

    fn default_required_fields(&self) -> Vec<String> {
        vec!["data".to_string()]
    }

    fn default_optional_fields(&self) -> Vec<String> {
        vec!["narrative".to_string(), "context".to_string()]
    }
}

// ============================================================================
// Response contract
// ============================================================================

/// Response-side half of the contract: which fields carry content.
#[derive(Debug, Clone)]
pub struct ResponseContract {
    fields: ResponseFields,
}

impl ResponseContract {
    pub fn new(fields: ResponseFields) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &ResponseFields {
        &self.fields
    }

    fn check(&self, backend: &str, response: &Value) -> Result<(), AdapterError> {
        let invalid = |reason: String| AdapterError::InvalidResponse {
            backend: backend.to_string(),
            reason,
        };

        let obj = response
            .as_object()
            .ok_or_else(|| invalid("response is not a JSON object".to_string()))?;

        if let Some(err) = obj.get("error").filter(|v| !v.is_null()) {
            return Err(invalid(format!("backend reported error: {}", error_text(err))));
        }

        match obj.get(&self.fields.primary) {
            None | Some(Value::Null) => Err(invalid(format!(
                "missing content field '{}'",
                self.fields.primary
            ))),
            Some(v) if !has_content(v) => Err(invalid(format!(
                "content field '{}' is empty",
                self.fields.primary
            ))),
            Some(_) => Ok(()),
        }
    }

    fn transform(
        &self,
        response: &Map<String, Value>,
        variant: &VariantDefinition,
        backend_type: &str,
    ) -> Map<String, Value> {
        let mut semantic = Map::new();
        if let Some(primary) = response.get(&self.fields.primary) {
            semantic.insert(CONTENT_KEY.to_string(), primary.clone());
        }
        if let Some(secondary) = self
            .fields
            .secondary
            .as_ref()
            .and_then(|field| response.get(field))
        {
            semantic.insert(ANNOTATION_KEY.to_string(), secondary.clone());
        }
        semantic.insert(
            "variant_id".to_string(),
            Value::String(variant.variant_id.clone()),
        );
        semantic.insert(
            "backend_type".to_string(),
            Value::String(backend_type.to_string()),
        );

        // Raw fields always win; a displaced semantic value is reported.
        let mut out = response.clone();
        let mut collisions = Map::new();
        for (key, value) in semantic {
            match response.get(&key) {
                Some(raw) if *raw != value => {
                    log::warn!(
                        "Variant '{}' ({}): backend field '{}' kept over its semantic value",
                        variant.variant_id,
                        backend_type,
                        key
                    );
                    collisions.insert(key, value);
                }
                Some(_) => {}
                None => {
                    out.insert(key, value);
                }
            }
        }
        if !collisions.is_empty() {
            out.insert(COLLISIONS_KEY.to_string(), Value::Object(collisions));
        }
        out
    }
}

/// Blank strings and empty containers carry no content.
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// ServiceAdapter
// ============================================================================

/// The one adapter type: strategy + request builder + response contract.
pub struct ServiceAdapter {
    backend: BackendConfig,
    builder: Box<dyn RequestBuilder>,
    contract: ResponseContract,
}

impl fmt::Debug for ServiceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAdapter")
            .field("backend", &self.backend.name)
            .field("strategy", &self.backend.strategy.kind())
            .field("builder", &self.builder)
            .finish()
    }
}

impl ServiceAdapter {
    /// Adapter for a backend, with the request builder its strategy implies.
    pub fn for_backend(backend: BackendConfig) -> Self {
        let builder: Box<dyn RequestBuilder> = match &backend.strategy {
            EndpointStrategy::Single { discriminator, .. } => Box::new(SingleEndpointBuilder {
                discriminator: discriminator.clone(),
            }),
            EndpointStrategy::PerVariant => Box::new(PerVariantBuilder),
            EndpointStrategy::Typed { type_field, .. } => Box::new(TypedBuilder {
                type_field: type_field.clone(),
            }),
        };
        Self::with_builder(backend, builder)
    }

    /// Adapter with an injected request builder.
    pub fn with_builder(backend: BackendConfig, builder: Box<dyn RequestBuilder>) -> Self {
        let contract = ResponseContract::new(backend.response_fields());
        Self {
            backend,
            builder,
            contract,
        }
    }

    pub fn contract(&self) -> &ResponseContract {
        &self.contract
    }

    fn resolution_error(&self, key: String) -> AdapterError {
        AdapterError::EndpointResolution {
            backend: self.backend.name.clone(),
            key,
        }
    }
}

impl ContentAdapter for ServiceAdapter {
    fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    fn build_request(
        &self,
        variant: &VariantDefinition,
        parameters: &Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, AdapterError> {
        let mut body = parameters.clone();
        if let Some((field, value)) = self.builder.discriminator(variant) {
            body.insert(field, value);
        }
        self.builder.apply_defaults(variant, &mut body);

        for field in self.get_required_fields(variant) {
            if body.get(&field).map_or(true, Value::is_null) {
                return Err(AdapterError::InvalidRequest {
                    variant_id: variant.variant_id.clone(),
                    field,
                });
            }
        }

        if let Some(context) = context {
            for (key, value) in context {
                body.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        Ok(body)
    }

    fn get_endpoint_url(&self, variant: &VariantDefinition) -> Result<String, AdapterError> {
        match &self.backend.strategy {
            EndpointStrategy::Single {
                default_endpoint, ..
            } => Ok(self.backend.url_for(default_endpoint)),
            EndpointStrategy::PerVariant => variant
                .endpoint
                .as_deref()
                .map(|path| self.backend.url_for(path))
                .ok_or_else(|| {
                    self.resolution_error(format!(
                        "variant '{}' declares no endpoint",
                        variant.variant_id
                    ))
                }),
            EndpointStrategy::Typed { endpoints, .. } => {
                let key = variant.service_str("endpoint_key").ok_or_else(|| {
                    self.resolution_error(format!(
                        "variant '{}' declares no endpoint_key",
                        variant.variant_id
                    ))
                })?;
                endpoints
                    .get(key)
                    .map(|path| self.backend.url_for(path))
                    .ok_or_else(|| {
                        self.resolution_error(format!("endpoint_key '{}' is not configured", key))
                    })
            }
        }
    }

    fn check_response(&self, response: &Value) -> Result<(), AdapterError> {
        self.contract.check(&self.backend.name, response)
    }

    fn transform_response(
        &self,
        response: &Map<String, Value>,
        variant: &VariantDefinition,
    ) -> Map<String, Value> {
        self.contract
            .transform(response, variant, self.backend.strategy.kind())
    }

    fn get_required_fields(&self, variant: &VariantDefinition) -> Vec<String> {
        variant
            .required_fields
            .clone()
            .unwrap_or_else(|| self.builder.default_required_fields())
    }

    fn get_optional_fields(&self, variant: &VariantDefinition) -> Vec<String> {
        variant
            .optional_fields
            .clone()
            .unwrap_or_else(|| self.builder.default_optional_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VariantStatus;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn text_adapter() -> ServiceAdapter {
        ServiceAdapter::for_backend(BackendConfig::new(
            "text",
            "http://text:8000",
            EndpointStrategy::Single {
                default_endpoint: "/v1.2/generate".to_string(),
                discriminator: "variant_id".to_string(),
            },
        ))
    }

    fn illustrator_adapter() -> ServiceAdapter {
        ServiceAdapter::for_backend(BackendConfig::new(
            "illustrator",
            "http://illustrator:8000",
            EndpointStrategy::PerVariant,
        ))
    }

    fn analytics_adapter() -> ServiceAdapter {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("chartjs".to_string(), "/a".to_string());
        endpoints.insert("d3".to_string(), "/b".to_string());
        ServiceAdapter::for_backend(BackendConfig::new(
            "analytics",
            "http://analytics",
            EndpointStrategy::Typed {
                endpoints,
                type_field: "chart_type".to_string(),
            },
        ))
    }

    #[test]
    fn test_single_endpoint_ignores_variant() {
        let adapter = text_adapter();
        let a = VariantDefinition::new("bullets");
        let b = VariantDefinition::new("matrix_2x2").with_endpoint("/ignored");
        assert_eq!(
            adapter.get_endpoint_url(&a).unwrap(),
            "http://text:8000/v1.2/generate"
        );
        assert_eq!(
            adapter.get_endpoint_url(&b).unwrap(),
            "http://text:8000/v1.2/generate"
        );
    }

    #[test]
    fn test_per_variant_endpoint() {
        let adapter = illustrator_adapter();
        let pyramid = VariantDefinition::new("pyramid").with_endpoint("/v1.0/pyramid/generate");
        assert_eq!(
            adapter.get_endpoint_url(&pyramid).unwrap(),
            "http://illustrator:8000/v1.0/pyramid/generate"
        );
        let err = adapter
            .get_endpoint_url(&VariantDefinition::new("funnel"))
            .unwrap_err();
        assert!(matches!(err, AdapterError::EndpointResolution { .. }));
    }

    #[test]
    fn test_typed_endpoint_lookup() {
        let adapter = analytics_adapter();
        let d3 = VariantDefinition::new("sankey").with_service_specific("endpoint_key", json!("d3"));
        assert_eq!(adapter.get_endpoint_url(&d3).unwrap(), "http://analytics/b");

        let missing =
            VariantDefinition::new("radar").with_service_specific("endpoint_key", json!("missing"));
        let err = adapter.get_endpoint_url(&missing).unwrap_err();
        assert!(err.to_string().contains("missing"));

        let no_key = VariantDefinition::new("bare");
        assert!(matches!(
            adapter.get_endpoint_url(&no_key),
            Err(AdapterError::EndpointResolution { .. })
        ));
    }

    #[test]
    fn test_single_build_request_sets_discriminator() {
        let adapter = text_adapter();
        let body = adapter
            .build_request(
                &VariantDefinition::new("bullets"),
                &map(json!({"slide_title": "Q3", "variant_id": "spoofed"})),
                None,
            )
            .unwrap();
        assert_eq!(body["variant_id"], "bullets");
        assert_eq!(body["slide_title"], "Q3");
    }

    #[test]
    fn test_missing_required_field_named() {
        let adapter = illustrator_adapter();
        let err = adapter
            .build_request(
                &VariantDefinition::new("pyramid"),
                &map(json!({"target_points": ["a"]})),
                Some(&map(json!({"topic": "from context"}))),
            )
            .unwrap_err();
        assert_eq!(
            err,
            AdapterError::InvalidRequest {
                variant_id: "pyramid".to_string(),
                field: "topic".to_string()
            }
        );
    }

    #[test]
    fn test_variant_required_fields_override_defaults() {
        let adapter = illustrator_adapter();
        let variant = VariantDefinition::new("cycle").with_required_fields(&["topic", "steps"]);
        assert_eq!(adapter.get_required_fields(&variant), vec!["topic", "steps"]);
        let err = adapter
            .build_request(&variant, &map(json!({"topic": "t"})), None)
            .unwrap_err();
        assert!(err.to_string().contains("'steps'"));
    }

    #[test]
    fn test_context_does_not_overwrite_parameters() {
        let adapter = illustrator_adapter();
        let body = adapter
            .build_request(
                &VariantDefinition::new("pyramid"),
                &map(json!({"topic": "explicit"})),
                Some(&map(json!({"topic": "ctx", "audience": "execs"}))),
            )
            .unwrap();
        assert_eq!(body["topic"], "explicit");
        assert_eq!(body["audience"], "execs");
    }

    #[test]
    fn test_per_variant_count_default() {
        let adapter = illustrator_adapter();
        let variant = VariantDefinition::new("pyramid_4")
            .with_service_specific("count_field", json!("num_levels"))
            .with_service_specific("count", json!(4));
        let body = adapter
            .build_request(&variant, &map(json!({"topic": "t"})), None)
            .unwrap();
        assert_eq!(body["num_levels"], 4);

        let body = adapter
            .build_request(&variant, &map(json!({"topic": "t", "num_levels": 3})), None)
            .unwrap();
        assert_eq!(body["num_levels"], 3);
    }

    #[test]
    fn test_typed_discriminator() {
        let adapter = analytics_adapter();
        let pie = VariantDefinition::new("pie_chart").with_service_specific("type_value", json!("pie"));
        let body = adapter
            .build_request(&pie, &map(json!({"data": [{"label": "a", "value": 1}]})), None)
            .unwrap();
        assert_eq!(body["chart_type"], "pie");

        let bar = VariantDefinition::new("bar_chart");
        let body = adapter
            .build_request(&bar, &map(json!({"data": []})), None)
            .unwrap();
        assert_eq!(body["chart_type"], "bar_chart");
    }

    #[test]
    fn test_validate_response_content() {
        let adapter = text_adapter();
        assert!(!adapter.validate_response(&json!({"content": ""})));
        assert!(!adapter.validate_response(&json!({"content": "   \n"})));
        assert!(adapter.validate_response(&json!({"content": "x"})));
        assert!(!adapter.validate_response(&json!({"other": "x"})));
        assert!(!adapter.validate_response(&json!({"content": "x", "error": "quota"})));
        assert!(adapter.validate_response(&json!({"content": "x", "error": null})));
        assert!(!adapter.validate_response(&json!(["content"])));
    }

    #[test]
    fn test_typed_secondary_optional() {
        let adapter = analytics_adapter();
        assert!(adapter.validate_response(&json!({"chart_html": "<canvas/>"})));
        assert!(!adapter.validate_response(&json!({"observations": "up 4%"})));
    }

    #[test]
    fn test_transform_keeps_raw_keys() {
        let adapter = analytics_adapter();
        let raw = map(json!({
            "chart_html": "<canvas/>",
            "observations": "Revenue up 4%",
            "metadata": {"library": "chartjs"},
        }));
        let variant = VariantDefinition::new("line_chart");
        let out = adapter.transform_response(&raw, &variant);

        for key in raw.keys() {
            assert!(out.contains_key(key), "lost key {}", key);
        }
        assert_eq!(out[CONTENT_KEY], "<canvas/>");
        assert_eq!(out[ANNOTATION_KEY], "Revenue up 4%");
        assert_eq!(out["variant_id"], "line_chart");
        assert_eq!(out["backend_type"], "typed");
    }

    #[test]
    fn test_transform_never_overwrites_backend_fields() {
        let adapter = illustrator_adapter();
        let raw = map(json!({
            "html": "<svg/>",
            "content": "speaker notes",
            "backend_type": "svg-renderer",
        }));
        let variant = VariantDefinition::new("pyramid_3");
        let out = adapter.transform_response(&raw, &variant);

        for (key, value) in &raw {
            assert_eq!(&out[key], value, "changed key {}", key);
        }
        assert_eq!(out["variant_id"], "pyramid_3");
        assert_eq!(out[COLLISIONS_KEY][CONTENT_KEY], "<svg/>");
        assert_eq!(out[COLLISIONS_KEY]["backend_type"], "per_variant");
        assert!(out[COLLISIONS_KEY].get("variant_id").is_none());
    }

    #[test]
    fn test_transform_equal_values_are_not_collisions() {
        let adapter = text_adapter();
        let raw = map(json!({"content": "<ul/>", "variant_id": "bullets"}));
        let out = adapter.transform_response(&raw, &VariantDefinition::new("bullets"));
        assert_eq!(out[CONTENT_KEY], "<ul/>");
        assert!(!out.contains_key(COLLISIONS_KEY));
    }

    #[test]
    fn test_enablement_and_timeout() {
        let adapter = text_adapter().backend.clone().with_timeout_ms(5_000);
        let adapter = ServiceAdapter::for_backend(adapter);
        let beta = VariantDefinition::new("b").with_status(VariantStatus::Beta);
        let slow = VariantDefinition::new("s").with_timeout_ms(60_000);
        assert!(adapter.is_variant_enabled(&beta));
        assert!(!adapter.is_variant_enabled(&beta.clone().with_status(VariantStatus::Deprecated)));
        assert_eq!(adapter.get_timeout(&beta), Duration::from_millis(5_000));
        assert_eq!(adapter.get_timeout(&slow), Duration::from_millis(60_000));
    }

    #[test]
    fn test_optional_field_defaults() {
        let adapter = analytics_adapter();
        assert_eq!(
            adapter.get_optional_fields(&VariantDefinition::new("x")),
            vec!["narrative", "context"]
        );
    }
}
