//! RoutingDispatcher - drives one variant generation against its backend.
//!
//! ```text
//! generate(variant_id, backend, params, ctx)
//!   → adapter lookup (enabled?) → variant lookup (status?)
//!   → build_request → get_endpoint_url
//!   → HttpTransport::post_json (adapter timeout)
//!   → validate_response → transform_response
//!   → GenerationResult
//! ```
//!
//! Every failure comes back as a `GenerationResult` with `success: false`;
//! nothing on this path returns `Err`, so batch callers always get one
//! envelope per request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::adapter::{ContentAdapter, ServiceAdapter, COLLISIONS_KEY, CONTENT_KEY};
use super::transport::HttpTransport;
use crate::catalog::BackendCatalog;
use crate::classification::VariantMatch;
use crate::error::ErrorType;

/// Backend keys that the envelope's own fields would shadow are moved under
/// this key.
pub const BACKEND_META_KEY: &str = "backend_meta";

/// Envelope keys that backend data may not shadow.
const RESERVED_KEYS: &[&str] = &[
    "success",
    "variant_id",
    "backend_name",
    "error",
    "error_type",
    "status_code",
    "elapsed_ms",
];

/// Uniform success/failure envelope for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub variant_id: String,
    pub backend_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,
    /// Normalized backend response on success.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl GenerationResult {
    fn succeeded(
        variant_id: &str,
        backend_name: &str,
        mut data: Map<String, Value>,
        elapsed_ms: f64,
    ) -> Self {
        let mut meta = Map::new();
        for key in RESERVED_KEYS {
            if let Some(value) = data.remove(*key) {
                meta.insert(key.to_string(), value);
            }
        }
        if !meta.is_empty() {
            log::debug!(
                "Variant '{}/{}': backend fields {:?} moved under '{}'",
                backend_name,
                variant_id,
                meta.keys().collect::<Vec<_>>(),
                BACKEND_META_KEY
            );
            if data.contains_key(BACKEND_META_KEY) {
                log::warn!(
                    "Variant '{}/{}': backend already returned '{}'; reserved fields dropped",
                    backend_name,
                    variant_id,
                    BACKEND_META_KEY
                );
            } else {
                data.insert(BACKEND_META_KEY.to_string(), Value::Object(meta));
            }
        }
        Self {
            success: true,
            variant_id: variant_id.to_string(),
            backend_name: backend_name.to_string(),
            error: None,
            error_type: None,
            status_code: None,
            elapsed_ms: Some(elapsed_ms),
            data,
        }
    }

    pub fn failed(
        variant_id: &str,
        backend_name: &str,
        error_type: ErrorType,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            variant_id: variant_id.to_string(),
            backend_name: backend_name.to_string(),
            error: Some(error.into()),
            error_type: Some(error_type),
            status_code: None,
            elapsed_ms: None,
            data: Map::new(),
        }
    }

    fn with_status_code(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }

    fn with_elapsed(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    /// The backend's primary output, when present. Looks past a raw
    /// `content` field the backend used for something else.
    pub fn content(&self) -> Option<&Value> {
        self.data
            .get(COLLISIONS_KEY)
            .and_then(|collisions| collisions.get(CONTENT_KEY))
            .or_else(|| self.data.get(CONTENT_KEY))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Routes generation requests to backend adapters.
pub struct RoutingDispatcher {
    adapters: BTreeMap<String, Arc<dyn ContentAdapter>>,
    transport: Arc<dyn HttpTransport>,
}

impl RoutingDispatcher {
    /// One `ServiceAdapter` per catalog backend, enabled or not.
    pub fn new(catalog: &BackendCatalog, transport: Arc<dyn HttpTransport>) -> Self {
        let adapters = catalog
            .backends()
            .map(|backend| {
                let adapter: Arc<dyn ContentAdapter> =
                    Arc::new(ServiceAdapter::for_backend(backend.clone()));
                (backend.name.clone(), adapter)
            })
            .collect();
        Self {
            adapters,
            transport,
        }
    }

    /// Add or replace the adapter for a backend.
    pub fn register_adapter(&mut self, adapter: Arc<dyn ContentAdapter>) {
        let name = adapter.backend().name.clone();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            log::warn!("Adapter for backend '{}' replaced", name);
        }
    }

    pub fn adapter(&self, backend_name: &str) -> Option<&Arc<dyn ContentAdapter>> {
        self.adapters.get(backend_name)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Generate content for a classified match.
    pub async fn generate_for_match(
        &self,
        matched: &VariantMatch,
        parameters: &Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> GenerationResult {
        self.generate(&matched.variant_id, &matched.backend, parameters, context)
            .await
    }

    /// Generate content for `variant_id` on `backend_name`.
    pub async fn generate(
        &self,
        variant_id: &str,
        backend_name: &str,
        parameters: &Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> GenerationResult {
        let fail = |error_type: ErrorType, error: String| {
            log::warn!("Generation {}/{} failed: {}", backend_name, variant_id, error);
            GenerationResult::failed(variant_id, backend_name, error_type, error)
        };

        let Some(adapter) = self.adapters.get(backend_name) else {
            return fail(
                ErrorType::NotFound,
                format!("Backend '{}' not found", backend_name),
            );
        };
        if !adapter.backend().enabled {
            return fail(
                ErrorType::Disabled,
                format!("Backend '{}' is not enabled", backend_name),
            );
        }

        let Some(variant) = adapter.backend().variant(variant_id) else {
            return fail(
                ErrorType::NotFound,
                format!(
                    "Variant '{}' not found in backend '{}'",
                    variant_id, backend_name
                ),
            );
        };
        if !adapter.is_variant_enabled(variant) {
            return fail(
                ErrorType::Disabled,
                format!(
                    "Variant '{}' is not enabled (status: {})",
                    variant_id,
                    variant.status.as_str()
                ),
            );
        }

        let body = match adapter.build_request(variant, parameters, context) {
            Ok(body) => Value::Object(body),
            Err(e) => return fail(ErrorType::Validation, e.to_string()),
        };
        let url = match adapter.get_endpoint_url(variant) {
            Ok(url) => url,
            Err(e) => return fail(ErrorType::Configuration, e.to_string()),
        };

        let timeout = adapter.get_timeout(variant);
        let start = Instant::now();
        let response = self.transport.post_json(&url, &body, timeout).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        log::debug!(
            "POST {} ({}/{}) finished in {:.1}ms",
            url,
            backend_name,
            variant_id,
            elapsed_ms
        );

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return fail(e.error_type(), e.to_string())
                    .with_status_code(e.status_code())
                    .with_elapsed(elapsed_ms)
            }
        };

        if let Err(e) = adapter.check_response(&response) {
            return fail(ErrorType::Validation, e.to_string()).with_elapsed(elapsed_ms);
        }
        let Value::Object(raw) = response else {
            return fail(
                ErrorType::Validation,
                "response is not a JSON object".to_string(),
            )
            .with_elapsed(elapsed_ms);
        };

        let transformed = adapter.transform_response(&raw, variant);
        GenerationResult::succeeded(variant_id, backend_name, transformed, elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BackendConfig, EndpointStrategy, VariantDefinition, VariantStatus};
    use crate::interfaces::transport::ReqwestTransport;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn catalog(base: &str) -> BackendCatalog {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("chartjs".to_string(), "/api/chartjs".to_string());

        let mut catalog = BackendCatalog::new();
        catalog
            .add_backend(
                BackendConfig::new(
                    "text",
                    base,
                    EndpointStrategy::Single {
                        default_endpoint: "/v1.2/generate".to_string(),
                        discriminator: "variant_id".to_string(),
                    },
                )
                .with_variant(VariantDefinition::new("bullets"))
                .with_variant(VariantDefinition::new("old").with_status(VariantStatus::Deprecated)),
            )
            .unwrap();
        catalog
            .add_backend(
                BackendConfig::new("illustrator", base, EndpointStrategy::PerVariant)
                    .with_variant(
                        VariantDefinition::new("pyramid").with_endpoint("/v1.0/pyramid/generate"),
                    )
                    .with_variant(VariantDefinition::new("funnel"))
                    .with_variant(
                        VariantDefinition::new("slow")
                            .with_endpoint("/slow")
                            .with_timeout_ms(50),
                    ),
            )
            .unwrap();
        catalog
            .add_backend(
                BackendConfig::new(
                    "analytics",
                    base,
                    EndpointStrategy::Typed {
                        endpoints,
                        type_field: "chart_type".to_string(),
                    },
                )
                .with_variant(
                    VariantDefinition::new("pie_chart")
                        .with_service_specific("endpoint_key", json!("chartjs"))
                        .with_service_specific("type_value", json!("pie")),
                ),
            )
            .unwrap();
        catalog
            .add_backend(
                BackendConfig::new("legacy", base, EndpointStrategy::PerVariant)
                    .with_variant(VariantDefinition::new("any").with_endpoint("/any"))
                    .disabled(),
            )
            .unwrap();
        catalog
    }

    async fn dispatcher(server: &MockServer) -> RoutingDispatcher {
        RoutingDispatcher::new(
            &catalog(&server.uri()),
            Arc::new(ReqwestTransport::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_single_endpoint_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.2/generate"))
            .and(body_partial_json(json!({
                "variant_id": "bullets",
                "slide_title": "Q3 results",
                "audience": "board",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"content": "<ul><li>Up</li></ul>", "tokens": 42})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate(
                "bullets",
                "text",
                &map(json!({"slide_title": "Q3 results"})),
                Some(&map(json!({"audience": "board"}))),
            )
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.variant_id, "bullets");
        assert_eq!(result.backend_name, "text");
        assert_eq!(result.content(), Some(&json!("<ul><li>Up</li></ul>")));
        assert_eq!(result.data["tokens"], 42);
        assert_eq!(result.data["backend_type"], "single");
        assert!(result.elapsed_ms.is_some());
    }

    #[tokio::test]
    async fn test_typed_success_carries_annotation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chartjs"))
            .and(body_partial_json(json!({"chart_type": "pie"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart_html": "<canvas/>",
                "observations": "A leads",
            })))
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate(
                "pie_chart",
                "analytics",
                &map(json!({"data": [{"label": "A", "value": 60}]})),
                None,
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data["annotation"], "A leads");
        assert_eq!(result.data["chart_html"], "<canvas/>");

        let envelope = result.to_value();
        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["content"], "<canvas/>");
        assert!(envelope.get("error").is_none());
    }

    #[tokio::test]
    async fn test_backend_fields_shadowed_by_envelope_are_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.2/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "<p>Hi</p>",
                "status_code": "cached",
                "elapsed_ms": 12,
                "success": "partial",
            })))
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate("bullets", "text", &map(json!({"slide_title": "Hi"})), None)
            .await;
        assert!(result.success);
        assert_eq!(result.status_code, None);
        assert_eq!(result.data["backend_meta"]["status_code"], "cached");
        assert_eq!(result.data["backend_meta"]["elapsed_ms"], 12);
        assert_eq!(result.data["backend_meta"]["success"], "partial");

        let envelope = result.to_value();
        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["backend_meta"]["status_code"], "cached");
    }

    #[tokio::test]
    async fn test_content_prefers_primary_over_colliding_raw_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/pyramid/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "html": "<svg/>",
                "content": "speaker notes",
            })))
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate("pyramid", "illustrator", &map(json!({"topic": "Org"})), None)
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.data["content"], "speaker notes");
        assert_eq!(result.content(), Some(&json!("<svg/>")));
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_backend() {
        let server = MockServer::start().await;
        let d = dispatcher(&server).await;

        let missing = d.generate("x", "nope", &Map::new(), None).await;
        assert!(!missing.success);
        assert_eq!(missing.error_type, Some(ErrorType::NotFound));
        assert!(missing.error.unwrap().contains("nope"));

        let disabled = d.generate("any", "legacy", &Map::new(), None).await;
        assert_eq!(disabled.error_type, Some(ErrorType::Disabled));
    }

    #[tokio::test]
    async fn test_unknown_and_deprecated_variant() {
        let server = MockServer::start().await;
        let d = dispatcher(&server).await;

        let unknown = d.generate("ghost", "text", &Map::new(), None).await;
        assert_eq!(unknown.error_type, Some(ErrorType::NotFound));

        let old = d
            .generate("old", "text", &map(json!({"slide_title": "t"})), None)
            .await;
        assert_eq!(old.error_type, Some(ErrorType::Disabled));
        assert!(old.error.unwrap().contains("deprecated"));
    }

    #[tokio::test]
    async fn test_missing_field_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate("pyramid", "illustrator", &Map::new(), None)
            .await;
        assert_eq!(result.error_type, Some(ErrorType::Validation));
        assert!(result.error.unwrap().contains("'topic'"));
    }

    #[tokio::test]
    async fn test_endpoint_resolution_failure() {
        let server = MockServer::start().await;
        let result = dispatcher(&server)
            .await
            .generate("funnel", "illustrator", &map(json!({"topic": "t"})), None)
            .await;
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Configuration));
    }

    #[tokio::test]
    async fn test_http_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/pyramid/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate("pyramid", "illustrator", &map(json!({"topic": "t"})), None)
            .await;
        assert_eq!(result.error_type, Some(ErrorType::HttpError));
        assert_eq!(result.status_code, Some(503));
    }

    #[tokio::test]
    async fn test_variant_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"html": "<div/>"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate("slow", "illustrator", &map(json!({"topic": "t"})), None)
            .await;
        assert_eq!(result.error_type, Some(ErrorType::Timeout));
        assert_eq!(result.status_code, None);
    }

    #[tokio::test]
    async fn test_invalid_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/pyramid/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"html": "  "})))
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate("pyramid", "illustrator", &map(json!({"topic": "t"})), None)
            .await;
        assert_eq!(result.error_type, Some(ErrorType::Validation));
        assert!(result.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_backend_data_cannot_shadow_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "html": "<div/>",
                "success": false,
                "backend_name": "spoofed",
            })))
            .mount(&server)
            .await;

        let result = dispatcher(&server)
            .await
            .generate("pyramid", "illustrator", &map(json!({"topic": "t"})), None)
            .await;
        let envelope = result.to_value();
        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["backend_name"], "illustrator");
    }

    #[tokio::test]
    async fn test_register_adapter_replaces() {
        let server = MockServer::start().await;
        let mut d = dispatcher(&server).await;
        let replacement = BackendConfig::new("text", "http://elsewhere", EndpointStrategy::PerVariant);
        d.register_adapter(Arc::new(ServiceAdapter::for_backend(replacement)));
        assert_eq!(d.adapter("text").unwrap().backend().base_url, "http://elsewhere");
        assert_eq!(d.backend_names(), vec!["analytics", "illustrator", "legacy", "text"]);
    }
}
