//! Axum route handlers for the deckhand HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`                - Liveness probe with catalog sizes
//! - `GET  /capabilities`          - List definitions (`?tier=low|medium|high`)
//! - `GET  /capabilities/:id`      - One definition
//! - `POST /capabilities/execute`  - `{call, session}` → `CapabilityResult`
//! - `POST /capabilities/batch`    - `{calls, session, parallel?}` → `[CapabilityResult]`
//! - `POST /classify`              - Slide text → ranked variant matches
//! - `POST /generate`              - Direct dispatch → generation envelope
//!
//! The orchestrator sends the session record with every request; the server
//! keeps no session state of its own.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::capabilities::{CapabilityCatalog, CostTier};
use crate::catalog::BackendCatalog;
use crate::classification::{
    ClassificationRequest, Classifier, DEFAULT_MAX_RESULTS, DEFAULT_MIN_CONFIDENCE,
};
use crate::error::ToolError;
use crate::interfaces::{GenerationResult, HttpTransport, RoutingDispatcher};
use crate::session::SessionProgressRecord;
use crate::tools::{register_content_capabilities, CapabilityCall, CapabilityResult, ToolRegistry};

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub classifier: Arc<Classifier>,
    pub dispatcher: Arc<RoutingDispatcher>,
}

impl AppState {
    pub fn new(
        registry: Arc<ToolRegistry>,
        classifier: Arc<Classifier>,
        dispatcher: Arc<RoutingDispatcher>,
    ) -> Self {
        Self {
            registry,
            classifier,
            dispatcher,
        }
    }

    /// Wire classifier, dispatcher and built-in capabilities from the loaded
    /// catalogs. Capabilities in `capabilities` are kept; built-ins replace
    /// same-named entries.
    pub fn from_catalogs(
        backends: &BackendCatalog,
        capabilities: CapabilityCatalog,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ToolError> {
        let classifier = Arc::new(Classifier::from_catalog(backends));
        let dispatcher = Arc::new(RoutingDispatcher::new(backends, transport));
        let mut registry = ToolRegistry::with_catalog(capabilities);
        register_content_capabilities(&mut registry, classifier.clone(), dispatcher.clone())?;
        Ok(Self::new(Arc::new(registry), classifier, dispatcher))
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/capabilities", get(list_capabilities_handler))
        .route("/capabilities/execute", post(execute_handler))
        .route("/capabilities/batch", post(batch_handler))
        .route("/capabilities/:id", get(get_capability_handler))
        .route("/classify", post(classify_handler))
        .route("/generate", post(generate_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// HTTP status for a pipeline error.
pub fn status_for(err: &ToolError) -> StatusCode {
    match err {
        ToolError::NotFound(_) => StatusCode::NOT_FOUND,
        ToolError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ToolError::Prerequisite { .. } | ToolError::ApprovalRequired { .. } => {
            StatusCode::FORBIDDEN
        }
        ToolError::Execution { .. } | ToolError::InvalidDefinition { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn snapshot(session: &Option<SessionProgressRecord>) -> Map<String, Value> {
    session
        .as_ref()
        .map(SessionProgressRecord::get_decision_snapshot)
        .unwrap_or_else(|| SessionProgressRecord::new().get_decision_snapshot())
}

/// GET /health - liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "deckhand",
        "capabilities": state.registry.catalog().len(),
        "variants": state.classifier.index().len(),
        "backends": state.dispatcher.backend_names(),
    }))
}

#[derive(Debug, Deserialize)]
struct TierQuery {
    tier: Option<String>,
}

/// GET /capabilities - list definitions, optionally filtered by tier.
async fn list_capabilities_handler(
    State(state): State<AppState>,
    Query(query): Query<TierQuery>,
) -> Result<Json<Value>, ApiError> {
    let definitions = match query.tier.as_deref() {
        Some(tier) => {
            let tier: CostTier = tier
                .parse()
                .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
            state.registry.list_by_tier(tier)
        }
        None => state.registry.list(),
    };
    Ok(Json(json!({
        "capabilities": definitions,
        "count": definitions.len(),
    })))
}

/// GET /capabilities/:id - one definition.
async fn get_capability_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .registry
        .get(&id)
        .map(|definition| Json(json!(definition)))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Capability not found: {}", id)))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    call: CapabilityCall,
    #[serde(default)]
    session: Option<SessionProgressRecord>,
}

/// POST /capabilities/execute - run one capability through the policy gate.
///
/// Pre-flight failures map to 404 / 422 / 403, handler failures to 500; the
/// body is always a `CapabilityResult`.
async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> (StatusCode, Json<CapabilityResult>) {
    let context = snapshot(&request.session);
    match state.registry.execute(&request.call, &context, true).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => (
            status_for(&e),
            Json(CapabilityResult::failure(&request.call.capability_id, &e)),
        ),
    }
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    calls: Vec<CapabilityCall>,
    #[serde(default)]
    session: Option<SessionProgressRecord>,
    #[serde(default = "default_parallel")]
    parallel: bool,
}

/// POST /capabilities/batch - per-call isolated batch, results in input order.
async fn batch_handler(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Json<Vec<CapabilityResult>> {
    let context = snapshot(&request.session);
    Json(
        state
            .registry
            .execute_batch(&request.calls, &context, true, request.parallel)
            .await,
    )
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    #[serde(flatten)]
    request: ClassificationRequest,
    min_confidence: Option<f64>,
    max_results: Option<usize>,
}

/// POST /classify - rank variants for slide text.
async fn classify_handler(
    State(state): State<AppState>,
    Json(body): Json<ClassifyRequest>,
) -> Result<Json<Value>, ApiError> {
    let min_confidence = body.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    if !(0.0..=1.0).contains(&min_confidence) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "min_confidence must be within 0..1",
        ));
    }
    let matches = state.classifier.classify(
        &body.request,
        min_confidence,
        body.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
    );
    Ok(Json(json!({
        "matches": matches,
        "count": matches.len(),
    })))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    variant_id: String,
    backend: String,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    context: Option<Map<String, Value>>,
}

/// POST /generate - dispatch one variant directly. Always 200; failures are
/// reported inside the envelope.
async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Json<GenerationResult> {
    Json(
        state
            .dispatcher
            .generate(
                &request.variant_id,
                &request.backend,
                &request.parameters,
                request.context.as_ref(),
            )
            .await,
    )
}
