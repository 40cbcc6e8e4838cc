//! Built-in presentation capabilities.
//!
//! - `classify_slide`: rank candidate variants for one slide's text.
//! - `generate_slide_content`: pick a variant per slide (explicit or top
//!   classification match) and render all slides concurrently through the
//!   routing dispatcher. Failed slides are reported in place.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::handler::CapabilityHandler;
use super::registry::ToolRegistry;
use crate::capabilities::{CapabilityDefinition, CostTier, FieldRule, FieldType, ParameterSchema};
use crate::classification::{ClassificationRequest, Classifier, DEFAULT_MAX_RESULTS, DEFAULT_MIN_CONFIDENCE};
use crate::error::{ErrorType, ToolError};
use crate::interfaces::RoutingDispatcher;

pub const CLASSIFY_SLIDE: &str = "classify_slide";
pub const GENERATE_SLIDE_CONTENT: &str = "generate_slide_content";

const MAX_TITLE_LENGTH: usize = 500;

pub fn classify_slide_definition() -> CapabilityDefinition {
    CapabilityDefinition::new(CLASSIFY_SLIDE, CostTier::Low)
        .with_name("Classify slide")
        .with_description("Rank content variants that fit a slide's title, key points and context")
        .with_input_schema(
            ParameterSchema::new()
                .field(
                    "title",
                    FieldRule::new(FieldType::String).with_max_length(MAX_TITLE_LENGTH),
                )
                .field("key_points", FieldRule::new(FieldType::Array))
                .field("context_text", FieldRule::new(FieldType::String))
                .field(
                    "max_results",
                    FieldRule::new(FieldType::Integer).with_range(Some(1.0), Some(20.0)),
                )
                .field(
                    "min_confidence",
                    FieldRule::new(FieldType::Number).with_range(Some(0.0), Some(1.0)),
                ),
        )
        .with_output_schema(
            ParameterSchema::new()
                .field("matches", FieldRule::new(FieldType::Array).required())
                .field("count", FieldRule::new(FieldType::Integer).required()),
        )
}

pub fn generate_slide_content_definition() -> CapabilityDefinition {
    CapabilityDefinition::new(GENERATE_SLIDE_CONTENT, CostTier::High)
        .with_name("Generate slide content")
        .with_description("Render content for each strawman slide through the content backends")
        .with_input_schema(
            ParameterSchema::new()
                .field(
                    "slides",
                    FieldRule::new(FieldType::Array)
                        .required()
                        .with_description("Slides with title, key_points, optional variant_id/backend"),
                )
                .field(
                    "presentation_context",
                    FieldRule::new(FieldType::Object)
                        .with_description("Fields layered onto every backend request"),
                ),
        )
        .with_output_schema(
            ParameterSchema::new()
                .field("slides", FieldRule::new(FieldType::Array).required())
                .field("generated", FieldRule::new(FieldType::Integer).required())
                .field("failed", FieldRule::new(FieldType::Integer).required()),
        )
        .requiring_context("strawman")
        .requiring_approval()
}

/// Register both built-ins on `registry`.
pub fn register_content_capabilities(
    registry: &mut ToolRegistry,
    classifier: Arc<Classifier>,
    dispatcher: Arc<RoutingDispatcher>,
) -> Result<(), ToolError> {
    registry.register(
        classify_slide_definition(),
        Arc::new(ClassifySlideHandler::new(classifier.clone())),
    )?;
    registry.register(
        generate_slide_content_definition(),
        Arc::new(GenerateSlideContentHandler::new(classifier, dispatcher)),
    )?;
    Ok(())
}

// ============================================================================
// classify_slide
// ============================================================================

pub struct ClassifySlideHandler {
    classifier: Arc<Classifier>,
}

impl ClassifySlideHandler {
    pub fn new(classifier: Arc<Classifier>) -> Self {
        Self { classifier }
    }
}

#[derive(Debug, Deserialize)]
struct ClassifyParams {
    #[serde(flatten)]
    request: ClassificationRequest,
    /// Read as a number; the schema admits whole floats such as `3.0`.
    max_results: Option<f64>,
    min_confidence: Option<f64>,
}

#[async_trait]
impl CapabilityHandler for ClassifySlideHandler {
    async fn call(
        &self,
        parameters: Map<String, Value>,
        _context: Map<String, Value>,
    ) -> anyhow::Result<Map<String, Value>> {
        let params: ClassifyParams = serde_json::from_value(Value::Object(parameters))?;
        let matches = self.classifier.classify(
            &params.request,
            params.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            params
                .max_results
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_MAX_RESULTS),
        );

        let mut out = Map::new();
        out.insert("count".to_string(), json!(matches.len()));
        out.insert("matches".to_string(), serde_json::to_value(&matches)?);
        Ok(out)
    }
}

// ============================================================================
// generate_slide_content
// ============================================================================

pub struct GenerateSlideContentHandler {
    classifier: Arc<Classifier>,
    dispatcher: Arc<RoutingDispatcher>,
}

/// One slide of a `generate_slide_content` call.
#[derive(Debug, Clone, Default, Deserialize)]
struct SlideRequest {
    #[serde(default)]
    slide_id: Option<String>,
    #[serde(flatten)]
    content: ClassificationRequest,
    #[serde(default)]
    variant_id: Option<String>,
    #[serde(default)]
    backend: Option<String>,
    /// Passed to the backend as-is, over the fields derived from the slide.
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// How a slide's variant was chosen.
#[derive(Debug, Clone)]
struct Selection {
    variant_id: String,
    backend: String,
    source: &'static str,
    confidence: Option<f64>,
}

impl GenerateSlideContentHandler {
    pub fn new(classifier: Arc<Classifier>, dispatcher: Arc<RoutingDispatcher>) -> Self {
        Self {
            classifier,
            dispatcher,
        }
    }

    /// Explicit selection wins; a bare `variant_id` is resolved through the
    /// index; otherwise the top classification match is used, restricted to
    /// `backend` when one is given.
    fn select(&self, slide: &SlideRequest) -> Result<Selection, String> {
        match (&slide.variant_id, &slide.backend) {
            (Some(variant_id), Some(backend)) => Ok(Selection {
                variant_id: variant_id.clone(),
                backend: backend.clone(),
                source: "explicit",
                confidence: None,
            }),
            (Some(variant_id), None) => self
                .classifier
                .index()
                .entries()
                .iter()
                .find(|e| &e.variant_id == variant_id)
                .map(|e| Selection {
                    variant_id: e.variant_id.clone(),
                    backend: e.backend.clone(),
                    source: "explicit",
                    confidence: None,
                })
                .ok_or_else(|| format!("Variant '{}' is not offered by any backend", variant_id)),
            (None, wanted) => self
                .classifier
                .classify(&slide.content, DEFAULT_MIN_CONFIDENCE, usize::MAX)
                .into_iter()
                .find(|m| wanted.as_ref().map_or(true, |b| &m.backend == b))
                .map(|m| Selection {
                    variant_id: m.variant_id,
                    backend: m.backend,
                    source: "classified",
                    confidence: Some(m.confidence),
                })
                .ok_or_else(|| "No variant matched the slide content".to_string()),
        }
    }

    async fn render(
        &self,
        index: usize,
        slide: Result<SlideRequest, String>,
        shared: Option<&Map<String, Value>>,
    ) -> Value {
        let slide = match slide {
            Ok(slide) => slide,
            Err(e) => return slide_failure(index, None, ErrorType::Validation, e),
        };
        let selection = match self.select(&slide) {
            Ok(selection) => selection,
            Err(e) => return slide_failure(index, slide.slide_id, ErrorType::NotFound, e),
        };

        let params = backend_parameters(&slide);
        let result = self
            .dispatcher
            .generate(&selection.variant_id, &selection.backend, &params, shared)
            .await;

        let mut entry = match result.to_value() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        entry.insert("slide_index".to_string(), json!(index));
        if let Some(id) = slide.slide_id {
            entry.insert("slide_id".to_string(), Value::String(id));
        }
        entry.insert("selection".to_string(), json!(selection.source));
        if let Some(confidence) = selection.confidence {
            entry.insert("confidence".to_string(), json!(confidence));
        }
        Value::Object(entry)
    }
}

/// Backend fields derived from the slide, overlaid by its explicit parameters.
fn backend_parameters(slide: &SlideRequest) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(title) = &slide.content.title {
        params.insert("slide_title".to_string(), json!(title));
        params.insert("topic".to_string(), json!(title));
    }
    if !slide.content.key_points.is_empty() {
        params.insert("key_points".to_string(), json!(slide.content.key_points));
        params.insert("target_points".to_string(), json!(slide.content.key_points));
    }
    if let Some(text) = &slide.content.context_text {
        params.insert("narrative".to_string(), json!(text));
    }
    for (key, value) in &slide.parameters {
        params.insert(key.clone(), value.clone());
    }
    params
}

fn slide_failure(
    index: usize,
    slide_id: Option<String>,
    error_type: ErrorType,
    error: String,
) -> Value {
    log::warn!("Slide {} not generated: {}", index, error);
    let mut entry = Map::new();
    entry.insert("success".to_string(), Value::Bool(false));
    entry.insert("slide_index".to_string(), json!(index));
    if let Some(id) = slide_id {
        entry.insert("slide_id".to_string(), Value::String(id));
    }
    entry.insert("error".to_string(), Value::String(error));
    entry.insert("error_type".to_string(), json!(error_type));
    Value::Object(entry)
}

#[async_trait]
impl CapabilityHandler for GenerateSlideContentHandler {
    async fn call(
        &self,
        parameters: Map<String, Value>,
        _context: Map<String, Value>,
    ) -> anyhow::Result<Map<String, Value>> {
        let slides = match parameters.get("slides") {
            Some(Value::Array(slides)) => slides.clone(),
            _ => anyhow::bail!("'slides' must be an array"),
        };
        let shared = parameters
            .get("presentation_context")
            .and_then(Value::as_object);

        let rendered = join_all(slides.into_iter().enumerate().map(|(index, raw)| {
            let slide = serde_json::from_value::<SlideRequest>(raw)
                .map_err(|e| format!("Slide {} is malformed: {}", index, e));
            self.render(index, slide, shared)
        }))
        .await;

        let generated = rendered
            .iter()
            .filter(|entry| entry["success"] == Value::Bool(true))
            .count();
        let failed = rendered.len() - generated;
        log::info!(
            "Generated {} of {} slides ({} failed)",
            generated,
            rendered.len(),
            failed
        );

        let mut out = Map::new();
        out.insert("slides".to_string(), Value::Array(rendered));
        out.insert("generated".to_string(), json!(generated));
        out.insert("failed".to_string(), json!(failed));
        Ok(out)
    }
}
