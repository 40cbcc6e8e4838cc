//! ToolRegistry - the capability invocation pipeline.
//!
//! ```text
//! execute(call, session, check_approval)
//!   → catalog lookup            (NotFound)
//!   → PolicyGate::authorize     (Validation / Prerequisite / ApprovalRequired)
//!   → handler.call(params, ctx) (Execution)
//!   → CapabilityResult + elapsed_ms
//! ```
//!
//! Pre-flight failures are returned as `Err` before the handler runs.
//! `execute_batch` converts every per-call error into a failed result at
//! that call's position instead.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::{Map, Value};

use super::handler::CapabilityHandler;
use super::types::{CapabilityCall, CapabilityResult};
use crate::capabilities::{CapabilityCatalog, CapabilityDefinition, CostTier};
use crate::error::ToolError;
use crate::policy::PolicyGate;

/// Capability definitions, their handlers and the policy gate guarding them.
pub struct ToolRegistry {
    catalog: CapabilityCatalog,
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
    policy: PolicyGate,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_catalog(CapabilityCatalog::new())
    }

    /// Start from definitions loaded elsewhere (e.g. YAML); attach handlers
    /// with [`ToolRegistry::register_handler`].
    pub fn with_catalog(catalog: CapabilityCatalog) -> Self {
        Self {
            catalog,
            handlers: HashMap::new(),
            policy: PolicyGate::default(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyGate) -> Self {
        self.policy = policy;
        self
    }

    /// Register a definition with its handler. Replaces any previous entry.
    pub fn register(
        &mut self,
        definition: CapabilityDefinition,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<(), ToolError> {
        let id = definition.id.clone();
        self.catalog.register(definition)?;
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Attach a handler to an already-declared capability.
    pub fn register_handler(
        &mut self,
        capability_id: &str,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<(), ToolError> {
        if !self.catalog.contains(capability_id) {
            return Err(ToolError::NotFound(capability_id.to_string()));
        }
        self.handlers.insert(capability_id.to_string(), handler);
        Ok(())
    }

    pub fn unregister(&mut self, capability_id: &str) -> Option<CapabilityDefinition> {
        self.handlers.remove(capability_id);
        self.catalog.unregister(capability_id)
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &PolicyGate {
        &self.policy
    }

    pub fn get(&self, capability_id: &str) -> Option<&CapabilityDefinition> {
        self.catalog.get(capability_id)
    }

    pub fn list(&self) -> Vec<&CapabilityDefinition> {
        self.catalog.list()
    }

    pub fn list_by_tier(&self, tier: CostTier) -> Vec<&CapabilityDefinition> {
        self.catalog.list_by_tier(tier)
    }

    pub fn has_handler(&self, capability_id: &str) -> bool {
        self.handlers.contains_key(capability_id)
    }

    /// Run one call. Pre-flight and handler failures are returned as `Err`.
    pub async fn execute(
        &self,
        call: &CapabilityCall,
        session_context: &Map<String, Value>,
        check_approval: bool,
    ) -> Result<CapabilityResult, ToolError> {
        let definition = self
            .catalog
            .get(&call.capability_id)
            .ok_or_else(|| ToolError::NotFound(call.capability_id.clone()))?;

        self.policy
            .authorize(definition, &call.parameters, session_context, check_approval)?;

        let handler = self
            .handlers
            .get(&definition.id)
            .ok_or_else(|| ToolError::Execution {
                capability_id: definition.id.clone(),
                message: "no handler registered".to_string(),
            })?;

        let invocation_id = uuid::Uuid::new_v4();
        log::info!(
            "Executing capability '{}' [{}] ({} tier)",
            definition.id,
            invocation_id,
            definition.cost_tier.as_str()
        );

        let context = handler_context(call, session_context);
        let start = Instant::now();
        let parameters = call.parameters.clone();
        let outcome = AssertUnwindSafe(async move { handler.call(parameters, context).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!("handler panicked: {}", panic_message(panic.as_ref())))
            });
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(data) => {
                log::debug!(
                    "Capability '{}' [{}] completed in {:.1}ms",
                    definition.id,
                    invocation_id,
                    elapsed_ms
                );
                Ok(CapabilityResult::ok(&definition.id, data, elapsed_ms))
            }
            Err(e) => {
                log::warn!(
                    "Capability '{}' [{}] failed after {:.1}ms: {:#}",
                    definition.id,
                    invocation_id,
                    elapsed_ms,
                    e
                );
                Err(ToolError::Execution {
                    capability_id: definition.id.clone(),
                    message: format!("{:#}", e),
                })
            }
        }
    }

    /// Run several calls with per-call isolation. The output has one result
    /// per call, in input order.
    pub async fn execute_batch(
        &self,
        calls: &[CapabilityCall],
        session_context: &Map<String, Value>,
        check_approval: bool,
        parallel: bool,
    ) -> Vec<CapabilityResult> {
        let results = if parallel {
            join_all(
                calls
                    .iter()
                    .map(|call| self.execute_isolated(call, session_context, check_approval)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(
                    self.execute_isolated(call, session_context, check_approval)
                        .await,
                );
            }
            results
        };

        let failed = results.iter().filter(|r| !r.success).count();
        log::info!(
            "Batch of {} calls finished ({} failed, parallel={})",
            calls.len(),
            failed,
            parallel
        );
        results
    }

    async fn execute_isolated(
        &self,
        call: &CapabilityCall,
        session_context: &Map<String, Value>,
        check_approval: bool,
    ) -> CapabilityResult {
        match self.execute(call, session_context, check_approval).await {
            Ok(result) => result,
            Err(e) => CapabilityResult::failure(&call.capability_id, &e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

/// Session snapshot with the call's overrides on top, plus its targets.
fn handler_context(call: &CapabilityCall, session_context: &Map<String, Value>) -> Map<String, Value> {
    let mut context = session_context.clone();
    if let Some(overrides) = &call.context {
        for (key, value) in overrides {
            context.insert(key.clone(), value.clone());
        }
    }
    if !call.target_ids.is_empty() {
        context.insert(
            "target_ids".to_string(),
            Value::Array(call.target_ids.iter().cloned().map(Value::String).collect()),
        );
    }
    context
}
