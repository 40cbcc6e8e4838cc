//! Capability handler trait.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// The work behind a capability. Runs only after the policy gate passed.
///
/// `context` is the session snapshot with the call's override context
/// merged over it, plus `target_ids` when the call carries any.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn call(
        &self,
        parameters: Map<String, Value>,
        context: Map<String, Value>,
    ) -> anyhow::Result<Map<String, Value>>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>, Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Map<String, Value>>> + Send,
{
    async fn call(
        &self,
        parameters: Map<String, Value>,
        context: Map<String, Value>,
    ) -> anyhow::Result<Map<String, Value>> {
        (self.func)(parameters, context).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn CapabilityHandler>
where
    F: Fn(Map<String, Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Map<String, Value>>> + Send + 'static,
{
    Arc::new(FnHandler { func })
}
