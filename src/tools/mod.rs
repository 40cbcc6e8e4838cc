//! Capability invocation pipeline.
//!
//! `ToolRegistry` owns capability definitions and their handlers, gates
//! every call through the policy checks, and runs single calls or batches.
//! `content` provides the built-in presentation capabilities.

pub mod content;
pub mod handler;
pub mod registry;
pub mod types;

pub use content::{register_content_capabilities, CLASSIFY_SLIDE, GENERATE_SLIDE_CONTENT};
pub use handler::{handler_fn, CapabilityHandler, FnHandler};
pub use registry::ToolRegistry;
pub use types::{CapabilityCall, CapabilityResult};
