//! # deckhand
//!
//! Capability dispatch core for an AI presentation-generation backend.
//!
//! AI-issued capability calls pass through a policy gate (parameter schema,
//! session prerequisites, explicit approval) before any side effect. Content
//! capabilities classify slide text against a keyword index of backend
//! variants and dispatch the chosen variant to one of several content
//! backends, each speaking one of three endpoint conventions.
//!
//! ```text
//! CapabilityCall
//!   → tools::ToolRegistry        (policy::PolicyGate)
//!   → classification::Classifier (pick a variant)
//!   → interfaces::RoutingDispatcher
//!   → interfaces::ServiceAdapter → HttpTransport → backend
//! ```

pub mod capabilities;
pub mod catalog;
pub mod classification;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod policy;
pub mod server;
pub mod session;
pub mod tools;

pub use capabilities::{CapabilityCatalog, CapabilityDefinition, CostTier};
pub use catalog::{BackendCatalog, BackendConfig, EndpointStrategy, VariantDefinition};
pub use classification::{ClassificationRequest, Classifier, VariantMatch};
pub use error::{ErrorType, ToolError};
pub use interfaces::{GenerationResult, RoutingDispatcher};
pub use policy::PolicyGate;
pub use session::{ProgressFlag, SessionProgressRecord};
pub use tools::{CapabilityCall, CapabilityResult, ToolRegistry};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
