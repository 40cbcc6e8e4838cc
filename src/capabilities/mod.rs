//! # Capability Catalog
//!
//! Definitions of every invocable capability ("tool"): id, cost tier,
//! declared parameter schema, session prerequisites and approval flag.
//!
//! ```text
//! decision maker ── CapabilityCall ──▶ ToolRegistry
//!                                        │ catalog.get(id)
//!                                        │ PolicyGate: schema → prerequisites → approval
//!                                        ▼
//!                                      handler(params, context)
//! ```

pub mod capability;
pub mod registry;
pub mod schema;

pub use capability::{CapabilityDefinition, CostTier};
pub use registry::CapabilityCatalog;
pub use schema::{FieldRule, FieldType, ParameterSchema, SchemaViolation};
