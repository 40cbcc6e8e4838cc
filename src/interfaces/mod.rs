//! # Service Adapters & Routing
//!
//! Connects a concrete variant selection to the backend that renders it.
//! Every backend speaks one of three contract shapes, distinguished by how
//! the target URL is resolved:
//!
//! ```text
//! RoutingDispatcher::generate(variant, backend, params)
//!   │
//!   ▼
//! ContentAdapter (trait)
//!   └── ServiceAdapter
//!         ├── single       base + default_endpoint, variant id in body
//!         ├── per_variant  base + variant.endpoint
//!         └── typed        base + endpoints[service_specific.endpoint_key]
//!   │
//!   ▼
//! HttpTransport (trait)
//!   ├── ReqwestTransport
//!   └── RetryingTransport<T>   (optional exponential backoff)
//! ```
//!
//! ## Extending
//!
//! A backend whose request shape does not fit the built-in builders gets a
//! custom `RequestBuilder` via `ServiceAdapter::with_builder`, or a full
//! `ContentAdapter` registered with `RoutingDispatcher::register_adapter`.

pub mod adapter;
pub mod dispatcher;
pub mod transport;

pub use adapter::{
    AdapterError, ContentAdapter, PerVariantBuilder, RequestBuilder, ResponseContract,
    ServiceAdapter, SingleEndpointBuilder, TypedBuilder, ANNOTATION_KEY, COLLISIONS_KEY,
    CONTENT_KEY,
};
pub use dispatcher::{GenerationResult, RoutingDispatcher};
pub use transport::{HttpTransport, ReqwestTransport, RetryingTransport, TransportError};
