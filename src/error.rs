//! Error types for the capability invocation path.
//!
//! Pre-flight failures (`NotFound`, `Validation`, `Prerequisite`,
//! `ApprovalRequired`) are raised before any handler runs. `Execution` wraps
//! whatever the handler itself returned.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the catalog, the policy gate and the invocation pipeline.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Unknown capability id (or a capability with no bound handler).
    #[error("Capability not found: {0}")]
    NotFound(String),

    /// A parameter violated the capability's declared input schema.
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    /// A required session context key or `has_<key>` flag is missing.
    #[error("Prerequisite not met for {capability_id}: {message}")]
    Prerequisite {
        capability_id: String,
        message: String,
    },

    /// The capability requires explicit user approval and the session has none.
    #[error("Capability {capability_id} requires explicit user approval")]
    ApprovalRequired { capability_id: String },

    /// The handler failed.
    #[error("Capability {capability_id} failed: {message}")]
    Execution {
        capability_id: String,
        message: String,
    },

    /// The definition's own schema is inconsistent.
    #[error("Invalid capability definition {capability_id}: {message}")]
    InvalidDefinition {
        capability_id: String,
        message: String,
    },
}

impl ToolError {
    /// True for every error raised before the handler is invoked.
    pub fn is_pre_flight(&self) -> bool {
        !matches!(self, ToolError::Execution { .. })
    }

    /// Stable tag used in failure envelopes and HTTP error bodies.
    pub fn kind(&self) -> ErrorType {
        match self {
            ToolError::NotFound(_) => ErrorType::NotFound,
            ToolError::Validation { .. } => ErrorType::Validation,
            ToolError::Prerequisite { .. } => ErrorType::Prerequisite,
            ToolError::ApprovalRequired { .. } => ErrorType::ApprovalRequired,
            ToolError::Execution { .. } => ErrorType::Execution,
            ToolError::InvalidDefinition { .. } => ErrorType::Configuration,
        }
    }
}

/// Failure category carried by structured (non-raised) failure results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    NotFound,
    Disabled,
    Validation,
    Prerequisite,
    ApprovalRequired,
    Execution,
    Configuration,
    Timeout,
    HttpError,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::NotFound => "not_found",
            ErrorType::Disabled => "disabled",
            ErrorType::Validation => "validation",
            ErrorType::Prerequisite => "prerequisite",
            ErrorType::ApprovalRequired => "approval_required",
            ErrorType::Execution => "execution",
            ErrorType::Configuration => "configuration",
            ErrorType::Timeout => "timeout",
            ErrorType::HttpError => "http_error",
            ErrorType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
