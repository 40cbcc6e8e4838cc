//! Session progress record.
//!
//! A flat record of monotonic progress milestones plus an open context bag.
//! The surrounding orchestrator owns and mutates it between dispatcher calls;
//! this crate only reads the decision snapshot, except for the explicit
//! [`SessionProgressRecord::clear_all`] reset when the user starts over.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot key of the explicit-approval flag read by the approval check.
pub const APPROVAL_FLAG: &str = "has_explicit_approval";

/// Enumerated progress milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressFlag {
    InitialRequest,
    Clarifications,
    Strawman,
    ExplicitApproval,
    GeneratedContent,
    FinalPresentation,
}

impl ProgressFlag {
    pub const ALL: [ProgressFlag; 6] = [
        ProgressFlag::InitialRequest,
        ProgressFlag::Clarifications,
        ProgressFlag::Strawman,
        ProgressFlag::ExplicitApproval,
        ProgressFlag::GeneratedContent,
        ProgressFlag::FinalPresentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressFlag::InitialRequest => "initial_request",
            ProgressFlag::Clarifications => "clarifications",
            ProgressFlag::Strawman => "strawman",
            ProgressFlag::ExplicitApproval => "explicit_approval",
            ProgressFlag::GeneratedContent => "generated_content",
            ProgressFlag::FinalPresentation => "final_presentation",
        }
    }

    /// Key under which the flag appears in the decision snapshot.
    pub fn snapshot_key(&self) -> String {
        format!("has_{}", self.as_str())
    }
}

impl std::str::FromStr for ProgressFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.strip_prefix("has_").unwrap_or(s);
        ProgressFlag::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == bare)
            .ok_or_else(|| format!("unknown progress flag: {}", s))
    }
}

/// Orchestrator-owned progress record for one presentation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProgressRecord {
    #[serde(default)]
    pub flags: BTreeMap<ProgressFlag, bool>,

    #[serde(default)]
    pub context: Map<String, Value>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionProgressRecord {
    fn default() -> Self {
        Self {
            flags: BTreeMap::new(),
            context: Map::new(),
            updated_at: Utc::now(),
        }
    }
}

impl SessionProgressRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, flag: ProgressFlag, value: bool) {
        self.flags.insert(flag, value);
        self.updated_at = Utc::now();
    }

    pub fn is_set(&self, flag: ProgressFlag) -> bool {
        self.flags.get(&flag).copied().unwrap_or(false)
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Read-only projection used by the policy gate and handlers.
    ///
    /// Context entries first, then every flag as `has_<flag>: bool`; flags
    /// win on key collision.
    pub fn get_decision_snapshot(&self) -> Map<String, Value> {
        let mut snapshot = self.context.clone();
        for flag in ProgressFlag::ALL {
            snapshot.insert(flag.snapshot_key(), Value::Bool(self.is_set(flag)));
        }
        snapshot
    }

    /// Reset every flag and all context ("start a new presentation").
    pub fn clear_all(&mut self) {
        log::info!("Clearing session progress record");
        self.flags.clear();
        self.context.clear();
        self.updated_at = Utc::now();
    }
}
