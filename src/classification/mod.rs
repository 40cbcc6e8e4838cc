//! # Classification Engine
//!
//! Maps free-text slide content to a ranked list of candidate variants by
//! substring keyword overlap. Deterministic and stateless; the index is built
//! once from the backend catalog and only read afterwards.

pub mod classifier;
pub mod index;

pub use classifier::{
    ClassificationRequest, Classifier, VariantMatch, DEFAULT_MAX_RESULTS, DEFAULT_MIN_CONFIDENCE,
};
pub use index::{IndexEntry, KeywordIndex};
