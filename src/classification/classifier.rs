//! Keyword-overlap classifier.
//!
//! Scoring for a variant with keyword set `K` against lowercased text `T`:
//!
//! ```text
//! matched          = { k in K : T contains k }
//! match_score      = |matched|
//! keyword_coverage = |matched| / max(1, |K|)
//! match_strength   = min(1.0, match_score / 10)
//! confidence       = 0.6 * keyword_coverage + 0.4 * match_strength
//! ```
//!
//! Ranking: priority ascending, match_score descending, confidence
//! descending, then variant id and backend name so equal candidates always
//! come back in the same order.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::index::{IndexEntry, KeywordIndex};
use crate::catalog::BackendCatalog;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.1;
pub const DEFAULT_MAX_RESULTS: usize = 5;

const COVERAGE_WEIGHT: f64 = 0.6;
const STRENGTH_WEIGHT: f64 = 0.4;
const STRENGTH_SATURATION: f64 = 10.0;

/// Free-text slide content to classify.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationRequest {
    #[serde(default)]
    pub title: Option<String>,
    /// Non-string items are stringified; nulls are dropped.
    #[serde(default, deserialize_with = "deserialize_key_points")]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub context_text: Option<String>,
}

fn deserialize_key_points<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
        .collect())
}

impl ClassificationRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            title: None,
            key_points: Vec::new(),
            context_text: Some(text.into()),
        }
    }

    /// All provided fields joined and lowercased.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title);
        }
        parts.extend(self.key_points.iter().map(String::as_str));
        if let Some(context) = &self.context_text {
            parts.push(context);
        }
        parts.join(" ").to_lowercase()
    }

    pub fn is_empty(&self) -> bool {
        self.combined_text().trim().is_empty()
    }
}

/// A ranked candidate variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMatch {
    pub variant_id: String,
    pub backend: String,
    pub display_name: String,
    pub priority: u8,
    pub match_score: usize,
    /// Matched keywords in lexical order.
    pub matched_keywords: Vec<String>,
    pub confidence: f64,
}

/// Stateless classifier over a prebuilt keyword index.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    index: KeywordIndex,
}

impl Classifier {
    pub fn new(index: KeywordIndex) -> Self {
        Self { index }
    }

    pub fn from_catalog(catalog: &BackendCatalog) -> Self {
        Self::new(KeywordIndex::build(catalog))
    }

    pub fn index(&self) -> &KeywordIndex {
        &self.index
    }

    /// Rank candidate variants for the request.
    pub fn classify(
        &self,
        request: &ClassificationRequest,
        min_confidence: f64,
        max_results: usize,
    ) -> Vec<VariantMatch> {
        let text = request.combined_text();
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<VariantMatch> = self
            .index
            .entries()
            .iter()
            .filter_map(|entry| score_entry(entry, &text))
            .filter(|m| m.confidence >= min_confidence)
            .collect();

        matches.sort_by(rank_order);
        matches.truncate(max_results);

        log::debug!(
            "Classified {} chars: {} candidates{}",
            text.len(),
            matches.len(),
            matches
                .first()
                .map(|m| format!(", top {}/{} ({:.2})", m.backend, m.variant_id, m.confidence))
                .unwrap_or_default()
        );
        matches
    }

    /// `classify` with the default threshold and result limit.
    pub fn classify_default(&self, request: &ClassificationRequest) -> Vec<VariantMatch> {
        self.classify(request, DEFAULT_MIN_CONFIDENCE, DEFAULT_MAX_RESULTS)
    }

    /// Highest-ranked candidate, if any.
    pub fn best_match(&self, request: &ClassificationRequest) -> Option<VariantMatch> {
        self.classify(request, DEFAULT_MIN_CONFIDENCE, 1).into_iter().next()
    }
}

fn score_entry(entry: &IndexEntry, text: &str) -> Option<VariantMatch> {
    let matched: Vec<String> = entry
        .keywords
        .iter()
        .filter(|kw| text.contains(kw.as_str()))
        .cloned()
        .collect();
    if matched.is_empty() {
        return None;
    }

    let match_score = matched.len();
    let keyword_coverage = match_score as f64 / entry.keywords.len().max(1) as f64;
    let match_strength = (match_score as f64 / STRENGTH_SATURATION).min(1.0);
    let confidence = COVERAGE_WEIGHT * keyword_coverage + STRENGTH_WEIGHT * match_strength;

    Some(VariantMatch {
        variant_id: entry.variant_id.clone(),
        backend: entry.backend.clone(),
        display_name: entry.display_name.clone(),
        priority: entry.priority,
        match_score,
        matched_keywords: matched,
        confidence: confidence.clamp(0.0, 1.0),
    })
}

fn rank_order(a: &VariantMatch, b: &VariantMatch) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.match_score.cmp(&a.match_score))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.variant_id.cmp(&b.variant_id))
        .then_with(|| a.backend.cmp(&b.backend))
}
