// src/models/records.rs - Input rows, match results and the per-row audit record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::matching::fuzzy::SimilarityAlgorithm;
use crate::matching::matcher::CandidateMatch;
use crate::matching::rules::RewriteOutcome;
use crate::models::catalog::CatalogEntry;
use crate::models::rules::RuleSetVersion;

/// One raw vendor row. Everything except the description and vendor name is
/// carried through to the output untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InputRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub vendor_product_description: Option<String>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl InputRow {
    pub fn new(description: &str) -> Self {
        Self {
            vendor_product_description: Some(description.to_string()),
            ..Self::default()
        }
    }

    pub fn with_vendor(mut self, vendor_name: &str) -> Self {
        self.vendor_name = Some(vendor_name.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Key used to spot repeated rows inside one batch.
    pub fn duplicate_key(&self) -> String {
        format!(
            "{}|{}",
            self.vendor_product_description.as_deref().unwrap_or("").trim().to_lowercase(),
            self.vendor_name.as_deref().unwrap_or("").trim().to_lowercase()
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppliedSynonym {
    pub original: String,
    pub replacement: String,
}

/// Per-row conditions that are reported rather than raised.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RowIssue {
    EmptyInput,
    CatalogEmpty,
    TaskFailed(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub cleaned_input: String,
    pub applied_synonyms: Vec<AppliedSynonym>,
    pub removed_blacklist_words: Vec<String>,
    pub best_match: Option<CatalogEntry>,
    pub similarity_percentage: u8,
    pub matched_words: BTreeSet<String>,
    pub missing_words: BTreeSet<String>,
    pub algorithm_used: String,
}

impl MatchResult {
    pub fn assemble(rewrite: RewriteOutcome, candidate: CandidateMatch) -> Self {
        Self {
            cleaned_input: rewrite.text,
            applied_synonyms: rewrite.applied_synonyms,
            removed_blacklist_words: rewrite.removed_blacklist,
            best_match: candidate.best_match,
            similarity_percentage: candidate.similarity_percentage,
            matched_words: candidate.matched_words,
            missing_words: candidate.missing_words,
            algorithm_used: SimilarityAlgorithm::label(candidate.algorithm_used),
        }
    }

    pub fn unmatched(cleaned_input: String) -> Self {
        Self {
            cleaned_input,
            applied_synonyms: Vec::new(),
            removed_blacklist_words: Vec::new(),
            best_match: None,
            similarity_percentage: 0,
            matched_words: BTreeSet::new(),
            missing_words: BTreeSet::new(),
            algorithm_used: SimilarityAlgorithm::label(None),
        }
    }

    pub fn catalog_id(&self) -> Option<&str> {
        self.best_match.as_ref().map(|entry| entry.catalog_id.as_str())
    }

    /// Applied synonyms in the `original→replacement, ...` form reviewers see.
    pub fn format_applied_synonyms(&self) -> String {
        self.applied_synonyms
            .iter()
            .map(|s| format!("{}→{}", s.original, s.replacement))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    #[default]
    Pending,
    Accepted,
    Denied,
}

/// Reviewer state attached to a record. The pipeline never changes it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ReviewState {
    #[serde(default)]
    pub decision: ReviewDecision,
    /// Rule action requested by the reviewer (`synonym` or `blacklist`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub row_index: usize,
    pub row: InputRow,
    pub result: MatchResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<RowIssue>,
    #[serde(default)]
    pub review: ReviewState,
    /// Process-unique index version the match was computed against.
    pub catalog_version: u64,
    /// Version the catalog loader reported, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_source_version: Option<u64>,
    #[serde(default)]
    pub rule_set_version: RuleSetVersion,
    pub processed_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record for a row whose worker task died before producing a result.
    pub fn failed(
        row_index: usize,
        row: InputRow,
        reason: &str,
        catalog_version: u64,
        catalog_source_version: Option<u64>,
        rule_set_version: RuleSetVersion,
    ) -> Self {
        Self {
            row_index,
            row,
            result: MatchResult::unmatched(String::new()),
            duplicate_of: None,
            issues: vec![RowIssue::TaskFailed(reason.to_string())],
            review: ReviewState::default(),
            catalog_version,
            catalog_source_version,
            rule_set_version,
            processed_at: Utc::now(),
        }
    }

    pub fn has_issue(&self, issue: &RowIssue) -> bool {
        self.issues.contains(issue)
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }

    /// Whether the winning candidate is a staging (create-candidate) entry.
    pub fn matched_staging(&self) -> bool {
        self.result
            .best_match
            .as_ref()
            .map_or(false, |entry| entry.is_staging())
    }
}
