// src/matching/summary.rs - Batch statistics and missing-word classification
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::matching::cache::CacheStats;
use crate::models::records::{AuditRecord, ReviewDecision, RowIssue};
use crate::utils::constants::UNCLASSIFIED_CATEGORY;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityStats {
    pub average: f64,
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingSummary {
    pub generated_at: DateTime<Utc>,
    pub total_rows: usize,
    pub unique_rows: usize,
    pub duplicate_rows: usize,
    /// Rows whose best candidate is a staging (to-be-created) product.
    pub staging_matches: usize,
    pub rows_at_or_above_floor: usize,
    pub empty_input_rows: usize,
    pub catalog_empty_rows: usize,
    pub failed_rows: usize,
    /// Over rows that have a best candidate. `None` when no row has one.
    pub similarity: Option<SimilarityStats>,
    pub accepted: usize,
    pub denied: usize,
    pub pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit_rate: Option<f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ProcessingSummary {
    pub fn from_records(records: &[AuditRecord], floor: u8, cache_stats: Option<&CacheStats>) -> Self {
        let scores: Vec<u8> = records
            .iter()
            .filter(|r| r.result.best_match.is_some())
            .map(|r| r.result.similarity_percentage)
            .collect();

        let similarity = if scores.is_empty() {
            None
        } else {
            let sum: u64 = scores.iter().map(|&s| s as u64).sum();
            Some(SimilarityStats {
                average: round2(sum as f64 / scores.len() as f64),
                min: scores.iter().copied().min().unwrap_or(0),
                max: scores.iter().copied().max().unwrap_or(0),
            })
        };

        let count_decision = |decision: ReviewDecision| {
            records.iter().filter(|r| r.review.decision == decision).count()
        };
        let duplicate_rows = records.iter().filter(|r| r.is_duplicate()).count();

        Self {
            generated_at: Utc::now(),
            total_rows: records.len(),
            unique_rows: records.len() - duplicate_rows,
            duplicate_rows,
            staging_matches: records.iter().filter(|r| r.matched_staging()).count(),
            rows_at_or_above_floor: records
                .iter()
                .filter(|r| r.result.best_match.is_some() && r.result.similarity_percentage >= floor)
                .count(),
            empty_input_rows: records.iter().filter(|r| r.has_issue(&RowIssue::EmptyInput)).count(),
            catalog_empty_rows: records.iter().filter(|r| r.has_issue(&RowIssue::CatalogEmpty)).count(),
            failed_rows: records
                .iter()
                .filter(|r| r.issues.iter().any(|i| matches!(i, RowIssue::TaskFailed(_))))
                .count(),
            similarity,
            accepted: count_decision(ReviewDecision::Accepted),
            denied: count_decision(ReviewDecision::Denied),
            pending: count_decision(ReviewDecision::Pending),
            cache_hit_rate: cache_stats.filter(|s| s.lookups() > 0).map(|s| round2(s.hit_rate())),
        }
    }

    pub fn average_similarity(&self) -> f64 {
        self.similarity.as_ref().map_or(0.0, |s| s.average)
    }
}

/// Maps each missing word to the first category (in name order) listing it,
/// case-insensitively, or to `"unclassified"`. Returns the distinct
/// categories, sorted.
pub fn classify_missing_words<'a, I>(missing: I, classification: &BTreeMap<String, Vec<String>>) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let lowered: BTreeMap<&str, BTreeSet<String>> = classification
        .iter()
        .map(|(category, words)| {
            (category.as_str(), words.iter().map(|w| w.to_lowercase()).collect())
        })
        .collect();

    missing
        .into_iter()
        .filter(|word| !word.trim().is_empty())
        .map(|word| {
            let word = word.trim().to_lowercase();
            lowered
                .iter()
                .find(|(_, words)| words.contains(&word))
                .map_or(UNCLASSIFIED_CATEGORY, |(category, _)| *category)
                .to_string()
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
