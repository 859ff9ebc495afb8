// src/matching/matcher.rs - Best-candidate selection with ordered algorithm fallback
use log::debug;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::matching::catalog_index::{CatalogIndex, IndexedEntry};
use crate::matching::fuzzy::SimilarityAlgorithm;
use crate::matching::normalizer::extract_words;
use crate::models::catalog::CatalogEntry;
use crate::utils::config::MatchingConfig;
use crate::utils::constants::{DEFAULT_MIN_TOKEN_LENGTH, DEFAULT_SIMILARITY_FLOOR};

/// Match fields of a result, without the text-rewrite audit. This is what the
/// cache stores.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub best_match: Option<CatalogEntry>,
    pub similarity_percentage: u8,
    pub matched_words: BTreeSet<String>,
    pub missing_words: BTreeSet<String>,
    pub algorithm_used: Option<SimilarityAlgorithm>,
    /// Catalog version the candidate was chosen from.
    pub catalog_version: u64,
}

impl CandidateMatch {
    pub fn no_candidates(catalog_version: u64) -> Self {
        Self {
            best_match: None,
            similarity_percentage: 0,
            matched_words: BTreeSet::new(),
            missing_words: BTreeSet::new(),
            algorithm_used: None,
            catalog_version,
        }
    }
}

/// A candidate's score under one algorithm.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a IndexedEntry,
    pub score: u8,
}

/// Higher score first, then master before staging, then the smaller
/// catalog_id, then catalog position. `Less` means `a` wins.
fn rank(a: &ScoredCandidate<'_>, b: &ScoredCandidate<'_>) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.candidate.entry.origin.cmp(&b.candidate.entry.origin))
        .then_with(|| a.candidate.entry.catalog_id.cmp(&b.candidate.entry.catalog_id))
        .then_with(|| a.candidate.position.cmp(&b.candidate.position))
}

#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
    floor: u8,
    min_token_length: usize,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_FLOOR, DEFAULT_MIN_TOKEN_LENGTH)
    }
}

impl FuzzyMatcher {
    pub fn new(floor: u8, min_token_length: usize) -> Self {
        Self {
            floor: floor.min(100),
            min_token_length: min_token_length.max(1),
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.similarity_floor, config.min_token_length)
    }

    pub fn floor(&self) -> u8 {
        self.floor
    }

    /// Top candidate under a single algorithm, or `None` for an empty catalog.
    pub fn top_for_algorithm<'a>(
        &self,
        algorithm: SimilarityAlgorithm,
        cleaned: &str,
        index: &'a CatalogIndex,
    ) -> Option<ScoredCandidate<'a>> {
        index
            .candidates()
            .iter()
            .map(|candidate| ScoredCandidate {
                candidate,
                score: algorithm.score(cleaned, &candidate.entry.search_key),
            })
            .min_by(rank)
    }

    /// Runs the algorithms in fallback order and stops at the first whose top
    /// score reaches the floor. If none does, the best candidate seen across all
    /// attempts is still reported; an earlier algorithm keeps a tied score.
    pub fn find_best_match(&self, cleaned: &str, index: &CatalogIndex) -> CandidateMatch {
        let mut best: Option<(SimilarityAlgorithm, ScoredCandidate<'_>)> = None;

        for algorithm in SimilarityAlgorithm::FALLBACK_ORDER {
            let Some(top) = self.top_for_algorithm(algorithm, cleaned, index) else {
                return CandidateMatch::no_candidates(index.version());
            };
            debug!(
                "{} top score {} for '{}' ({})",
                algorithm, top.score, cleaned, top.candidate.entry.catalog_id
            );
            let accepted = top.score >= self.floor;
            if best.as_ref().map_or(true, |(_, b)| top.score > b.score) {
                best = Some((algorithm, top));
            }
            if accepted {
                break;
            }
        }

        match best {
            Some((algorithm, winner)) => self.describe(cleaned, algorithm, winner, index.version()),
            None => CandidateMatch::no_candidates(index.version()),
        }
    }

    fn describe(
        &self,
        cleaned: &str,
        algorithm: SimilarityAlgorithm,
        winner: ScoredCandidate<'_>,
        catalog_version: u64,
    ) -> CandidateMatch {
        let (matched_words, missing_words): (BTreeSet<String>, BTreeSet<String>) = extract_words(cleaned, self.min_token_length)
            .into_iter()
            .partition(|word| winner.candidate.tokens.contains(word));

        CandidateMatch {
            best_match: Some(winner.candidate.entry.clone()),
            similarity_percentage: winner.score,
            matched_words,
            missing_words,
            algorithm_used: Some(algorithm),
            catalog_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::CatalogEntry;

    fn keyed(id: &str, key: &str) -> CatalogEntry {
        CatalogEntry::master(id, "", "", "", "").with_search_key(key)
    }

    fn staged(key: &str) -> CatalogEntry {
        CatalogEntry::staging("", "", "", "").with_search_key(key)
    }

    #[test]
    fn test_primary_algorithm_accepted_above_floor() {
        let index = CatalogIndex::build(
            vec![keyed("A1", "rosa roja 60cm"), keyed("A2", "clavel blanco")],
            vec![],
        )
        .unwrap();
        let result = FuzzyMatcher::default().find_best_match("60cm roja rosa", &index);
        assert_eq!(result.best_match.unwrap().catalog_id, "A1");
        assert_eq!(result.similarity_percentage, 100);
        assert_eq!(result.algorithm_used, Some(SimilarityAlgorithm::TokenSortRatio));
        assert!(result.missing_words.is_empty());
    }

    #[test]
    fn test_falls_back_until_floor_is_met() {
        let index = CatalogIndex::build(vec![keyed("A1", "cafe premium rose")], vec![]).unwrap();
        let result = FuzzyMatcher::default().find_best_match("cafe rose", &index);
        assert_eq!(result.algorithm_used, Some(SimilarityAlgorithm::TokenSetRatio));
        assert_eq!(result.similarity_percentage, 100);
        assert!(result.matched_words.contains("cafe"));
        assert!(result.matched_words.contains("rose"));
        assert!(result.missing_words.is_empty());
    }

    #[test]
    fn test_low_scores_still_report_best_candidate() {
        let index = CatalogIndex::build(vec![keyed("A1", "hydrangea blue select")], vec![]).unwrap();
        let matcher = FuzzyMatcher::new(100, 2);
        let result = matcher.find_best_match("rosa roja", &index);
        assert_eq!(result.best_match.unwrap().catalog_id, "A1");
        assert!(result.similarity_percentage < 100);
        assert!(result.algorithm_used.is_some());
        assert_eq!(
            result.missing_words,
            ["roja", "rosa"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn test_master_wins_tie_against_staging() {
        let index = CatalogIndex::build(
            vec![keyed("Z9", "rosa roja")],
            vec![staged("rosa roja")],
        )
        .unwrap();
        let result = FuzzyMatcher::default().find_best_match("rosa roja", &index);
        let winner = result.best_match.unwrap();
        assert_eq!(winner.catalog_id, "Z9");
        assert!(!winner.is_staging());
    }

    #[test]
    fn test_smallest_catalog_id_wins_tie() {
        let index = CatalogIndex::build(
            vec![keyed("B2", "rosa roja"), keyed("A7", "rosa roja")],
            vec![],
        )
        .unwrap();
        let result = FuzzyMatcher::default().find_best_match("rosa roja", &index);
        assert_eq!(result.best_match.unwrap().catalog_id, "A7");
    }

    #[test]
    fn test_empty_catalog_returns_no_match() {
        let index = CatalogIndex::empty();
        let result = FuzzyMatcher::default().find_best_match("rosa roja", &index);
        assert_eq!(result, CandidateMatch::no_candidates(index.version()));
    }

    #[test]
    fn test_empty_input_still_reports_a_candidate() {
        let index = CatalogIndex::build(vec![keyed("A1", "rosa roja")], vec![]).unwrap();
        let result = FuzzyMatcher::default().find_best_match("", &index);
        assert_eq!(result.similarity_percentage, 0);
        assert_eq!(result.best_match.unwrap().catalog_id, "A1");
        assert!(result.matched_words.is_empty());
    }

    #[test]
    fn test_short_tokens_are_ignored_in_word_analysis() {
        let index = CatalogIndex::build(vec![keyed("A1", "rosa roja")], vec![]).unwrap();
        let result = FuzzyMatcher::default().find_best_match("rosa x roja", &index);
        assert!(!result.missing_words.contains("x"));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let index = CatalogIndex::build(
            vec![keyed("A1", "rosa roja"), keyed("A2", "rosa rosada"), keyed("A3", "rosa blanca")],
            vec![staged("rosa roja premium")],
        )
        .unwrap();
        let matcher = FuzzyMatcher::default();
        let first = matcher.find_best_match("rosa roj", &index);
        for _ in 0..5 {
            assert_eq!(matcher.find_best_match("rosa roj", &index), first);
        }
    }
}
