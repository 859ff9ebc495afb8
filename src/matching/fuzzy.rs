// src/matching/fuzzy.rs - Token-alignment similarity ratios on a 0-100 scale
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Similarity strategies, tried by the matcher in `FALLBACK_ORDER`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityAlgorithm {
    TokenSortRatio,
    PartialRatio,
    TokenSetRatio,
}

impl SimilarityAlgorithm {
    pub const FALLBACK_ORDER: [SimilarityAlgorithm; 3] = [
        SimilarityAlgorithm::TokenSortRatio,
        SimilarityAlgorithm::PartialRatio,
        SimilarityAlgorithm::TokenSetRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityAlgorithm::TokenSortRatio => "token_sort_ratio",
            SimilarityAlgorithm::PartialRatio => "partial_ratio",
            SimilarityAlgorithm::TokenSetRatio => "token_set_ratio",
        }
    }

    /// Name recorded on a match result; `"none"` when nothing was scored.
    pub fn label(algorithm: Option<SimilarityAlgorithm>) -> String {
        algorithm.map_or("none", |a| a.as_str()).to_string()
    }

    pub fn score(&self, a: &str, b: &str) -> u8 {
        let raw = match self {
            SimilarityAlgorithm::TokenSortRatio => token_sort_ratio(a, b),
            SimilarityAlgorithm::PartialRatio => partial_ratio(a, b),
            SimilarityAlgorithm::TokenSetRatio => token_set_ratio(a, b),
        };
        round_score(raw)
    }
}

impl fmt::Display for SimilarityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn round_score(raw: f64) -> u8 {
    raw.round().clamp(0.0, 100.0) as u8
}

/// Normalized Levenshtein similarity scaled to 0-100. An empty side scores 0,
/// even against another empty string.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Ratio of the two strings after sorting their tokens, so word order is ignored.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Best ratio between the shorter string and any equally long window of the
/// longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (shorter, longer): (Vec<char>, Vec<char>) = {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        if a.len() <= b.len() { (a, b) } else { (b, a) }
    };
    if shorter.is_empty() {
        return 0.0;
    }
    let needle: String = shorter.iter().collect();
    if shorter.len() == longer.len() {
        return ratio(&needle, &longer.iter().collect::<String>());
    }

    let mut best = 0.0_f64;
    for window in longer.windows(shorter.len()) {
        let candidate: String = window.iter().collect();
        let score = ratio(&needle, &candidate);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

/// Compares the shared tokens against each side's shared-plus-remaining tokens
/// and keeps the best of the three pairings. A description whose words are
/// all contained in the other scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let join = |parts: Vec<&str>| parts.join(" ");
    let sect = join(set_a.intersection(&set_b).copied().collect());
    let diff_ab = join(set_a.difference(&set_b).copied().collect());
    let diff_ba = join(set_b.difference(&set_a).copied().collect());

    let combine = |diff: &str| {
        if sect.is_empty() {
            diff.to_string()
        } else if diff.is_empty() {
            sect.clone()
        } else {
            format!("{} {}", sect, diff)
        }
    };
    let combined_ab = combine(&diff_ab);
    let combined_ba = combine(&diff_ba);

    [
        ratio(&sect, &combined_ab),
        ratio(&sect, &combined_ba),
        ratio(&combined_ab, &combined_ba),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}
