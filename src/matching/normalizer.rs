// src/matching/normalizer.rs - Deterministic text cleaning for descriptions and search keys
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strips accents, lowercases and collapses every run of whitespace or
/// punctuation into one space. Output is trimmed and contains only lowercase
/// alphanumerics separated by single spaces.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    // Lowercase before decomposing: some lowercase mappings emit combining marks.
    for ch in text.to_lowercase().nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

pub fn tokenize(cleaned: &str) -> Vec<String> {
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Unique words of a cleaned string that are at least `min_len` characters long,
/// in order of first appearance.
pub fn extract_words(cleaned: &str, min_len: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() >= min_len)
        .filter(|w| seen.insert(*w))
        .map(str::to_string)
        .collect()
}

/// A set of whole-word phrases, scanned longest-first.
///
/// Phrases are cleaned with [`clean_text`] on construction, so matching is
/// accent- and case-insensitive and only ever hits whole tokens ("rose" never
/// matches inside "roses").
#[derive(Debug, Clone, Default)]
pub struct PhraseSet {
    // first token -> phrases starting with it, longest first
    by_first_token: HashMap<String, Vec<Vec<String>>>,
    len: usize,
}

impl PhraseSet {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_first_token: HashMap<String, Vec<Vec<String>>> = HashMap::new();
        let mut len = 0;
        for phrase in phrases {
            let tokens = tokenize(&clean_text(phrase.as_ref()));
            let Some(first) = tokens.first().cloned() else {
                continue;
            };
            let bucket = by_first_token.entry(first).or_default();
            if bucket.contains(&tokens) {
                continue;
            }
            bucket.push(tokens);
            len += 1;
        }
        for bucket in by_first_token.values_mut() {
            bucket.sort_by(|a, b| {
                b.len()
                    .cmp(&a.len())
                    .then_with(|| b.join(" ").len().cmp(&a.join(" ").len()))
                    .then_with(|| a.cmp(b))
            });
        }
        Self { by_first_token, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Longest phrase that matches `tokens` starting at `pos`.
    pub fn longest_match_at(&self, tokens: &[String], pos: usize) -> Option<&[String]> {
        let bucket = self.by_first_token.get(tokens.get(pos)?)?;
        bucket
            .iter()
            .find(|phrase| tokens[pos..].starts_with(phrase.as_slice()))
            .map(|phrase| phrase.as_slice())
    }

    /// Removes phrase occurrences until none are left. Removing a phrase can
    /// join its neighbours into a new occurrence, hence the loop. Returns the
    /// remaining tokens and every removed phrase in removal order.
    pub fn remove_all(&self, mut tokens: Vec<String>) -> (Vec<String>, Vec<String>) {
        let mut removed = Vec::new();
        if self.is_empty() {
            return (tokens, removed);
        }
        loop {
            let mut kept = Vec::with_capacity(tokens.len());
            let mut removed_this_pass = false;
            let mut pos = 0;
            while pos < tokens.len() {
                if let Some(phrase) = self.longest_match_at(&tokens, pos) {
                    removed.push(phrase.join(" "));
                    pos += phrase.len();
                    removed_this_pass = true;
                } else {
                    kept.push(tokens[pos].clone());
                    pos += 1;
                }
            }
            tokens = kept;
            if !removed_this_pass {
                return (tokens, removed);
            }
        }
    }
}

/// Normalizer with a fixed list of noise phrases to drop.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    phrase_removals: PhraseSet,
}

impl Normalizer {
    pub fn new<I, S>(phrase_removals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrase_removals: PhraseSet::new(phrase_removals),
        }
    }

    pub fn normalize(&self, text: &str) -> String {
        let cleaned = clean_text(text);
        if self.phrase_removals.is_empty() {
            return cleaned;
        }
        let (tokens, _) = self.phrase_removals.remove_all(tokenize(&cleaned));
        tokens.join(" ")
    }

    /// Missing descriptions normalize to the empty string.
    pub fn normalize_opt(&self, text: Option<&str>) -> String {
        text.map(|t| self.normalize(t)).unwrap_or_default()
    }
}

pub fn normalize<S: AsRef<str>>(text: &str, phrase_removals: &[S]) -> String {
    Normalizer::new(phrase_removals).normalize(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_strips_accents_and_punctuation() {
        assert_eq!(clean_text("Café  Rosé  XL"), "cafe rose xl");
        assert_eq!(clean_text("  ROSA-ROJA, 60cm!! (Premium) "), "rosa roja 60cm premium");
        assert_eq!(clean_text("Ñandú / Über"), "nandu uber");
        assert_eq!(clean_text("...---"), "");
    }

    #[test]
    fn test_phrase_removal_is_whole_word_and_longest_first() {
        let n = Normalizer::new(["large", "Extra Large"]);
        assert_eq!(n.normalize("Rosa EXTRA-large roja"), "rosa roja");
        assert_eq!(n.normalize("Rosa large roja"), "rosa roja");
        assert_eq!(n.normalize("Rosa largest roja"), "rosa largest roja");
    }

    #[test]
    fn test_phrase_removal_does_not_touch_longer_words() {
        let n = Normalizer::new(["rose"]);
        assert_eq!(n.normalize("Roses and rose"), "roses and");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let phrases = ["a b", "xl", "caja"];
        let samples = [
            "Café  Rosé  XL",
            "a a b b",
            "İstanbul ǅemal Ærø",
            "CAJA x 25 -- tallos",
            "",
            "   ",
            "Hydrangea 'Blue' (Select) a-b",
        ];
        for sample in samples {
            let once = normalize(sample, &phrases);
            assert_eq!(normalize(&once, &phrases), once, "input: {:?}", sample);
        }
    }

    #[test]
    fn test_nested_phrase_occurrences_are_removed() {
        // removing the inner "a b" produces a new "a b"
        assert_eq!(normalize("a a b b", &["a b"]), "");
    }

    #[test]
    fn test_missing_text_normalizes_to_empty() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_opt(None), "");
        assert_eq!(n.normalize_opt(Some("Rosa")), "rosa");
    }

    #[test]
    fn test_extract_words_filters_short_tokens() {
        assert_eq!(
            extract_words("rosa x roja rosa 60", 2),
            vec!["rosa".to_string(), "roja".to_string(), "60".to_string()]
        );
    }
}
