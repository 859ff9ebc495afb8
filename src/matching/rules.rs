// src/matching/rules.rs - Synonym substitution and blacklist removal with audit tracking
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

use crate::matching::normalizer::{clean_text, tokenize, PhraseSet};
use crate::models::records::AppliedSynonym;
use crate::models::rules::{RuleScope, RuleSet, RuleSetVersion};
use crate::utils::constants::MAX_REWRITE_PASSES;

#[derive(Debug, Clone)]
struct CompiledSynonym {
    original: Vec<String>,
    replacement: Vec<String>,
    scope: RuleScope,
}

/// Removes rules that could keep the rewrite going forever. Rule `a` feeds
/// rule `b` when `b`'s original shares a token with `a`'s replacement. Rules
/// are admitted client scope first, then in rule-set order, and a rule that
/// would close a feeding cycle with the admitted ones is dropped.
fn drop_cyclic_synonyms(rules: Vec<CompiledSynonym>) -> Vec<CompiledSynonym> {
    let mut order: Vec<usize> = (0..rules.len()).collect();
    order.sort_by_key(|&i| rules[i].scope != RuleScope::Client);

    let mut kept = vec![false; rules.len()];
    // token -> admitted rules whose original contains it
    let mut consumers: HashMap<&str, Vec<usize>> = HashMap::new();
    for candidate in order {
        if closes_cycle(&rules, &consumers, candidate) {
            warn!(
                "Ignoring cyclic {:?} synonym '{}' -> '{}'",
                rules[candidate].scope,
                rules[candidate].original.join(" "),
                rules[candidate].replacement.join(" ")
            );
            continue;
        }
        kept[candidate] = true;
        for token in &rules[candidate].original {
            consumers.entry(token.as_str()).or_default().push(candidate);
        }
    }

    rules
        .into_iter()
        .zip(kept)
        .filter_map(|(rule, keep)| keep.then_some(rule))
        .collect()
}

fn closes_cycle(rules: &[CompiledSynonym], consumers: &HashMap<&str, Vec<usize>>, candidate: usize) -> bool {
    let target = &rules[candidate].original;
    let mut visited = HashSet::new();
    let mut stack = vec![candidate];
    while let Some(current) = stack.pop() {
        for token in &rules[current].replacement {
            if current != candidate && target.contains(token) {
                return true;
            }
            for &next in consumers.get(token.as_str()).into_iter().flatten() {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
    }
    false
}

/// Read-only, compiled view of a [`RuleSet`] taken at the start of a batch.
///
/// Client rules replace global rules with the same (cleaned) original phrase.
/// Identity rules and rules whose replacement contains their own original are
/// dropped, and so is any rule that would close a rewrite cycle with the rules
/// already kept (client rules are kept first).
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    version: RuleSetVersion,
    // first token -> synonyms starting with it, longest first
    synonyms: HashMap<String, Vec<CompiledSynonym>>,
    synonym_count: usize,
    blacklist: PhraseSet,
    pass_limit: usize,
}

impl Default for RuleSnapshot {
    fn default() -> Self {
        Self::assemble(RuleSetVersion::default(), Vec::new(), PhraseSet::default())
    }
}

impl RuleSnapshot {
    pub fn from_rule_set(rules: &RuleSet) -> Self {
        // Global rules first, client rules after, so a client rule for the same
        // original overwrites the global one.
        let mut effective: Vec<CompiledSynonym> = Vec::new();
        let mut position_by_original: HashMap<Vec<String>, usize> = HashMap::new();

        let ordered = rules
            .active_synonyms()
            .filter(|r| r.scope == RuleScope::Global)
            .chain(rules.active_synonyms().filter(|r| r.scope == RuleScope::Client));

        for rule in ordered {
            let original = tokenize(&clean_text(&rule.original));
            let replacement = tokenize(&clean_text(&rule.replacement));
            if original.is_empty() {
                debug!("Skipping synonym with empty original (replacement '{}')", rule.replacement);
                continue;
            }
            let compiled = CompiledSynonym {
                original: original.clone(),
                replacement,
                scope: rule.scope,
            };
            match position_by_original.get(&original) {
                Some(&idx) => {
                    if effective[idx].scope != compiled.scope {
                        debug!(
                            "Client synonym '{}' overrides global rule",
                            compiled.original.join(" ")
                        );
                    }
                    effective[idx] = compiled;
                }
                None => {
                    position_by_original.insert(original, effective.len());
                    effective.push(compiled);
                }
            }
        }

        let effective = effective
            .into_iter()
            .filter(|rule| {
                if rule.original == rule.replacement {
                    return false;
                }
                let self_expanding = rule
                    .replacement
                    .windows(rule.original.len())
                    .any(|w| w == rule.original.as_slice());
                if self_expanding {
                    warn!(
                        "Ignoring self-expanding synonym '{}' -> '{}'",
                        rule.original.join(" "),
                        rule.replacement.join(" ")
                    );
                }
                !self_expanding
            })
            .collect();

        let blacklist = PhraseSet::new(rules.active_blacklist().map(|r| r.phrase.as_str()));
        Self::assemble(rules.versions(), drop_cyclic_synonyms(effective), blacklist)
    }

    fn assemble(version: RuleSetVersion, rules: Vec<CompiledSynonym>, blacklist: PhraseSet) -> Self {
        let synonym_count = rules.len();
        let mut synonyms: HashMap<String, Vec<CompiledSynonym>> = HashMap::new();
        for rule in rules {
            synonyms.entry(rule.original[0].clone()).or_default().push(rule);
        }
        for bucket in synonyms.values_mut() {
            // stable: equal-length rules keep global-then-client order
            bucket.sort_by(|a, b| b.original.len().cmp(&a.original.len()));
        }

        Self {
            version,
            synonyms,
            synonym_count,
            blacklist,
            // a chain of n rules needs n passes plus one to see nothing change
            pass_limit: MAX_REWRITE_PASSES.max(synonym_count + 2),
        }
    }

    pub fn version(&self) -> RuleSetVersion {
        self.version
    }

    pub fn synonym_count(&self) -> usize {
        self.synonym_count
    }

    pub fn blacklist_count(&self) -> usize {
        self.blacklist.len()
    }

    fn synonym_at(&self, tokens: &[String], pos: usize) -> Option<&CompiledSynonym> {
        self.synonyms
            .get(tokens.get(pos)?)?
            .iter()
            .find(|rule| tokens[pos..].starts_with(rule.original.as_slice()))
    }

    /// One left-to-right pass. Replacements are not rescanned within the pass.
    fn substitute_pass(&self, tokens: Vec<String>) -> (Vec<String>, Vec<AppliedSynonym>) {
        let mut out = Vec::with_capacity(tokens.len());
        let mut applied = Vec::new();
        let mut pos = 0;
        while pos < tokens.len() {
            match self.synonym_at(&tokens, pos) {
                Some(rule) => {
                    applied.push(AppliedSynonym {
                        original: rule.original.join(" "),
                        replacement: rule.replacement.join(" "),
                    });
                    out.extend(rule.replacement.iter().cloned());
                    pos += rule.original.len();
                }
                None => {
                    out.push(tokens[pos].clone());
                    pos += 1;
                }
            }
        }
        (out, applied)
    }

    /// Synonym and blacklist passes until one changes nothing, or `None` if
    /// that does not happen within the pass limit.
    fn rewrite_until_settled(&self, mut tokens: Vec<String>) -> Option<RewriteOutcome> {
        let mut applied_synonyms = Vec::new();
        let mut removed_blacklist = Vec::new();
        for _ in 0..self.pass_limit {
            let (substituted, applied) = self.substitute_pass(tokens);
            let (filtered, removed) = self.blacklist.remove_all(substituted);
            tokens = filtered;
            if applied.is_empty() && removed.is_empty() {
                return Some(RewriteOutcome {
                    text: tokens.join(" "),
                    applied_synonyms,
                    removed_blacklist,
                });
            }
            applied_synonyms.extend(applied);
            removed_blacklist.extend(removed);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewriteOutcome {
    pub text: String,
    pub applied_synonyms: Vec<AppliedSynonym>,
    pub removed_blacklist: Vec<String>,
}

/// Applies synonyms, then the blacklist, repeating until the text stops
/// changing so that running the rules again on the output is a no-op.
///
/// If a rewrite does not settle, it is retried from the text with only the
/// blacklist removed; if that does not settle either, that text is returned
/// untouched by synonyms. Every possible result is its own fixed point.
pub fn apply_rules(normalized_text: &str, snapshot: &RuleSnapshot) -> RewriteOutcome {
    let tokens = tokenize(normalized_text);
    if let Some(outcome) = snapshot.rewrite_until_settled(tokens.clone()) {
        return outcome;
    }

    let (stripped, mut removed_blacklist) = snapshot.blacklist.remove_all(tokens);
    if let Some(mut outcome) = snapshot.rewrite_until_settled(stripped.clone()) {
        removed_blacklist.append(&mut outcome.removed_blacklist);
        outcome.removed_blacklist = removed_blacklist;
        return outcome;
    }

    warn!(
        "Rule rewrite of '{}' did not settle after {} passes with rule set {}; synonyms skipped",
        normalized_text, snapshot.pass_limit, snapshot.version
    );
    RewriteOutcome {
        text: stripped.join(" "),
        applied_synonyms: Vec::new(),
        removed_blacklist,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::normalizer::clean_text;
    use crate::models::rules::{RuleStatus, SynonymRule};

    fn snapshot(build: impl FnOnce(&mut RuleSet)) -> RuleSnapshot {
        let mut rules = RuleSet::new();
        build(&mut rules);
        RuleSnapshot::from_rule_set(&rules)
    }

    #[test]
    fn test_synonyms_and_blacklist_are_recorded_in_order() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "rosa", "rose");
            r.add_synonym(RuleScope::Global, "roja", "red");
            r.add_blacklist(RuleScope::Global, "caja");
        });
        let out = apply_rules("caja rosa roja rosa", &snap);
        assert_eq!(out.text, "rose red rose");
        let originals: Vec<_> = out.applied_synonyms.iter().map(|s| s.original.as_str()).collect();
        assert_eq!(originals, vec!["rosa", "roja", "rosa"]);
        assert_eq!(out.removed_blacklist, vec!["caja".to_string()]);
    }

    #[test]
    fn test_word_boundaries_are_respected() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "rose", "rosa");
            r.add_blacklist(RuleScope::Global, "xl");
        });
        let out = apply_rules("roses xxl rose xl", &snap);
        assert_eq!(out.text, "roses xxl rosa");
    }

    #[test]
    fn test_longest_synonym_wins() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "spray", "sp");
            r.add_synonym(RuleScope::Global, "spray rose", "sprayrose");
        });
        let out = apply_rules("spray rose pink spray", &snap);
        assert_eq!(out.text, "sprayrose pink sp");
    }

    #[test]
    fn test_client_rule_overrides_global() {
        // client listed first in the rule set; precedence must not depend on order
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Client, "Rosé", "rosa premium");
            r.add_synonym(RuleScope::Global, "rose", "rosa");
        });
        assert_eq!(snap.synonym_count(), 1);
        let out = apply_rules("rose roja", &snap);
        assert_eq!(out.text, "rosa premium roja");
        assert_eq!(out.applied_synonyms[0].replacement, "rosa premium");
    }

    #[test]
    fn test_self_expanding_rule_is_ignored() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "rose", "rose premium");
        });
        assert_eq!(snap.synonym_count(), 0);
        assert_eq!(apply_rules("rose", &snap).text, "rose");
    }

    #[test]
    fn test_inactive_rules_are_never_applied() {
        let mut rules = RuleSet::new();
        rules.synonyms.push(SynonymRule {
            scope: RuleScope::Client,
            original: "rosa".into(),
            replacement: "rose".into(),
            status: RuleStatus::Inactive,
        });
        let out = apply_rules("rosa", &RuleSnapshot::from_rule_set(&rules));
        assert_eq!(out.text, "rosa");
        assert!(out.applied_synonyms.is_empty());
    }

    #[test]
    fn test_chained_synonyms_settle() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "a", "b");
            r.add_synonym(RuleScope::Global, "b", "c");
        });
        let out = apply_rules("a b", &snap);
        assert_eq!(out.text, "c c");
        assert_eq!(apply_rules(&out.text, &snap).applied_synonyms.len(), 0);
    }

    #[test]
    fn test_rule_application_is_idempotent() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "rosa", "rose");
            r.add_synonym(RuleScope::Client, "tallos", "stems");
            r.add_synonym(RuleScope::Global, "x b", "q");
            r.add_blacklist(RuleScope::Global, "caja");
            r.add_blacklist(RuleScope::Client, "a");
        });
        let blacklist = ["caja", "a"];
        for text in ["caja rosa 25 tallos", "x a b rosa", "a a a", "", "rose stems"] {
            let first = apply_rules(&clean_text(text), &snap);
            let second = apply_rules(&first.text, &snap);
            assert_eq!(second.text, first.text, "input: {:?}", text);
            assert!(second.applied_synonyms.is_empty());
            assert!(second.removed_blacklist.is_empty());
            for phrase in blacklist {
                assert!(!first.text.split(' ').any(|t| t == phrase), "{:?} left in {:?}", phrase, first.text);
            }
        }
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "rosa", "rose");
            r.add_synonym(RuleScope::Client, "rosa roja", "red rose");
            r.add_blacklist(RuleScope::Global, "premium");
        });
        let first = apply_rules("rosa roja premium rosa", &snap);
        for _ in 0..10 {
            assert_eq!(apply_rules("rosa roja premium rosa", &snap), first);
        }
    }

    #[test]
    fn test_empty_snapshot_passes_text_through() {
        let out = apply_rules("rosa roja", &RuleSnapshot::default());
        assert_eq!(out.text, "rosa roja");
        assert!(out.applied_synonyms.is_empty());
        assert!(out.removed_blacklist.is_empty());
    }

    #[test]
    fn test_two_rule_cycle_keeps_client_rule() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "rosa", "rose");
            r.add_synonym(RuleScope::Client, "rose", "rosa");
        });
        assert_eq!(snap.synonym_count(), 1);

        let first = apply_rules("rose rosa", &snap);
        assert_eq!(first.text, "rosa rosa");
        assert_eq!(first.applied_synonyms.len(), 1);
        assert_eq!(first.applied_synonyms[0].replacement, "rosa");
        let second = apply_rules(&first.text, &snap);
        assert_eq!(second.text, first.text);
        assert!(second.applied_synonyms.is_empty());
    }

    #[test]
    fn test_cycle_through_multi_token_replacement_is_dropped() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "a", "b");
            r.add_synonym(RuleScope::Global, "b", "a c");
        });
        assert_eq!(snap.synonym_count(), 1);
        for text in ["a", "b", "a b c"] {
            let first = apply_rules(text, &snap);
            let second = apply_rules(&first.text, &snap);
            assert_eq!(second.text, first.text, "input: {:?}", text);
            assert!(second.applied_synonyms.is_empty());
        }
    }

    #[test]
    fn test_unrelated_rules_survive_cycle_check() {
        let snap = snapshot(|r| {
            r.add_synonym(RuleScope::Global, "a", "b");
            r.add_synonym(RuleScope::Global, "b", "c");
            r.add_synonym(RuleScope::Global, "rosa", "rose");
            r.add_synonym(RuleScope::Client, "c", "d");
        });
        assert_eq!(snap.synonym_count(), 4);
        assert_eq!(apply_rules("a rosa", &snap).text, "d rose");
    }

    #[test]
    fn test_unsettled_rewrite_falls_back_to_stripped_text() {
        let compiled = |original: &str, replacement: &str| CompiledSynonym {
            original: tokenize(original),
            replacement: tokenize(replacement),
            scope: RuleScope::Global,
        };
        let snap = RuleSnapshot::assemble(
            RuleSetVersion::default(),
            vec![compiled("rosa", "rose"), compiled("rose", "rosa")],
            PhraseSet::new(["caja"]),
        );

        let first = apply_rules("caja rosa roja", &snap);
        assert_eq!(first.text, "rosa roja");
        assert!(first.applied_synonyms.is_empty());
        assert_eq!(first.removed_blacklist, vec!["caja".to_string()]);

        let second = apply_rules(&first.text, &snap);
        assert_eq!(second.text, first.text);
        assert!(second.applied_synonyms.is_empty());
        assert!(second.removed_blacklist.is_empty());
    }
}
