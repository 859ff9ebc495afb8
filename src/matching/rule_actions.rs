// src/matching/rule_actions.rs - Reviewer row actions turned into client rules
use anyhow::{bail, Result};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::matching::normalizer::clean_text;
use crate::models::records::ReviewState;
use crate::models::rules::{RuleScope, RuleSet, RuleStatus};

/// `"original":"replacement"`, quotes optional.
static SYNONYM_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"?(?P<original>[^":]*?)"?\s*:\s*"?(?P<replacement>[^"]*?)"?\s*$"#)
        .expect("synonym pair pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    AddSynonym { original: String, replacement: String },
    AddBlacklist { phrase: String },
}

impl RuleAction {
    /// Parses a reviewer's `action` / `word` pair. A blank action or word means
    /// "nothing requested" and yields `Ok(None)`.
    pub fn parse(action: &str, word: &str) -> Result<Option<Self>> {
        let action = action.trim().to_lowercase();
        let word = word.trim();
        if action.is_empty() || word.is_empty() {
            return Ok(None);
        }

        match action.as_str() {
            "synonym" => {
                let Some(caps) = SYNONYM_PAIR.captures(word) else {
                    bail!("Synonym action expects \"original\":\"replacement\", got '{}'", word);
                };
                let original = caps["original"].trim().to_string();
                let replacement = caps["replacement"].trim().to_string();
                if original.is_empty() || replacement.is_empty() {
                    bail!("Synonym action has an empty side: '{}'", word);
                }
                Ok(Some(RuleAction::AddSynonym { original, replacement }))
            }
            "blacklist" => Ok(Some(RuleAction::AddBlacklist {
                phrase: word.trim_matches('"').trim().to_string(),
            })),
            other => bail!("Unknown row action '{}'", other),
        }
    }

    pub fn from_review(review: &ReviewState) -> Result<Option<Self>> {
        Self::parse(
            review.action.as_deref().unwrap_or(""),
            review.word.as_deref().unwrap_or(""),
        )
    }

    /// Returns the rule set with this action added as an active client rule.
    /// The version is bumped only when the rules actually change.
    pub fn apply(&self, rules: &RuleSet) -> RuleSet {
        let mut updated = rules.clone();
        let changed = match self {
            RuleAction::AddSynonym { original, replacement } => {
                let key = clean_text(original);
                let already = updated.synonyms.iter().any(|r| {
                    r.scope == RuleScope::Client
                        && r.status == RuleStatus::Active
                        && clean_text(&r.original) == key
                        && clean_text(&r.replacement) == clean_text(replacement)
                });
                if already {
                    false
                } else {
                    // a new client rule for the same original replaces the old one
                    updated
                        .synonyms
                        .retain(|r| !(r.scope == RuleScope::Client && clean_text(&r.original) == key));
                    updated.add_synonym(RuleScope::Client, original, replacement);
                    info!("Added synonym: {} → {}", original, replacement);
                    true
                }
            }
            RuleAction::AddBlacklist { phrase } => {
                let key = clean_text(phrase);
                let already = updated.blacklist.iter().any(|r| {
                    r.scope == RuleScope::Client
                        && r.status == RuleStatus::Active
                        && clean_text(&r.phrase) == key
                });
                if already {
                    false
                } else {
                    updated.add_blacklist(RuleScope::Client, phrase);
                    info!("Added to blacklist: {}", phrase);
                    true
                }
            }
        };

        if changed {
            updated.version = rules.version + 1;
        } else {
            debug!("Row action {:?} already present in rule set v{}", self, rules.version);
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_synonym_pair() {
        let action = RuleAction::parse("Synonym", r#""Rosé" : "Rose""#).unwrap();
        assert_eq!(
            action,
            Some(RuleAction::AddSynonym {
                original: "Rosé".into(),
                replacement: "Rose".into()
            })
        );
        let unquoted = RuleAction::parse("synonym", "clavel:carnation").unwrap();
        assert!(matches!(unquoted, Some(RuleAction::AddSynonym { ref original, .. }) if original == "clavel"));
    }

    #[test]
    fn test_parse_rejects_malformed_actions() {
        assert!(RuleAction::parse("synonym", "no separator").is_err());
        assert!(RuleAction::parse("synonym", r#""":"rose""#).is_err());
        assert!(RuleAction::parse("rename", "x").is_err());
    }

    #[test]
    fn test_blank_action_is_nothing() {
        assert_eq!(RuleAction::parse("", "rose").unwrap(), None);
        assert_eq!(RuleAction::parse("blacklist", "   ").unwrap(), None);
        assert_eq!(RuleAction::from_review(&ReviewState::default()).unwrap(), None);
    }

    #[test]
    fn test_apply_adds_client_rule_and_bumps_version() {
        let mut rules = RuleSet::new();
        rules.version = 4;
        rules.add_synonym(RuleScope::Client, "rosa", "rose");

        let updated = RuleAction::AddSynonym {
            original: "Rosa".into(),
            replacement: "red rose".into(),
        }
        .apply(&rules);
        assert_eq!(updated.version, 5);
        assert_eq!(updated.synonyms.len(), 1);
        assert_eq!(updated.synonyms[0].replacement, "red rose");
        assert_eq!(rules.version, 4);

        let blacklisted = RuleAction::AddBlacklist { phrase: "XL".into() }.apply(&updated);
        assert_eq!(blacklisted.version, 6);
        assert_eq!(blacklisted.blacklist[0].scope, RuleScope::Client);
    }

    #[test]
    fn test_apply_is_noop_for_existing_rule() {
        let mut rules = RuleSet::new();
        rules.add_blacklist(RuleScope::Client, "xl");
        let again = RuleAction::AddBlacklist { phrase: "XL".into() }.apply(&rules);
        assert_eq!(again, rules);
    }
}
