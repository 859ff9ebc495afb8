// src/models/rules.rs - Synonym and blacklist rules as loaded for one client

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    #[default]
    Global,
    Client,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SynonymRule {
    #[serde(default)]
    pub scope: RuleScope,
    pub original: String,
    pub replacement: String,
    #[serde(default)]
    pub status: RuleStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlacklistRule {
    #[serde(default)]
    pub scope: RuleScope,
    pub phrase: String,
    #[serde(default)]
    pub status: RuleStatus,
}

/// Versions of the global and client rule files a merged set came from.
/// Editing either file changes it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RuleSetVersion {
    pub global: u64,
    pub client: u64,
}

impl fmt::Display for RuleSetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}/c{}", self.global, self.client)
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Ordered rule collection. Order matters only for duplicates within one scope
/// (the later rule wins); client rules always override global ones.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSet {
    /// This file's own version. On a merged set it is the client version,
    /// which row actions bump.
    #[serde(default)]
    pub version: u64,
    /// Version of the global rules merged in; zero on an unmerged set.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub global_version: u64,
    #[serde(default)]
    pub synonyms: Vec<SynonymRule>,
    #[serde(default)]
    pub blacklist: Vec<BlacklistRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_synonym(&mut self, scope: RuleScope, original: &str, replacement: &str) -> &mut Self {
        self.synonyms.push(SynonymRule {
            scope,
            original: original.to_string(),
            replacement: replacement.to_string(),
            status: RuleStatus::Active,
        });
        self
    }

    pub fn add_blacklist(&mut self, scope: RuleScope, phrase: &str) -> &mut Self {
        self.blacklist.push(BlacklistRule {
            scope,
            phrase: phrase.to_string(),
            status: RuleStatus::Active,
        });
        self
    }

    pub fn active_synonyms(&self) -> impl Iterator<Item = &SynonymRule> {
        self.synonyms.iter().filter(|r| r.status == RuleStatus::Active)
    }

    pub fn active_blacklist(&self) -> impl Iterator<Item = &BlacklistRule> {
        self.blacklist.iter().filter(|r| r.status == RuleStatus::Active)
    }

    /// Forces every rule into `scope`. Loaders use it so a global rules file
    /// cannot smuggle in client-scoped rules and vice versa.
    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        for rule in &mut self.synonyms {
            rule.scope = scope;
        }
        for rule in &mut self.blacklist {
            rule.scope = scope;
        }
        self
    }

    pub fn versions(&self) -> RuleSetVersion {
        RuleSetVersion {
            global: self.global_version,
            client: self.version,
        }
    }

    /// Appends the client's rules after these global rules. Both file
    /// versions are kept: `version` becomes the client's, `global_version`
    /// this set's.
    pub fn merged_with_client(mut self, client: RuleSet) -> Self {
        self.global_version = self.version;
        self.version = client.version;
        self.synonyms.extend(client.synonyms);
        self.blacklist.extend(client.blacklist);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_rules_are_filtered() {
        let mut rules = RuleSet::new();
        rules.add_synonym(RuleScope::Global, "rosa", "rose");
        rules.add_blacklist(RuleScope::Client, "xl");
        rules.synonyms.push(SynonymRule {
            scope: RuleScope::Client,
            original: "clavel".into(),
            replacement: "carnation".into(),
            status: RuleStatus::Inactive,
        });

        assert_eq!(rules.active_synonyms().count(), 1);
        assert_eq!(rules.active_blacklist().count(), 1);
    }

    #[test]
    fn test_rule_set_deserializes_with_defaults() {
        let rules: RuleSet = serde_json::from_str(
            r#"{"synonyms": [{"original": "Rosé", "replacement": "Rose"}],
                "blacklist": [{"phrase": "XL", "scope": "client", "status": "inactive"}]}"#,
        )
        .unwrap();
        assert_eq!(rules.version, 0);
        assert_eq!(rules.synonyms[0].scope, RuleScope::Global);
        assert_eq!(rules.synonyms[0].status, RuleStatus::Active);
        assert_eq!(rules.blacklist[0].status, RuleStatus::Inactive);
    }

    #[test]
    fn test_merge_keeps_order_and_both_versions() {
        let mut global = RuleSet::new();
        global.version = 3;
        global.add_synonym(RuleScope::Global, "a", "b");
        let mut client = RuleSet::new();
        client.version = 7;
        client.add_synonym(RuleScope::Client, "c", "d");

        let merged = global.merged_with_client(client.with_scope(RuleScope::Client));
        assert_eq!(merged.versions(), RuleSetVersion { global: 3, client: 7 });
        assert_eq!(merged.versions().to_string(), "g3/c7");
        assert_eq!(merged.synonyms[0].original, "a");
        assert_eq!(merged.synonyms[1].scope, RuleScope::Client);
    }

    #[test]
    fn test_global_edit_changes_merged_version() {
        let merge = |global_version: u64| {
            let mut global = RuleSet::new();
            global.version = global_version;
            let mut client = RuleSet::new();
            client.version = 9;
            global.merged_with_client(client).versions()
        };
        assert_ne!(merge(2), merge(3));
    }

    #[test]
    fn test_unmerged_set_omits_global_version() {
        let mut rules = RuleSet::new();
        rules.version = 4;
        let json = serde_json::to_value(&rules).unwrap();
        assert!(json.get("global_version").is_none());
    }
}
