// src/sources/json_files.rs - JSON-file backed rule, catalog and row storage
//
// Layout under the data directory:
//   global_rules.json          rules shared by every client (optional)
//   <client>/rules.json        client rules (optional)
//   <client>/catalog.json      {"version": n, "master": [...], "staging": [...]}
use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::records::{AuditRecord, InputRow};
use crate::models::rules::{RuleScope, RuleSet};
use crate::sources::{CatalogLoader, CatalogSnapshot, RuleSetLoader};
use crate::utils::constants::{CLIENT_CATALOG_FILE, CLIENT_RULES_FILE, GLOBAL_RULES_FILE};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn client_dir(&self, client_id: &str) -> Result<PathBuf> {
        let valid = !client_id.is_empty()
            && client_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            bail!("Invalid client id '{}'", client_id);
        }
        Ok(self.data_dir.join(client_id))
    }

    pub fn client_rules_path(&self, client_id: &str) -> Result<PathBuf> {
        Ok(self.client_dir(client_id)?.join(CLIENT_RULES_FILE))
    }

    /// Writes only the client-scoped rules of `rules` to the client's rules file.
    pub fn save_client_rules(&self, client_id: &str, rules: &RuleSet) -> Result<()> {
        let client_only = RuleSet {
            version: rules.version,
            global_version: 0,
            synonyms: rules
                .synonyms
                .iter()
                .filter(|r| r.scope == RuleScope::Client)
                .cloned()
                .collect(),
            blacklist: rules
                .blacklist
                .iter()
                .filter(|r| r.scope == RuleScope::Client)
                .cloned()
                .collect(),
        };
        let path = self.client_rules_path(client_id)?;
        write_json(&path, &client_only)?;
        info!(
            "Saved {} client synonyms and {} blacklist rules (v{}) for {}",
            client_only.synonyms.len(),
            client_only.blacklist.len(),
            client_only.version,
            client_id
        );
        Ok(())
    }

    pub fn save_catalog(&self, client_id: &str, catalog: &CatalogSnapshot) -> Result<()> {
        let path = self.client_dir(client_id)?.join(CLIENT_CATALOG_FILE);
        write_json(&path, catalog)
    }
}

impl RuleSetLoader for JsonFileStore {
    fn load_rule_set(&self, client_id: &str) -> Result<RuleSet> {
        let global: RuleSet = read_json_optional(&self.data_dir.join(GLOBAL_RULES_FILE))?.unwrap_or_default();
        let client: RuleSet = read_json_optional(&self.client_rules_path(client_id)?)?.unwrap_or_default();
        debug!(
            "Loaded {} global and {} client synonyms for {}",
            global.synonyms.len(),
            client.synonyms.len(),
            client_id
        );
        Ok(global
            .with_scope(RuleScope::Global)
            .merged_with_client(client.with_scope(RuleScope::Client)))
    }
}

impl CatalogLoader for JsonFileStore {
    fn load_catalog(&self, client_id: &str) -> Result<CatalogSnapshot> {
        let path = self.client_dir(client_id)?.join(CLIENT_CATALOG_FILE);
        read_json(&path).with_context(|| format!("Failed to load catalog for client {}", client_id))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        debug!("{} not found, treating as empty", path.display());
        return Ok(None);
    }
    read_json(path).map(Some)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

/// Reads a JSON array of raw vendor rows.
pub fn load_rows(path: &Path) -> Result<Vec<InputRow>> {
    read_json(path)
}

/// Reads audit records written by an earlier run.
pub fn load_records(path: &Path) -> Result<Vec<AuditRecord>> {
    read_json(path)
}

pub fn write_records(path: &Path, records: &[AuditRecord]) -> Result<()> {
    write_json(path, records)?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    write_json(path, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::CatalogEntry;
    use crate::models::records::MatchResult;
    use crate::models::rules::RuleSetVersion;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, value: serde_json::Value) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value.to_string()).unwrap();
    }

    #[test]
    fn test_rule_set_merges_global_and_client_scopes() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "global_rules.json",
            json!({"version": 2, "synonyms": [{"original": "rosa", "replacement": "rose", "scope": "client"}]}),
        );
        write(
            dir.path(),
            "acme/rules.json",
            json!({"version": 9, "blacklist": [{"phrase": "xl"}]}),
        );

        let rules = JsonFileStore::new(dir.path()).load_rule_set("acme").unwrap();
        assert_eq!(rules.versions(), RuleSetVersion { global: 2, client: 9 });
        assert_eq!(rules.synonyms[0].scope, RuleScope::Global);
        assert_eq!(rules.blacklist[0].scope, RuleScope::Client);
    }

    #[test]
    fn test_missing_rule_files_give_empty_rules() {
        let dir = TempDir::new().unwrap();
        let rules = JsonFileStore::new(dir.path()).load_rule_set("acme").unwrap();
        assert_eq!(rules, RuleSet::default());
    }

    #[test]
    fn test_catalog_is_required() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load_catalog("acme").is_err());

        let snapshot = CatalogSnapshot {
            version: Some(3),
            master: vec![CatalogEntry::master("A1", "Rosa", "Freedom", "Rojo", "60cm")],
            staging: vec![],
        };
        store.save_catalog("acme", &snapshot).unwrap();
        assert_eq!(store.load_catalog("acme").unwrap(), snapshot);
    }

    #[test]
    fn test_client_id_cannot_escape_data_dir() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load_catalog("../etc").is_err());
        assert!(store.load_rule_set("").is_err());
    }

    #[test]
    fn test_save_client_rules_drops_global_rules() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut rules = RuleSet::new();
        rules.version = 4;
        rules.add_synonym(RuleScope::Global, "a", "b");
        rules.add_synonym(RuleScope::Client, "c", "d");
        store.save_client_rules("acme", &rules).unwrap();

        let reloaded = store.load_rule_set("acme").unwrap();
        assert_eq!(reloaded.synonyms.len(), 1);
        assert_eq!(reloaded.synonyms[0].original, "c");
        assert_eq!(reloaded.version, 4);
    }

    #[test]
    fn test_rows_and_records_round_trip_through_files() {
        let dir = TempDir::new().unwrap();
        let rows_path = dir.path().join("rows.json");
        fs::write(
            &rows_path,
            json!([{"vendor_product_description": "Rosa Roja", "vendor_name": "Flores", "quantity": 5}]).to_string(),
        )
        .unwrap();
        let rows = load_rows(&rows_path).unwrap();
        assert_eq!(rows.len(), 1);

        let record = AuditRecord {
            row_index: 0,
            row: rows[0].clone(),
            result: MatchResult::unmatched("rosa roja".into()),
            duplicate_of: None,
            issues: vec![],
            review: Default::default(),
            catalog_version: 1,
            catalog_source_version: Some(3),
            rule_set_version: RuleSetVersion::default(),
            processed_at: Utc::now(),
        };
        let out = dir.path().join("out/records.json");
        write_records(&out, &[record.clone()]).unwrap();
        assert_eq!(load_records(&out).unwrap(), vec![record]);
    }
}
