// src/sources/mod.rs - Loader interfaces the pipeline pulls rules and catalogs from
pub mod json_files;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::matching::catalog_index::CatalogIndex;
use crate::models::catalog::CatalogEntry;
use crate::models::rules::RuleSet;

/// Master and staging entries for one client, as stored.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    /// Monotonically increasing per client. Carried on the index as its source
    /// version; the index's own cache version is always assigned fresh.
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub master: Vec<CatalogEntry>,
    #[serde(default)]
    pub staging: Vec<CatalogEntry>,
}

impl CatalogSnapshot {
    pub fn into_index(self) -> Result<CatalogIndex> {
        match self.version {
            Some(version) => CatalogIndex::build_from_source(self.master, self.staging, version),
            None => CatalogIndex::build(self.master, self.staging),
        }
    }

    /// Stored form of an index, under the index's source version.
    pub fn from_index(index: &CatalogIndex) -> Self {
        Self {
            version: index.source_version(),
            master: index.master_entries().cloned().collect(),
            staging: index.staging_entries().cloned().collect(),
        }
    }
}

/// Supplies the global rules merged with one client's rules.
pub trait RuleSetLoader: Send + Sync {
    fn load_rule_set(&self, client_id: &str) -> Result<RuleSet>;
}

/// Supplies a client's master and staging catalogs.
pub trait CatalogLoader: Send + Sync {
    fn load_catalog(&self, client_id: &str) -> Result<CatalogSnapshot>;
}

pub use json_files::JsonFileStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_keeps_stored_version() {
        let snapshot = CatalogSnapshot {
            version: Some(5_000),
            master: vec![CatalogEntry::master("A1", "Rosa", "Freedom", "Rojo", "60cm")],
            staging: vec![],
        };
        let index = snapshot.into_index().unwrap();
        assert_eq!(index.source_version(), Some(5_000));

        let staged = index
            .with_staging_entry(CatalogEntry::staging("Rosa", "Vendela", "Blanco", ""))
            .unwrap();
        let stored = CatalogSnapshot::from_index(&staged);
        assert_eq!(stored.version, Some(5_001));
        assert_eq!(stored.master.len(), 1);
        assert_eq!(stored.staging.len(), 1);
    }
}
