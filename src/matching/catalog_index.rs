// src/matching/catalog_index.rs - Immutable combined view of a client's master and staging catalogs
use anyhow::{bail, Result};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::catalog::{CatalogEntry, CatalogOrigin, STAGING_CATALOG_ID};

static CATALOG_VERSION: AtomicU64 = AtomicU64::new(1);

/// Hands out a fresh, process-wide unique catalog version.
pub fn next_catalog_version() -> u64 {
    CATALOG_VERSION.fetch_add(1, Ordering::SeqCst)
}

/// One scoring candidate plus the data the matcher needs per comparison.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub entry: CatalogEntry,
    pub tokens: BTreeSet<String>,
    /// Position in the combined catalog (master entries first).
    pub position: usize,
}

/// The "combined catalog": master entries followed by staging entries.
///
/// Never mutated after build. Every build takes a fresh process-unique
/// version, which is what the match cache keys on; no two indexes share one.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    version: u64,
    /// Version reported by the catalog loader. Metadata only, never a cache key.
    source_version: Option<u64>,
    candidates: Vec<IndexedEntry>,
    master_count: usize,
}

impl CatalogIndex {
    pub fn build(master: Vec<CatalogEntry>, staging: Vec<CatalogEntry>) -> Result<Self> {
        Self::build_inner(master, staging, None)
    }

    /// Builds from a loaded catalog, keeping the loader's version alongside
    /// the index's own.
    pub fn build_from_source(
        master: Vec<CatalogEntry>,
        staging: Vec<CatalogEntry>,
        source_version: u64,
    ) -> Result<Self> {
        Self::build_inner(master, staging, Some(source_version))
    }

    fn build_inner(
        master: Vec<CatalogEntry>,
        staging: Vec<CatalogEntry>,
        source_version: Option<u64>,
    ) -> Result<Self> {
        let mut seen_ids = HashSet::new();
        let mut candidates = Vec::with_capacity(master.len() + staging.len());
        let mut skipped = 0;

        for mut entry in master {
            let id = entry.catalog_id.trim().to_string();
            if id.is_empty() {
                bail!("Master catalog entry with empty catalog_id (search_key '{}')", entry.search_key);
            }
            if id == STAGING_CATALOG_ID {
                bail!("Master catalog entry uses the reserved staging id {}", STAGING_CATALOG_ID);
            }
            if !seen_ids.insert(id.clone()) {
                bail!("Duplicate master catalog_id '{}'", id);
            }
            entry.catalog_id = id;
            entry.origin = CatalogOrigin::Master;
            if !Self::push_candidate(&mut candidates, entry) {
                skipped += 1;
            }
        }
        let master_count = candidates.len();

        for mut entry in staging {
            if entry.catalog_id != STAGING_CATALOG_ID {
                debug!(
                    "Staging entry '{}' carried id '{}', replacing with sentinel",
                    entry.search_key, entry.catalog_id
                );
                entry.catalog_id = STAGING_CATALOG_ID.to_string();
            }
            entry.origin = CatalogOrigin::Staging;
            if !Self::push_candidate(&mut candidates, entry) {
                skipped += 1;
            }
        }

        if skipped > 0 {
            warn!("Skipped {} catalog entries with no usable search key", skipped);
        }
        let version = next_catalog_version();
        info!(
            "Built catalog index v{} (source {:?}): {} master + {} staging candidates",
            version,
            source_version,
            master_count,
            candidates.len() - master_count
        );

        Ok(Self {
            version,
            source_version,
            candidates,
            master_count,
        })
    }

    pub fn empty() -> Self {
        Self {
            version: next_catalog_version(),
            source_version: None,
            candidates: Vec::new(),
            master_count: 0,
        }
    }

    /// Fills in a missing search key; entries that still have none are dropped.
    fn push_candidate(candidates: &mut Vec<IndexedEntry>, mut entry: CatalogEntry) -> bool {
        if entry.search_key.trim().is_empty() {
            entry.search_key =
                CatalogEntry::build_search_key(&entry.categoria, &entry.variedad, &entry.color, &entry.grado);
        }
        if entry.search_key.is_empty() {
            return false;
        }
        let tokens = entry.search_key.split_whitespace().map(str::to_string).collect();
        let position = candidates.len();
        candidates.push(IndexedEntry { entry, tokens, position });
        true
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn source_version(&self) -> Option<u64> {
        self.source_version
    }

    pub fn candidates(&self) -> &[IndexedEntry] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn master_count(&self) -> usize {
        self.master_count
    }

    pub fn staging_count(&self) -> usize {
        self.candidates.len() - self.master_count
    }

    pub fn master_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.candidates[..self.master_count].iter().map(|c| &c.entry)
    }

    pub fn staging_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.candidates[self.master_count..].iter().map(|c| &c.entry)
    }

    /// Rebuilds the index with one more staging entry. The result has a new
    /// version, and a source version one past this one's if it had any;
    /// `self` is left untouched for rows still using it.
    pub fn with_staging_entry(&self, entry: CatalogEntry) -> Result<Self> {
        let master = self.master_entries().cloned().collect();
        let mut staging: Vec<CatalogEntry> = self.staging_entries().cloned().collect();
        staging.push(entry);
        Self::build_inner(master, staging, self.source_version.map(|v| v.saturating_add(1)))
    }

    /// Every candidate whose search key equals `search_key`, across both origins.
    pub fn entries_with_search_key<'a>(&'a self, search_key: &'a str) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.candidates
            .iter()
            .filter(move |c| c.entry.search_key == search_key)
            .map(|c| &c.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(id: &str, variedad: &str) -> CatalogEntry {
        CatalogEntry::master(id, "Rosa", variedad, "Rojo", "60cm")
    }

    #[test]
    fn test_build_orders_master_before_staging() {
        let index = CatalogIndex::build(
            vec![master("A1", "Freedom"), master("A2", "Explorer")],
            vec![CatalogEntry::staging("Rosa", "Vendela", "Blanco", "50cm")],
        )
        .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.master_count(), 2);
        assert_eq!(index.staging_count(), 1);
        let last = &index.candidates()[2];
        assert_eq!(last.position, 2);
        assert!(last.entry.is_staging());
        assert!(last.tokens.contains("vendela"));
    }

    #[test]
    fn test_duplicate_master_ids_are_rejected() {
        let result = CatalogIndex::build(vec![master("A1", "Freedom"), master(" A1 ", "Explorer")], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_staging_ids_are_forced_to_sentinel() {
        let mut proposal = CatalogEntry::staging("Clavel", "Mini", "Blanco", "");
        proposal.catalog_id = "999".into();
        let index = CatalogIndex::build(vec![], vec![proposal]).unwrap();
        assert_eq!(index.candidates()[0].entry.catalog_id, STAGING_CATALOG_ID);
    }

    #[test]
    fn test_missing_search_keys_are_computed_or_skipped() {
        let mut computed = master("A1", "Freedom");
        computed.search_key.clear();
        let mut blank = CatalogEntry::master("A2", "", "", "", "");
        blank.search_key = "   ".into();

        let index = CatalogIndex::build(vec![computed, blank], vec![]).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.candidates()[0].entry.search_key, "rosa freedom rojo 60cm");
    }

    #[test]
    fn test_same_search_key_in_both_origins_is_kept_twice() {
        let index = CatalogIndex::build(
            vec![master("A1", "Freedom")],
            vec![CatalogEntry::staging("Rosa", "Freedom", "Rojo", "60cm")],
        )
        .unwrap();
        assert_eq!(index.entries_with_search_key("rosa freedom rojo 60cm").count(), 2);
    }

    #[test]
    fn test_versions_increase_on_every_rebuild() {
        let first = CatalogIndex::build(vec![master("A1", "Freedom")], vec![]).unwrap();
        let second = first
            .with_staging_entry(CatalogEntry::staging("Rosa", "Mondial", "Blanco", ""))
            .unwrap();
        assert!(second.version() > first.version());
        assert_eq!(first.staging_count(), 0);
        assert_eq!(second.staging_count(), 1);
        assert!(CatalogIndex::empty().version() > second.version());
    }

    #[test]
    fn test_same_source_version_gets_distinct_versions() {
        let a = CatalogIndex::build_from_source(vec![master("A1", "Freedom")], vec![], 5).unwrap();
        let b = CatalogIndex::build_from_source(vec![master("B9", "Freedom")], vec![], 5).unwrap();
        assert_ne!(a.version(), b.version());
        assert_eq!(a.source_version(), Some(5));
        assert_eq!(b.source_version(), Some(5));

        let staged = b
            .with_staging_entry(CatalogEntry::staging("Rosa", "Mondial", "Blanco", ""))
            .unwrap();
        assert_eq!(staged.source_version(), Some(6));
        assert!(staged.version() > b.version());
    }

    #[test]
    fn test_version_never_reuses_an_issued_number() {
        let built = CatalogIndex::build(vec![master("A1", "Freedom")], vec![]).unwrap();
        let reloaded =
            CatalogIndex::build_from_source(vec![master("B9", "Freedom")], vec![], built.version()).unwrap();
        assert_ne!(reloaded.version(), built.version());
    }
}
