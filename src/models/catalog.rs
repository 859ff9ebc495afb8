// src/models/catalog.rs - Catalog entries shared by the master and staging catalogs

use serde::{Deserialize, Serialize};

use crate::matching::normalizer::clean_text;

/// Reserved catalog id carried by every staging entry. Staging entries are
/// create-candidates, not existing SKUs.
pub const STAGING_CATALOG_ID: &str = "111111";

/// Which catalog an entry came from. `Master` orders before `Staging`, which is
/// what the matcher's tie-break relies on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum CatalogOrigin {
    #[default]
    Master,
    Staging,
}

impl CatalogOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogOrigin::Master => "master",
            CatalogOrigin::Staging => "staging",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub catalog_id: String,
    #[serde(default)]
    pub categoria: String,
    #[serde(default)]
    pub variedad: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub grado: String,
    /// Normalized comparison target. Computed from the four attributes when a
    /// loader hands over an entry without one.
    #[serde(default)]
    pub search_key: String,
    #[serde(default)]
    pub origin: CatalogOrigin,
}

impl CatalogEntry {
    pub fn master(
        catalog_id: impl Into<String>,
        categoria: &str,
        variedad: &str,
        color: &str,
        grado: &str,
    ) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            categoria: categoria.to_string(),
            variedad: variedad.to_string(),
            color: color.to_string(),
            grado: grado.to_string(),
            search_key: Self::build_search_key(categoria, variedad, color, grado),
            origin: CatalogOrigin::Master,
        }
    }

    /// A proposed product awaiting creation. Always carries the sentinel id.
    pub fn staging(categoria: &str, variedad: &str, color: &str, grado: &str) -> Self {
        Self {
            catalog_id: STAGING_CATALOG_ID.to_string(),
            categoria: categoria.to_string(),
            variedad: variedad.to_string(),
            color: color.to_string(),
            grado: grado.to_string(),
            search_key: Self::build_search_key(categoria, variedad, color, grado),
            origin: CatalogOrigin::Staging,
        }
    }

    /// Joins the non-empty attributes and cleans the result the same way
    /// vendor descriptions are cleaned.
    pub fn build_search_key(categoria: &str, variedad: &str, color: &str, grado: &str) -> String {
        let combined = [categoria, variedad, color, grado]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        clean_text(&combined)
    }

    pub fn is_staging(&self) -> bool {
        self.origin == CatalogOrigin::Staging
    }

    /// Replaces the computed search key.
    pub fn with_search_key(mut self, search_key: &str) -> Self {
        self.search_key = search_key.to_string();
        self
    }
}
