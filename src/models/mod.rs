pub mod catalog;
pub mod records;
pub mod rules;

pub use catalog::{CatalogEntry, CatalogOrigin, STAGING_CATALOG_ID};
pub use records::{AppliedSynonym, AuditRecord, InputRow, MatchResult, ReviewDecision, ReviewState, RowIssue};
pub use rules::{BlacklistRule, RuleScope, RuleSet, RuleStatus, SynonymRule};
