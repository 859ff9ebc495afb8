pub mod cache;
pub mod catalog_index;
pub mod fuzzy;
pub mod manager;
pub mod matcher;
pub mod normalizer;
pub mod rule_actions;
pub mod rules;
pub mod summary;
