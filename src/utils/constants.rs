// src/utils/constants.rs

/// Default acceptance floor (0-100) below which the matcher falls back to the
/// next similarity algorithm.
pub const DEFAULT_SIMILARITY_FLOOR: u8 = 70;

pub const DEFAULT_CACHE_SIZE: usize = 20_000;
pub const DEFAULT_CACHE_SHARDS: usize = 16;

/// Rows handed to one spawned task.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Tokens shorter than this are left out of matched/missing word analysis.
pub const DEFAULT_MIN_TOKEN_LENGTH: usize = 2;

/// Upper bound on synonym + blacklist passes for one description. Only a
/// cyclic rule set (a -> b, b -> a) ever reaches it.
pub const MAX_REWRITE_PASSES: usize = 8;

/// Cache stats are logged every this many lookups.
pub const CACHE_STATS_LOG_INTERVAL: usize = 1000;

/// Category reported for missing words absent from the classification table.
pub const UNCLASSIFIED_CATEGORY: &str = "unclassified";

pub const GLOBAL_RULES_FILE: &str = "global_rules.json";
pub const CLIENT_RULES_FILE: &str = "rules.json";
pub const CLIENT_CATALOG_FILE: &str = "catalog.json";
