//! Matching pipeline configuration
//! Values come from environment variables (optionally via `.env`), with defaults for everything

use log::{debug, info};
use std::env;

use crate::utils::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CACHE_SHARDS, DEFAULT_CACHE_SIZE, DEFAULT_MIN_TOKEN_LENGTH,
    DEFAULT_SIMILARITY_FLOOR,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Acceptance floor (0-100) that triggers fallback to the next algorithm
    pub similarity_floor: u8,
    pub cache_size: usize,
    pub cache_shards: usize,
    /// Rows per spawned task
    pub batch_size: usize,
    /// Spawned tasks in flight per wave
    pub max_concurrent_batches: usize,
    /// Noise phrases dropped by the normalizer before rules run
    pub phrase_removals: Vec<String>,
    pub min_token_length: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_floor: DEFAULT_SIMILARITY_FLOOR,
            cache_size: DEFAULT_CACHE_SIZE,
            cache_shards: DEFAULT_CACHE_SHARDS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: num_cpus::get(),
            phrase_removals: Vec::new(),
            min_token_length: DEFAULT_MIN_TOKEN_LENGTH,
        }
    }
}

impl MatchingConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let similarity_floor = env::var("MATCH_SIMILARITY_FLOOR")
            .unwrap_or_else(|_| DEFAULT_SIMILARITY_FLOOR.to_string())
            .parse::<u8>()
            .unwrap_or(DEFAULT_SIMILARITY_FLOOR)
            .min(100);

        let cache_size = env::var("MATCH_CACHE_SIZE")
            .unwrap_or_else(|_| DEFAULT_CACHE_SIZE.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_CACHE_SIZE)
            .max(1);

        let cache_shards = env::var("MATCH_CACHE_SHARDS")
            .unwrap_or_else(|_| DEFAULT_CACHE_SHARDS.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_CACHE_SHARDS)
            .max(1);

        let batch_size = env::var("MATCH_BATCH_SIZE")
            .unwrap_or_else(|_| DEFAULT_BATCH_SIZE.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .max(1);

        let max_concurrent_batches = env::var("MATCH_MAX_CONCURRENT_BATCHES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or_else(num_cpus::get)
            .max(1);

        let phrase_removals = env::var("MATCH_PHRASE_REMOVALS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let min_token_length = env::var("MATCH_MIN_TOKEN_LENGTH")
            .unwrap_or_else(|_| DEFAULT_MIN_TOKEN_LENGTH.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_MIN_TOKEN_LENGTH)
            .max(1);

        let config = Self {
            similarity_floor,
            cache_size,
            cache_shards,
            batch_size,
            max_concurrent_batches,
            phrase_removals,
            min_token_length,
        };
        debug!("Matching config: {:?}", config);
        config
    }

    /// Rows processed per wave of spawned tasks
    pub fn wave_size(&self) -> usize {
        self.batch_size.saturating_mul(self.max_concurrent_batches)
    }

    pub fn log_config(&self) {
        info!("🔧 Matching configuration:");
        info!("   • similarity floor: {}%", self.similarity_floor);
        info!(
            "   • cache: {} entries across {} shards",
            self.cache_size, self.cache_shards
        );
        info!(
            "   • {} rows per task, {} tasks per wave",
            self.batch_size, self.max_concurrent_batches
        );
        if self.phrase_removals.is_empty() {
            info!("   • no phrase removals configured");
        } else {
            info!("   • phrase removals: {:?}", self.phrase_removals);
        }
    }
}
