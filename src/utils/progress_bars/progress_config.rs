// src/utils/progress_bars/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;
use std::time::Duration;

/// Configuration for the progress bars drawn by the binaries
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show the per-phase status line under the row bar
    pub detailed: bool,
    /// Refresh rate for progress bars in milliseconds
    pub refresh_rate_ms: u64,
    /// Whether to show memory usage in progress messages
    pub show_memory: bool,
    /// Whether to show cache statistics in progress messages
    pub show_cache_stats: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
            refresh_rate_ms: 100,
            show_memory: true,
            show_cache_stats: true,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            detailed: env::var("PROGRESS_DETAILED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            refresh_rate_ms: env::var("PROGRESS_REFRESH_RATE_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            show_memory: env::var("PROGRESS_SHOW_MEMORY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            show_cache_stats: env::var("PROGRESS_SHOW_CACHE_STATS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }

    /// Create a MultiProgress instance if progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    /// Row bar for a batch of `total` rows, attached to `multi_progress`.
    pub fn create_row_bar(&self, multi_progress: &MultiProgress, total: usize) -> ProgressBar {
        let pb = multi_progress.add(ProgressBar::new(total as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.enable_steady_tick(Duration::from_millis(self.refresh_rate_ms.max(10)));
        pb
    }

    /// Spinner line for phase updates, only when detailed output is on.
    pub fn create_status_line(&self, multi_progress: &MultiProgress) -> Option<ProgressBar> {
        if !self.should_show_detailed() {
            return None;
        }
        let status = multi_progress.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::default_spinner()
                .template("    {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Some(status)
    }

    /// Check if detailed progress should be shown
    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    /// Check if memory usage should be shown
    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }

    /// Check if cache statistics should be shown
    pub fn should_show_cache_stats(&self) -> bool {
        self.enabled && self.show_cache_stats
    }
}

/// Environment variable configuration example
pub fn print_env_config_example() {
    println!("# Matching Configuration");
    println!("export MATCH_SIMILARITY_FLOOR=70");
    println!("export MATCH_CACHE_SIZE=20000");
    println!("export MATCH_CACHE_SHARDS=16");
    println!("export MATCH_BATCH_SIZE=100");
    println!("export MATCH_MAX_CONCURRENT_BATCHES=8");
    println!("export MATCH_PHRASE_REMOVALS=\"caja,extra large\"");
    println!("export MATCH_MIN_TOKEN_LENGTH=2");
    println!();
    println!("# Progress Tracking Configuration");
    println!("# Enable/disable all progress bars (default: true)");
    println!("export PROGRESS_ENABLED=true");
    println!();
    println!("# Show the phase status line (default: true)");
    println!("export PROGRESS_DETAILED=true");
    println!();
    println!("# Progress bar refresh rate in milliseconds (default: 100)");
    println!("export PROGRESS_REFRESH_RATE_MS=100");
    println!();
    println!("# Show memory usage in progress messages (default: true)");
    println!("export PROGRESS_SHOW_MEMORY=true");
    println!();
    println!("# Show cache hit/miss statistics (default: true)");
    println!("export PROGRESS_SHOW_CACHE_STATS=true");
    println!();
    println!("# For minimal output (CI/automated environments):");
    println!("export PROGRESS_ENABLED=false");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(config.detailed);
        assert_eq!(config.refresh_rate_ms, 100);
        assert!(config.show_memory);
        assert!(config.show_cache_stats);
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_DETAILED", "false");
        env::set_var("PROGRESS_REFRESH_RATE_MS", "50");
        env::set_var("PROGRESS_SHOW_MEMORY", "false");
        env::set_var("PROGRESS_SHOW_CACHE_STATS", "nope");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert!(!config.detailed);
        assert_eq!(config.refresh_rate_ms, 50);
        assert!(!config.show_memory);
        // unparsable values fall back to the default
        assert!(config.show_cache_stats);

        // Clean up
        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_DETAILED");
        env::remove_var("PROGRESS_REFRESH_RATE_MS");
        env::remove_var("PROGRESS_SHOW_MEMORY");
        env::remove_var("PROGRESS_SHOW_CACHE_STATS");
    }

    #[test]
    fn test_multi_progress_creation() {
        let mut config = ProgressConfig::default();

        config.enabled = true;
        assert!(config.create_multi_progress().is_some());

        config.enabled = false;
        assert!(config.create_multi_progress().is_none());
    }

    #[test]
    fn test_should_show_methods() {
        let mut config = ProgressConfig::default();

        config.enabled = false;
        assert!(!config.should_show_detailed());
        assert!(!config.should_show_memory());
        assert!(!config.should_show_cache_stats());

        config.enabled = true;
        config.detailed = false;
        config.show_memory = false;
        config.show_cache_stats = true;
        assert!(!config.should_show_detailed());
        assert!(!config.should_show_memory());
        assert!(config.should_show_cache_stats());
    }
}
