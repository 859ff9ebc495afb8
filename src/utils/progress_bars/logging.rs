// src/utils/progress_bars/logging.rs - Structured logging helpers for pipeline stages
use log::{debug, info, warn};
use std::time::Instant;

use crate::matching::cache::CacheStats;
use crate::models::rules::RuleSetVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Batch,
    Reprocess,
    Validation,
    FloorTuning,
}

impl PipelineStage {
    fn name_and_emoji(&self) -> (&'static str, &'static str) {
        match self {
            PipelineStage::Batch => ("BATCH", "📦"),
            PipelineStage::Reprocess => ("REPROCESS", "🔁"),
            PipelineStage::Validation => ("VALIDATE", "🧪"),
            PipelineStage::FloorTuning => ("TUNER", "🎚️"),
        }
    }
}

#[derive(Clone)]
pub struct MatchingLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl MatchingLogger {
    pub fn new(stage: PipelineStage) -> Self {
        let (stage_name, stage_emoji) = stage.name_and_emoji();
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, batch_id: &str, rows: usize, catalog_version: u64, rule_set_version: RuleSetVersion) {
        info!(
            "[{}] {} 🚀 Starting {} of {} rows (batch ID: {})",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            rows,
            batch_id
        );
        info!(
            "[{}] {} ⚙️  Snapshot: catalog v{}, rule set {}",
            self.stage_name, self.stage_emoji, catalog_version, rule_set_version
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        let msg = if let Some(details) = details {
            format!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed.as_secs_f32()
            )
        } else {
            format!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed.as_secs_f32()
            )
        };
        info!("{}", msg);
    }

    pub fn log_data_loaded(&self, count: usize, data_type: &str) {
        info!(
            "[{}] {} 📊 Loaded {} {}",
            self.stage_name, self.stage_emoji, count, data_type
        );
    }

    pub fn log_duplicates(&self, total_rows: usize, duplicate_rows: usize) {
        if duplicate_rows > 0 {
            info!(
                "[{}] {} ⏭️  {} of {} rows repeat an earlier row (flagged, served from cache)",
                self.stage_name, self.stage_emoji, duplicate_rows, total_rows
            );
        } else {
            info!(
                "[{}] {} ✨ No duplicate rows in batch",
                self.stage_name, self.stage_emoji
            );
        }
    }

    pub fn log_batch_processing_start(&self, total_rows: usize, batch_size: usize, concurrent: usize) {
        let batch_count = total_rows.div_ceil(batch_size.max(1));
        info!(
            "[{}] {} ⚙️  Processing {} rows in {} tasks (task size: {}, {} in flight)",
            self.stage_name, self.stage_emoji, total_rows, batch_count, batch_size, concurrent
        );
    }

    pub fn log_wave_progress(&self, wave_num: usize, total_waves: usize, rows_in_wave: usize) {
        if wave_num % 5 == 0 || wave_num == 1 || wave_num == total_waves {
            info!(
                "[{}] {} 📦 Processing wave {}/{} ({} rows)",
                self.stage_name, self.stage_emoji, wave_num, total_waves, rows_in_wave
            );
        }
    }

    pub fn log_cache_results(&self, stats: &CacheStats) {
        if stats.lookups() > 0 {
            info!(
                "[{}] {} 💾 Cache results: {} hits, {} misses ({:.1}% hit rate), {} stale",
                self.stage_name,
                self.stage_emoji,
                stats.hits,
                stats.misses,
                stats.hit_rate(),
                stats.stale
            );
        }
    }

    pub fn log_completion(&self, rows: usize, above_floor: usize, avg_similarity: f64) {
        let duration = self.start_time.elapsed();
        info!(
            "[{}] {} 🎉 COMPLETED: {} rows matched in {:.2?}",
            self.stage_name, self.stage_emoji, rows, duration
        );
        info!(
            "[{}] {} 📊 Results: {} rows at or above the floor, avg similarity: {:.2}%",
            self.stage_name, self.stage_emoji, above_floor, avg_similarity
        );
    }

    pub fn log_cancelled(&self, completed: usize, total: usize) {
        warn!(
            "[{}] {} ⏹️  Cancelled after {}/{} rows",
            self.stage_name, self.stage_emoji, completed, total
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_data_quality_issue(&self, issue_type: &str, count: usize) {
        if count > 0 {
            warn!(
                "[{}] {} ⚠️  Data quality: {} instances of {}",
                self.stage_name, self.stage_emoji, count, issue_type
            );
        }
    }
}

// Run-level logging functions
pub fn log_pipeline_start(run_id: &str, client_id: &str, data_dir: &str) {
    info!("🚀 ===== CATALOG MATCHING RUN STARTING =====");
    info!("📅 Run ID: {}", run_id);
    info!("🏷️  Client: {}", client_id);
    info!("📁 Data directory: {}", data_dir);
    info!("============================================");
}

pub fn log_pipeline_phase(phase: &str, details: Option<&str>) {
    let msg = if let Some(details) = details {
        format!("🔄 Pipeline Phase: {} - {}", phase, details)
    } else {
        format!("🔄 Pipeline Phase: {}", phase)
    };
    info!("{}", msg);
}

pub fn log_pipeline_completion(
    run_id: &str,
    duration: std::time::Duration,
    rows: usize,
    cancelled: bool,
    cache_stats: Option<&CacheStats>,
) {
    info!("🎉 ===== CATALOG MATCHING RUN COMPLETED =====");
    info!("📅 Run ID: {}", run_id);
    info!("⏱️  Total Duration: {:.2?}", duration);
    info!("🎯 Rows written: {}", rows);
    if cancelled {
        warn!("⏹️  Run was cancelled before every row was matched");
    }
    if let Some(stats) = cache_stats {
        log_cache_stats(stats);
    }
    info!("=============================================");
}

pub fn log_cache_stats(stats: &CacheStats) {
    if stats.lookups() > 0 {
        info!("💾 ===== MATCH CACHE PERFORMANCE =====");
        info!(
            "📊 {} hits, {} misses ({:.1}% hit rate), {} stale entries recomputed",
            stats.hits,
            stats.misses,
            stats.hit_rate(),
            stats.stale
        );
        info!("📦 {} / {} entries in use", stats.entries, stats.capacity);
        info!("=====================================");
    }
}
