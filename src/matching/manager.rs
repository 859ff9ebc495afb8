// src/matching/manager.rs - Row and batch orchestration: normalize, rewrite, match, audit
use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::future::join_all;
use log::{debug, info};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::matching::cache::{CacheStats, MatchCache, SharedMatchCache};
use crate::matching::catalog_index::CatalogIndex;
use crate::matching::matcher::FuzzyMatcher;
use crate::matching::normalizer::{clean_text, Normalizer};
use crate::matching::rule_actions::RuleAction;
use crate::matching::rules::{apply_rules, RewriteOutcome, RuleSnapshot};
use crate::models::records::{AuditRecord, InputRow, MatchResult, ReviewState, RowIssue};
use crate::models::rules::{RuleSet, RuleSetVersion};
use crate::sources::{CatalogLoader, RuleSetLoader};
use crate::utils::config::MatchingConfig;
use crate::utils::progress_bars::logging::{MatchingLogger, PipelineStage};
use crate::utils::progress_bars::progress_callback::{
    BatchProgressCallback, ProgressCallback, ProgressTracker, RowProgress,
};

/// Batch-level stop signal, checked before every row. Rows already being
/// matched finish; rows not yet started are left out of the output.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    /// One record per input row in input order, unless cancelled, in which
    /// case only finished rows appear (still in input order).
    pub records: Vec<AuditRecord>,
    pub cancelled: bool,
    pub catalog_version: u64,
    pub catalog_source_version: Option<u64>,
    pub rule_set_version: RuleSetVersion,
    /// Cache activity during this batch only.
    pub cache_stats: CacheStats,
}

/// Drives rows through normalizer, rule engine and the cached matcher.
/// Cheap to clone: spawned tasks each hold a clone.
#[derive(Clone)]
pub struct MatchingPipeline {
    config: Arc<MatchingConfig>,
    normalizer: Arc<Normalizer>,
    matcher: FuzzyMatcher,
    cache: SharedMatchCache,
}

impl MatchingPipeline {
    pub fn new(config: MatchingConfig) -> Self {
        let cache = Arc::new(MatchCache::from_config(&config));
        Self::with_cache(config, cache)
    }

    /// Shares an existing cache, e.g. across several batches of one client.
    pub fn with_cache(config: MatchingConfig, cache: SharedMatchCache) -> Self {
        Self {
            normalizer: Arc::new(Normalizer::new(&config.phrase_removals)),
            matcher: FuzzyMatcher::from_config(&config),
            config: Arc::new(config),
            cache,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedMatchCache {
        &self.cache
    }

    pub fn matcher(&self) -> &FuzzyMatcher {
        &self.matcher
    }

    /// Normalization followed by synonym and blacklist rewriting.
    pub fn rewrite(&self, description: Option<&str>, rules: &RuleSnapshot) -> RewriteOutcome {
        let normalized = self.normalizer.normalize_opt(description);
        apply_rules(&normalized, rules)
    }

    fn row_issues(rewrite: &RewriteOutcome, index: &CatalogIndex) -> Vec<RowIssue> {
        let mut issues = Vec::new();
        if rewrite.text.is_empty() {
            issues.push(RowIssue::EmptyInput);
        }
        if index.is_empty() {
            issues.push(RowIssue::CatalogEmpty);
        }
        issues
    }

    /// Full audit record for one row. Per-row problems are recorded as issues,
    /// never returned as errors.
    pub fn process_row(
        &self,
        row_index: usize,
        row: InputRow,
        rules: &RuleSnapshot,
        index: &CatalogIndex,
    ) -> AuditRecord {
        let rewrite = self.rewrite(row.vendor_product_description.as_deref(), rules);
        let issues = Self::row_issues(&rewrite, index);
        let candidate = self.cache.get_or_compute(&rewrite.text, index.version(), || {
            self.matcher.find_best_match(&rewrite.text, index)
        });

        AuditRecord {
            row_index,
            row,
            result: MatchResult::assemble(rewrite, candidate),
            duplicate_of: None,
            issues,
            review: ReviewState::default(),
            catalog_version: index.version(),
            catalog_source_version: index.source_version(),
            rule_set_version: rules.version(),
            processed_at: Utc::now(),
        }
    }

    /// Recomputes one earlier record against new rules and/or catalog. The
    /// cache read is skipped but the fresh match is stored. Row data,
    /// duplicate flag and reviewer decision are kept as they were.
    pub fn reprocess_row(&self, existing: &AuditRecord, rules: &RuleSet, index: &CatalogIndex) -> AuditRecord {
        let logger = MatchingLogger::new(PipelineStage::Reprocess);
        let snapshot = RuleSnapshot::from_rule_set(rules);
        let rewrite = self.rewrite(existing.row.vendor_product_description.as_deref(), &snapshot);
        let issues = Self::row_issues(&rewrite, index);
        let candidate = self.cache.recompute_and_store(&rewrite.text, index.version(), || {
            self.matcher.find_best_match(&rewrite.text, index)
        });

        let result = MatchResult::assemble(rewrite, candidate);
        logger.log_debug(&format!(
            "Row {}: {:?} {}% -> {:?} {}%",
            existing.row_index,
            existing.result.catalog_id(),
            existing.result.similarity_percentage,
            result.catalog_id(),
            result.similarity_percentage
        ));

        AuditRecord {
            row_index: existing.row_index,
            row: existing.row.clone(),
            result,
            duplicate_of: existing.duplicate_of,
            issues,
            review: existing.review.clone(),
            catalog_version: index.version(),
            catalog_source_version: index.source_version(),
            rule_set_version: snapshot.version(),
            processed_at: Utc::now(),
        }
    }

    /// Applies the reviewer's row action (if any) to `rules`, then reprocesses
    /// the row with the result. Returns the new record and the rule set it
    /// was computed with.
    pub fn reprocess_row_with_action(
        &self,
        existing: &AuditRecord,
        rules: &RuleSet,
        index: &CatalogIndex,
    ) -> Result<(AuditRecord, RuleSet)> {
        let updated = match RuleAction::from_review(&existing.review)
            .with_context(|| format!("Invalid row action on row {}", existing.row_index))?
        {
            Some(action) => action.apply(rules),
            None => rules.clone(),
        };
        Ok((self.reprocess_row(existing, &updated, index), updated))
    }

    /// Matches every row against one rule snapshot and one index.
    ///
    /// Rows are split into tasks of `batch_size` rows, with at most
    /// `max_concurrent_batches` tasks in flight. `progress` gets
    /// `(processed, total)` after each row.
    pub async fn process_batch(
        &self,
        rows: Vec<InputRow>,
        rules: &RuleSet,
        index: Arc<CatalogIndex>,
        progress: Option<BatchProgressCallback>,
        cancel: Option<CancellationFlag>,
    ) -> BatchOutcome {
        let batch_id = Uuid::new_v4().to_string();
        let logger = MatchingLogger::new(PipelineStage::Batch);
        let snapshot = Arc::new(RuleSnapshot::from_rule_set(rules));
        let cancel = cancel.unwrap_or_default();
        let total = rows.len();
        let cache_before = self.cache.stats();

        logger.log_start(&batch_id, total, index.version(), snapshot.version());
        debug!(
            "Rule snapshot: {} synonyms, {} blacklist phrases",
            snapshot.synonym_count(),
            snapshot.blacklist_count()
        );

        let duplicate_of = find_duplicates(&rows);
        logger.log_duplicates(total, duplicate_of.len());

        let batch_size = self.config.batch_size.max(1);
        let concurrent = self.config.max_concurrent_batches.max(1);
        let wave_size = self.config.wave_size().max(batch_size);
        let total_waves = total.div_ceil(wave_size);
        logger.log_batch_processing_start(total, batch_size, concurrent);

        let row_progress = RowProgress::new(total, progress);
        let mut records: Vec<AuditRecord> = Vec::with_capacity(total);
        let indexed_rows: Vec<(usize, InputRow)> = rows.into_iter().enumerate().collect();

        for (wave_idx, wave) in indexed_rows.chunks(wave_size).enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let mut batch_futures = Vec::new();
            let mut reported = Vec::new();
            for task_rows in wave.chunks(batch_size) {
                let task_rows = task_rows.to_vec();
                let pipeline = self.clone();
                let snapshot = Arc::clone(&snapshot);
                let index = Arc::clone(&index);
                let row_progress = row_progress.clone();
                let cancel = cancel.clone();
                // rows this task has already counted towards progress
                let task_reported = Arc::new(AtomicUsize::new(0));
                reported.push(Arc::clone(&task_reported));

                batch_futures.push(tokio::spawn(async move {
                    let mut done = Vec::with_capacity(task_rows.len());
                    for (row_index, row) in task_rows {
                        if cancel.is_cancelled() {
                            break;
                        }
                        done.push(pipeline.process_row(row_index, row, &snapshot, &index));
                        task_reported.fetch_add(1, Ordering::SeqCst);
                        row_progress.row_done();
                    }
                    done
                }));
            }

            let results = join_all(batch_futures).await;
            for ((task_rows, result), task_reported) in wave.chunks(batch_size).zip(results).zip(reported) {
                match result {
                    Ok(done) => records.extend(done),
                    Err(e) => {
                        logger.log_warning(&format!(
                            "Task for rows {}..={} panicked or failed: {}",
                            task_rows[0].0,
                            task_rows[task_rows.len() - 1].0,
                            e
                        ));
                        records.extend(failed_task_records(
                            task_rows,
                            &e.to_string(),
                            task_reported.load(Ordering::SeqCst),
                            &row_progress,
                            &index,
                            snapshot.version(),
                        ));
                    }
                }
            }

            logger.log_wave_progress(wave_idx + 1, total_waves, wave.len());
        }

        for record in &mut records {
            record.duplicate_of = duplicate_of.get(&record.row_index).copied();
        }

        let cancelled = records.len() < total;
        if cancelled {
            logger.log_cancelled(records.len(), total);
        }

        let cache_stats = self.cache.stats().since(&cache_before);
        logger.log_cache_results(&cache_stats);
        let scored: Vec<u8> = records
            .iter()
            .filter(|r| r.result.best_match.is_some())
            .map(|r| r.result.similarity_percentage)
            .collect();
        let avg_similarity = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|&s| s as f64).sum::<f64>() / scored.len() as f64
        };
        let above_floor = scored.iter().filter(|&&s| s >= self.matcher.floor()).count();
        logger.log_completion(records.len(), above_floor, avg_similarity);

        BatchOutcome {
            batch_id,
            records,
            cancelled,
            catalog_version: index.version(),
            catalog_source_version: index.source_version(),
            rule_set_version: snapshot.version(),
            cache_stats,
        }
    }

    /// Loads rules and catalog for `client_id`, validates, then runs
    /// [`process_batch`](Self::process_batch). Any loading or validation
    /// failure aborts before a single row is matched.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_batch_from_sources(
        &self,
        client_id: &str,
        rows: Vec<InputRow>,
        rule_loader: &dyn RuleSetLoader,
        catalog_loader: &dyn CatalogLoader,
        progress: Option<BatchProgressCallback>,
        phase_callback: Option<ProgressCallback>,
        cancel: Option<CancellationFlag>,
    ) -> Result<BatchOutcome> {
        let mut tracker = ProgressTracker::new(phase_callback);

        tracker.set_phase("Loading rules");
        let rules = rule_loader
            .load_rule_set(client_id)
            .with_context(|| format!("Failed to load rule set for client {}", client_id))?;

        tracker.set_phase("Loading catalog");
        let catalog = catalog_loader
            .load_catalog(client_id)
            .with_context(|| format!("Failed to load catalog for client {}", client_id))?;

        tracker.set_phase_with_details(
            "Building index",
            &format!("{} master, {} staging", catalog.master.len(), catalog.staging.len()),
        );
        let index = catalog
            .into_index()
            .with_context(|| format!("Failed to build catalog index for client {}", client_id))?;

        tracker.set_phase("Validating input");
        validate_batch_input(&rows, &rules, &index)?;

        tracker.set_phase_with_details("Matching", &format!("{} rows", rows.len()));
        let outcome = self
            .process_batch(rows, &rules, Arc::new(index), progress, cancel)
            .await;
        tracker.finish_phase(&format!("{} records", outcome.records.len()));
        info!(
            "Batch {} for client {}: {} records{}",
            outcome.batch_id,
            client_id,
            outcome.records.len(),
            if outcome.cancelled { " (cancelled)" } else { "" }
        );
        Ok(outcome)
    }
}

/// Unmatched `TaskFailed` records for every row of a task that died. Progress
/// is advanced only for the rows the task had not reported before dying.
fn failed_task_records(
    task_rows: &[(usize, InputRow)],
    reason: &str,
    already_reported: usize,
    row_progress: &RowProgress,
    index: &CatalogIndex,
    rule_set_version: RuleSetVersion,
) -> Vec<AuditRecord> {
    for _ in already_reported.min(task_rows.len())..task_rows.len() {
        row_progress.row_done();
    }
    task_rows
        .iter()
        .map(|(row_index, row)| {
            AuditRecord::failed(
                *row_index,
                row.clone(),
                reason,
                index.version(),
                index.source_version(),
                rule_set_version,
            )
        })
        .collect()
}

/// First-occurrence index for every row that repeats an earlier row's
/// description and vendor. Rows without a description are never duplicates.
fn find_duplicates(rows: &[InputRow]) -> HashMap<usize, usize> {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut duplicate_of = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let has_text = row
            .vendor_product_description
            .as_deref()
            .map_or(false, |d| !d.trim().is_empty());
        if !has_text {
            continue;
        }
        match first_seen.get(&row.duplicate_key()) {
            Some(&first) => {
                duplicate_of.insert(i, first);
            }
            None => {
                first_seen.insert(row.duplicate_key(), i);
            }
        }
    }
    duplicate_of
}

/// Structural checks run before a batch starts. Empty descriptions are only
/// reported; they still produce records.
pub fn validate_batch_input(rows: &[InputRow], rules: &RuleSet, index: &CatalogIndex) -> Result<()> {
    let logger = MatchingLogger::new(PipelineStage::Validation);

    if let Some(rule) = rules.active_synonyms().find(|r| clean_text(&r.original).is_empty()) {
        bail!("Synonym rule with empty original phrase (replacement '{}')", rule.replacement);
    }
    if let Some(rule) = rules.active_blacklist().find(|r| clean_text(&r.phrase).is_empty()) {
        bail!("Blacklist rule with empty phrase '{}'", rule.phrase);
    }

    let mut ids = HashSet::new();
    for entry in index.master_entries() {
        if !ids.insert(entry.catalog_id.as_str()) {
            bail!("Duplicate master catalog_id '{}'", entry.catalog_id);
        }
    }

    let empty_descriptions = rows
        .iter()
        .filter(|r| {
            r.vendor_product_description
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
        })
        .count();
    logger.log_data_quality_issue("empty vendor descriptions", empty_descriptions);
    if index.is_empty() {
        logger.log_warning("Catalog index is empty; every row will report no match");
    }
    logger.log_data_loaded(rows.len(), "input rows");
    Ok(())
}
