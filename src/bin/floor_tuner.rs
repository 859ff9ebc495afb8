// src/bin/floor_tuner.rs
//
// Helps pick MATCH_SIMILARITY_FLOOR for a client.
//
// Rows (a raw row file, or the rows inside earlier audit records) are
// rewritten with the client's current rules and scored against the catalog
// with every similarity algorithm. For floors 50..=95 the tool reports how
// many rows each algorithm accepts and where the fallback chain settles.
// When audit records carry accepted/denied review decisions, it also
// compares the two populations and suggests a floor.

use anyhow::{Context, Result};
use catalog_match_lib::matching::fuzzy::SimilarityAlgorithm;
use catalog_match_lib::matching::manager::MatchingPipeline;
use catalog_match_lib::matching::rules::RuleSnapshot;
use catalog_match_lib::models::records::{InputRow, ReviewDecision};
use catalog_match_lib::sources::json_files::{load_records, load_rows};
use catalog_match_lib::sources::{CatalogLoader, JsonFileStore, RuleSetLoader};
use catalog_match_lib::utils::config::MatchingConfig;
use catalog_match_lib::utils::constants::DEFAULT_SIMILARITY_FLOOR;
use catalog_match_lib::utils::env::load_env;
use catalog_match_lib::utils::progress_bars::logging::{MatchingLogger, PipelineStage};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;
use std::path::PathBuf;

const MIN_FLOOR_TIER: u8 = 50;
const MAX_FLOOR_TIER: u8 = 95;
const FLOOR_INCREMENT: usize = 5;

#[derive(Parser)]
#[command(author, version, about = "Explore similarity floors against a client catalog", long_about = None)]
struct TunerArgs {
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long)]
    client: String,

    /// JSON array of raw vendor rows
    #[arg(long, required_unless_present = "records", conflicts_with = "records")]
    rows: Option<PathBuf>,

    /// Audit records from an earlier run; review decisions are used if present
    #[arg(long)]
    records: Option<PathBuf>,

    /// Only score a random sample of this many rows
    #[arg(long)]
    sample: Option<usize>,
}

// Top score per algorithm for one row, plus its review decision if known
#[derive(Debug, Clone)]
struct RowScores {
    decision: ReviewDecision,
    per_algorithm: HashMap<SimilarityAlgorithm, u8>,
}

impl RowScores {
    fn top(&self, algorithm: SimilarityAlgorithm) -> u8 {
        self.per_algorithm.get(&algorithm).copied().unwrap_or(0)
    }

    /// Where the matcher's fallback chain would stop at `floor`, and the score
    /// it would report. `None` means no algorithm reached the floor.
    fn settle_at(&self, floor: u8) -> (Option<SimilarityAlgorithm>, u8) {
        let mut best = 0;
        for algorithm in SimilarityAlgorithm::FALLBACK_ORDER {
            let score = self.top(algorithm);
            if score >= floor {
                return (Some(algorithm), score);
            }
            if score > best {
                best = score;
            }
        }
        (None, best)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let args = TunerArgs::parse();
    let logger = MatchingLogger::new(PipelineStage::FloorTuning);
    info!("Starting Floor Tuner...");

    let store = JsonFileStore::new(&args.data_dir);
    let rules = store.load_rule_set(&args.client)?;
    let index = store
        .load_catalog(&args.client)?
        .into_index()
        .with_context(|| format!("Failed to build catalog index for client {}", args.client))?;
    logger.log_data_loaded(index.len(), "catalog candidates");

    let mut rows: Vec<(InputRow, ReviewDecision)> = match (&args.rows, &args.records) {
        (Some(path), _) => load_rows(path)
            .with_context(|| format!("Failed to load rows from {}", path.display()))?
            .into_iter()
            .map(|row| (row, ReviewDecision::Pending))
            .collect(),
        (None, Some(path)) => load_records(path)
            .with_context(|| format!("Failed to load records from {}", path.display()))?
            .into_iter()
            .filter(|r| !r.is_duplicate())
            .map(|r| (r.row, r.review.decision))
            .collect(),
        (None, None) => anyhow::bail!("Pass either --rows or --records"),
    };
    logger.log_data_loaded(rows.len(), "rows");

    if rows.is_empty() {
        eprintln!("No rows to score. Exiting.");
        return Ok(());
    }
    if let Some(sample) = args.sample {
        if sample < rows.len() {
            rows.shuffle(&mut thread_rng());
            rows.truncate(sample);
            info!("Sampled {} rows", sample);
        }
    }

    let config = MatchingConfig::from_env();
    let current_floor = config.similarity_floor;
    let pipeline = MatchingPipeline::new(config);
    let snapshot = RuleSnapshot::from_rule_set(&rules);

    logger.log_phase("Scoring rows", Some(&format!("{} algorithms", SimilarityAlgorithm::FALLBACK_ORDER.len())));
    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );

    let mut scores = Vec::with_capacity(rows.len());
    for (row, decision) in &rows {
        let rewrite = pipeline.rewrite(row.vendor_product_description.as_deref(), &snapshot);
        let per_algorithm = SimilarityAlgorithm::FALLBACK_ORDER
            .iter()
            .map(|&algorithm| {
                let top = pipeline
                    .matcher()
                    .top_for_algorithm(algorithm, &rewrite.text, &index)
                    .map_or(0, |c| c.score);
                (algorithm, top)
            })
            .collect();
        scores.push(RowScores {
            decision: *decision,
            per_algorithm,
        });
        pb.inc(1);
    }
    pb.finish_with_message("scored");

    print_floor_table(&scores, current_floor);
    analyze_reviewed(&scores, current_floor);

    let reported: Vec<u8> = scores.iter().map(|s| s.settle_at(current_floor).1).collect();
    logger.log_completion(
        scores.len(),
        reported.iter().filter(|&&s| s >= current_floor).count(),
        reported.iter().map(|&s| s as f64).sum::<f64>() / reported.len() as f64,
    );
    Ok(())
}

fn print_floor_table(scores: &[RowScores], current_floor: u8) {
    println!("\n--- Rows accepted per floor ---");
    print!("  floor");
    for algorithm in SimilarityAlgorithm::FALLBACK_ORDER {
        print!("  {:>16}", algorithm.as_str());
    }
    println!("  {:>8}  {:>11}", "fallback", "below_floor");

    for floor in floor_tiers() {
        print!("  {:>5}", floor);
        for algorithm in SimilarityAlgorithm::FALLBACK_ORDER {
            let accepted = scores.iter().filter(|s| s.top(algorithm) >= floor).count();
            print!("  {:>16}", accepted);
        }
        let settled = settle_counts(scores, floor);
        let accepted_by_chain: usize = SimilarityAlgorithm::FALLBACK_ORDER
            .iter()
            .map(|a| settled.get(&Some(*a)).copied().unwrap_or(0))
            .sum();
        let below = settled.get(&None).copied().unwrap_or(0);
        let marker = if floor == current_floor { "  <- current" } else { "" };
        println!("  {:>8}  {:>11}{}", accepted_by_chain, below, marker);
    }

    println!("\n--- Where the fallback chain settles ---");
    for floor in floor_tiers() {
        let settled = settle_counts(scores, floor);
        let parts: Vec<String> = SimilarityAlgorithm::FALLBACK_ORDER
            .iter()
            .map(|a| format!("{}={}", a.as_str(), settled.get(&Some(*a)).copied().unwrap_or(0)))
            .collect();
        println!("  {:>5}: {}", floor, parts.join(", "));
    }
}

fn floor_tiers() -> impl Iterator<Item = u8> {
    (MIN_FLOOR_TIER..=MAX_FLOOR_TIER).step_by(FLOOR_INCREMENT)
}

fn settle_counts(scores: &[RowScores], floor: u8) -> HashMap<Option<SimilarityAlgorithm>, usize> {
    let mut counts = HashMap::new();
    for s in scores {
        *counts.entry(s.settle_at(floor).0).or_insert(0) += 1;
    }
    counts
}

fn analyze_reviewed(scores: &[RowScores], current_floor: u8) {
    let with_decision = |decision: ReviewDecision| -> Vec<u8> {
        let mut values: Vec<u8> = scores
            .iter()
            .filter(|s| s.decision == decision)
            .map(|s| s.settle_at(current_floor).1)
            .collect();
        values.sort_unstable();
        values
    };
    let accepted = with_decision(ReviewDecision::Accepted);
    let denied = with_decision(ReviewDecision::Denied);
    if accepted.is_empty() && denied.is_empty() {
        println!("\nNo reviewed rows. Pass --records with accepted/denied decisions for a floor suggestion.");
        return;
    }

    println!("\n--- Reviewed Rows (scored at floor {}) ---", current_floor);
    println!("Accepted: {}", accepted.len());
    println!("Denied: {}", denied.len());
    print_distribution("Accepted", &accepted);
    print_distribution("Denied", &denied);

    println!("\n--- Suggested Floor (95th percentile of denied + 1) ---");
    println!("Suggested MATCH_SIMILARITY_FLOOR: {}", suggest_floor(&accepted, &denied));
    println!("Current MATCH_SIMILARITY_FLOOR: {}", current_floor);
}

fn print_distribution(label: &str, sorted: &[u8]) {
    if sorted.is_empty() {
        println!("  No {} rows.", label.to_lowercase());
        return;
    }
    let avg = sorted.iter().map(|&s| s as f64).sum::<f64>() / sorted.len() as f64;
    println!(
        "  {} (min/avg/max): {} / {:.1} / {}",
        label,
        sorted[0],
        avg,
        sorted[sorted.len() - 1]
    );
    println!(
        "  {} (P5/P25/P75/P95): {} / {} / {} / {}",
        label,
        percentile(sorted, 0.05),
        percentile(sorted, 0.25),
        percentile(sorted, 0.75),
        percentile(sorted, 0.95)
    );
}

fn suggest_floor(accepted: &[u8], denied: &[u8]) -> u8 {
    if !denied.is_empty() {
        percentile(denied, 0.95).saturating_add(1).min(99)
    } else if !accepted.is_empty() {
        // No denials: sit at the weakest accepted row
        accepted[0].clamp(60, 95)
    } else {
        DEFAULT_SIMILARITY_FLOOR
    }
}

// Nearest-rank percentile over an ascending slice
fn percentile(sorted: &[u8], p: f64) -> u8 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
