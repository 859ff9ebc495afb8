use anyhow::{Context, Result};
use catalog_match_lib::matching::catalog_index::CatalogIndex;
use catalog_match_lib::matching::manager::{CancellationFlag, MatchingPipeline};
use catalog_match_lib::matching::summary::ProcessingSummary;
use catalog_match_lib::models::catalog::CatalogEntry;
use catalog_match_lib::sources::json_files::{load_records, load_rows, write_records, write_report};
use catalog_match_lib::sources::{CatalogLoader, CatalogSnapshot, JsonFileStore, RuleSetLoader};
use catalog_match_lib::utils::config::MatchingConfig;
use catalog_match_lib::utils::env::load_env;
use catalog_match_lib::utils::get_memory_usage;
use catalog_match_lib::utils::progress_bars::logging::{
    log_pipeline_completion, log_pipeline_phase, log_pipeline_start,
};
use catalog_match_lib::utils::progress_bars::progress_callback::{
    create_logging_batch_callback, create_simple_callback, BatchProgressCallback, ProgressCallback,
};
use catalog_match_lib::utils::progress_bars::progress_config::{print_env_config_example, ProgressConfig};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Match vendor product descriptions against a client catalog", long_about = None)]
struct Cli {
    /// Directory holding global_rules.json and one folder per client
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match a JSON array of vendor rows and write audit records
    Match {
        #[arg(long)]
        client: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Also write a processing summary here
        #[arg(long)]
        summary: Option<PathBuf>,
        /// Override MATCH_SIMILARITY_FLOOR
        #[arg(long)]
        floor: Option<u8>,
    },
    /// Recompute earlier audit records against the current rules and catalog
    Reprocess {
        #[arg(long)]
        client: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Turn reviewer synonym/blacklist actions into client rules first
        #[arg(long)]
        apply_actions: bool,
    },
    /// Add a proposed product to the client's staging catalog
    Stage {
        #[arg(long)]
        client: String,
        #[arg(long)]
        categoria: String,
        #[arg(long, default_value = "")]
        variedad: String,
        #[arg(long, default_value = "")]
        color: String,
        #[arg(long, default_value = "")]
        grado: String,
    },
    /// Print the supported environment variables
    EnvExample,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging and environment
    env_logger::init();
    load_env();

    let cli = Cli::parse();
    let store = JsonFileStore::new(&cli.data_dir);

    match cli.command {
        Command::Match {
            client,
            input,
            output,
            summary,
            floor,
        } => run_match(&store, &client, input, output, summary, floor).await,
        Command::Reprocess {
            client,
            input,
            output,
            apply_actions,
        } => run_reprocess(&store, &client, input, output, apply_actions),
        Command::Stage {
            client,
            categoria,
            variedad,
            color,
            grado,
        } => run_stage(&store, &client, &categoria, &variedad, &color, &grado),
        Command::EnvExample => {
            print_env_config_example();
            Ok(())
        }
    }
}

async fn run_match(
    store: &JsonFileStore,
    client: &str,
    input: PathBuf,
    output: PathBuf,
    summary_path: Option<PathBuf>,
    floor: Option<u8>,
) -> Result<()> {
    let start = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    log_pipeline_start(&run_id, client, &store.data_dir().display().to_string());

    let mut config = MatchingConfig::from_env();
    if let Some(floor) = floor {
        config.similarity_floor = floor.min(100);
    }
    config.log_config();

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    log_pipeline_phase("Loading rows", Some(&input.display().to_string()));
    let rows = load_rows(&input).with_context(|| format!("Failed to load rows from {}", input.display()))?;
    let total_rows = rows.len();

    let multi_progress = progress_config.create_multi_progress();
    let row_bar = multi_progress
        .as_ref()
        .map(|mp| progress_config.create_row_bar(mp, total_rows));
    let status_line = multi_progress
        .as_ref()
        .and_then(|mp| progress_config.create_status_line(mp));

    let row_callback: BatchProgressCallback = match &row_bar {
        Some(pb) => {
            let pb = pb.clone();
            Arc::new(move |processed: usize, _total: usize| {
                pb.set_position(processed as u64);
            })
        }
        None => create_logging_batch_callback("MATCH"),
    };
    let phase_callback: ProgressCallback = match &status_line {
        Some(status) => {
            let status = status.clone();
            Arc::new(move |phase: String, details: Option<String>| {
                let detail_str = details.map(|d| format!(" - {}", d)).unwrap_or_default();
                status.set_message(format!("{}{}", phase, detail_str));
            })
        }
        None => create_simple_callback("MATCH"),
    };

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing rows in flight and stopping");
                cancel.cancel();
            }
        });
    }

    let pipeline = MatchingPipeline::new(config.clone());
    let outcome = pipeline
        .process_batch_from_sources(
            client,
            rows,
            store,
            store,
            Some(row_callback),
            Some(phase_callback),
            Some(cancel),
        )
        .await?;

    if let Some(pb) = &row_bar {
        pb.finish_with_message(if outcome.cancelled { "cancelled" } else { "done" });
    }
    if let Some(status) = &status_line {
        status.finish_and_clear();
    }

    log_pipeline_phase("Writing output", Some(&output.display().to_string()));
    write_records(&output, &outcome.records)?;

    let summary = ProcessingSummary::from_records(
        &outcome.records,
        config.similarity_floor,
        Some(&outcome.cache_stats),
    );
    info!(
        "Summary: {} rows ({} duplicates), {} at or above {}%, {} staging matches, avg similarity {:.2}%",
        summary.total_rows,
        summary.duplicate_rows,
        summary.rows_at_or_above_floor,
        config.similarity_floor,
        summary.staging_matches,
        summary.average_similarity()
    );
    if let Some(path) = summary_path {
        write_report(&path, &summary)?;
        info!("Wrote processing summary to {}", path.display());
    }

    if progress_config.should_show_memory() {
        let final_memory_mb = get_memory_usage().await;
        info!("Final memory usage: {} MB", final_memory_mb);
    }
    let cache_stats = if progress_config.should_show_cache_stats() {
        Some(&outcome.cache_stats)
    } else {
        None
    };
    log_pipeline_completion(
        &run_id,
        start.elapsed(),
        outcome.records.len(),
        outcome.cancelled,
        cache_stats,
    );
    Ok(())
}

fn load_index(store: &JsonFileStore, client: &str) -> Result<CatalogIndex> {
    store
        .load_catalog(client)?
        .into_index()
        .with_context(|| format!("Failed to build catalog index for client {}", client))
}

fn run_reprocess(
    store: &JsonFileStore,
    client: &str,
    input: PathBuf,
    output: PathBuf,
    apply_actions: bool,
) -> Result<()> {
    let records = load_records(&input)
        .with_context(|| format!("Failed to load records from {}", input.display()))?;
    let mut rules = store.load_rule_set(client)?;
    let starting_version = rules.version;
    let index = load_index(store, client)?;
    let pipeline = MatchingPipeline::new(MatchingConfig::from_env());

    log_pipeline_phase("Reprocessing", Some(&format!("{} records", records.len())));
    let mut updated = Vec::with_capacity(records.len());
    for record in &records {
        if apply_actions {
            let (new_record, new_rules) = pipeline.reprocess_row_with_action(record, &rules, &index)?;
            rules = new_rules;
            updated.push(new_record);
        } else {
            updated.push(pipeline.reprocess_row(record, &rules, &index));
        }
    }

    if rules.version != starting_version {
        store.save_client_rules(client, &rules)?;
    }
    write_records(&output, &updated)
}

fn run_stage(
    store: &JsonFileStore,
    client: &str,
    categoria: &str,
    variedad: &str,
    color: &str,
    grado: &str,
) -> Result<()> {
    let entry = CatalogEntry::staging(categoria, variedad, color, grado);
    if entry.search_key.is_empty() {
        anyhow::bail!("Staging product needs at least one non-empty attribute");
    }
    let index = load_index(store, client)?;
    if let Some(existing) = index.entries_with_search_key(&entry.search_key).next() {
        warn!(
            "'{}' already in the {} catalog as {}",
            entry.search_key,
            existing.origin.as_str(),
            existing.catalog_id
        );
    }

    let extended = index.with_staging_entry(entry)?;
    store.save_catalog(client, &CatalogSnapshot::from_index(&extended))?;
    info!(
        "Catalog for {} now at source version {:?} with {} staging products",
        client,
        extended.source_version(),
        extended.staging_count()
    );
    Ok(())
}
