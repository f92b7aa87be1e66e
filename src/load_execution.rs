use anyhow::{Context, Result};
use chrono::Utc;
use csv::StringRecord;
use tracing::{debug, error, info};

use crate::data_loader;
use crate::inventory::{self, HistoricalEvent};
use crate::plan::LoadPlan;
use crate::report;
use crate::storage::{self, HistoryStore, MongoHistoryStore, MongoProductStore, ProductStore};

/// Loads a data file from disk, supporting CSV and TSV formats
fn load_file(file_path: &str) -> Result<(Vec<String>, Vec<StringRecord>)> {
    let extension = std::path::Path::new(file_path)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("");

    let separator = match extension {
        "csv" => b',',
        "tsv" => b'\t',
        _ => {
            error!("Error: unsupported extension {}", extension);
            anyhow::bail!("Unsupported extension");
        }
    };

    let headers = data_loader::get_headers_from_file(file_path, separator)?;
    let records = match extension {
        "csv" => data_loader::load_csv(file_path),
        "tsv" => data_loader::load_tsv(file_path),
        _ => unreachable!(), // We already checked extension above
    }?;

    debug!(
        "Loaded {} records with headers: {:?}",
        records.len(),
        headers
    );
    Ok((headers, records))
}

/// Executes the full load: read, transform, batched insert, aggregate,
/// upsert, report. One forward pass with no retry loop.
pub async fn execute_load(plan: &LoadPlan) -> Result<()> {
    info!("Reading {}", plan.input);
    let (headers, records) = load_file(&plan.input)?;
    info!("Read {} rows", records.len());

    let profile = data_loader::create_inventory_load_profile(&headers)?;
    info!("{}", profile);

    info!("Preparing historical data");
    let mut events = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        // Line numbers are 1-based and the header occupies the first line
        let event = HistoricalEvent::from_row(record, &profile)
            .with_context(|| format!("Error transforming row at line {}", i + 2))?;
        events.push(event);
    }

    let client = storage::connect(&plan.uri).await?;
    let history = MongoHistoryStore::new(&client, &plan.database).await?;
    let products = MongoProductStore::new(&client, &plan.database).await?;

    info!("Inserting historical data");
    insert_history(&events, &history, plan.batch_size).await?;

    info!("Creating products");
    let rollups = inventory::group_products(&records, &profile)?;
    let last_updated = Utc::now();
    for rollup in &rollups {
        products.upsert(rollup, last_updated).await?;
    }
    info!("Created/updated {} products", rollups.len());

    report::print_summary(&history, &products).await?;

    Ok(())
}

/// Connects to storage and prints the verification summary without loading
/// anything.
pub async fn execute_report(plan: &LoadPlan) -> Result<()> {
    let client = storage::connect(&plan.uri).await?;
    let history = MongoHistoryStore::new(&client, &plan.database).await?;
    let products = MongoProductStore::new(&client, &plan.database).await?;

    report::print_summary(&history, &products).await?;

    Ok(())
}

/// Writes events in contiguous chunks of at most `batch_size`, in input
/// order. Duplicate-key rejections within a chunk are ignored; a chunk that
/// fails for any other reason is logged and skipped, and the run continues
/// with the next chunk.
pub async fn insert_history(
    events: &[HistoricalEvent],
    store: &dyn HistoryStore,
    batch_size: usize,
) -> Result<()> {
    anyhow::ensure!(batch_size > 0, "Batch size must be positive");

    let total_batches = events.len().div_ceil(batch_size);
    for (i, chunk) in events.chunks(batch_size).enumerate() {
        match store.insert_batch(chunk).await {
            Ok(outcome) => {
                if outcome.duplicates > 0 {
                    debug!(
                        "Batch {}/{}: ignored {} duplicate-key rejections",
                        i + 1,
                        total_batches,
                        outcome.duplicates
                    );
                }
                info!("Inserted batch {}/{}", i + 1, total_batches);
            }
            Err(e) => {
                error!("Error inserting batch {}/{}: {}", i + 1, total_batches, e);
            }
        }
    }

    Ok(())
}
