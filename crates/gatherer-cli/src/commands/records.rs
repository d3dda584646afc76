use std::path::Path;

use anyhow::{Context, Result};
use gatherer_engine::config::validator;
use gatherer_engine::schema;
use gatherer_state::{MemoryStore, TabularStore};
use gatherer_types::DatasetId;

/// Execute the `records` command: extract one dataset of a JSON workbook
/// and print its records as a JSON array.
pub async fn execute(
    config_path: &Path,
    workbook_path: &Path,
    dataset: &str,
    log_level: Option<&str>,
) -> Result<()> {
    let config = super::load_config(config_path, log_level)?;
    validator::validate_config(&config)?;

    let dataset = DatasetId::new(dataset);
    let tab = config
        .helper_settings()
        .and_then(|settings| settings.tab(&dataset))
        .with_context(|| format!("Dataset '{dataset}' has no entry in {}.tabs", config.helper))?;

    let store = MemoryStore::load_workbook(workbook_path)
        .with_context(|| format!("Failed to load workbook: {}", workbook_path.display()))?;
    let grid = store.read_range(&dataset).await?;
    let records = schema::to_records(&dataset, &grid, tab)?;

    tracing::info!(
        store = %store.store_id(),
        dataset = %dataset,
        records = records.len(),
        "Records extracted"
    );
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
