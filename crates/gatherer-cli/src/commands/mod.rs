pub mod check;
pub mod records;

use std::path::Path;

use anyhow::{Context, Result};
use gatherer_engine::config::parser;
use gatherer_engine::config::types::GathererConfig;

use crate::logging;

/// Parse the config and start logging at the explicit level, or at the one
/// its flags imply.
fn load_config(config_path: &Path, log_level: Option<&str>) -> Result<GathererConfig> {
    let config = parser::parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    logging::init(log_level.unwrap_or(config.log_level().as_str()));
    Ok(config)
}
