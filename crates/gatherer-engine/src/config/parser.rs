//! Configuration parsing with environment variable substitution.
//!
//! YAML is the primary format; since YAML is a superset of JSON, JSON
//! configuration files parse through the same path.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::GathererConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        match std::env::var(&cap[1]) {
            Ok(val) => val,
            Err(_) => {
                missing.push(cap[1].to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a configuration string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the document is invalid.
pub fn parse_config_str(input: &str) -> Result<GathererConfig> {
    let substituted = substitute_env_vars(input)?;
    let config: GathererConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse gatherer config")?;
    Ok(config)
}

/// Parse a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its content is invalid.
pub fn parse_config(path: &Path) -> Result<GathererConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}
