//! Semantic validation for parsed gatherer configuration values.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use gatherer_types::{DataAxis, DatasetConfig};

use crate::config::types::{GathererConfig, HelperSettings};

fn validate_tab(name: &str, tab: &DatasetConfig, errors: &mut Vec<String>) {
    if tab.property_lookup_row == 0 {
        errors.push(format!("Tab '{name}': propertyLookupRow is 1-based and must be >= 1"));
        return;
    }
    if !tab.lookup_within_header() {
        let (field, span) = match tab.data_axis {
            DataAxis::Row => ("skipRows", tab.skip_rows),
            DataAxis::Column => ("skipColumns", tab.skip_columns),
        };
        errors.push(format!(
            "Tab '{name}': propertyLookupRow {} must lie within the skipped header ({field} = {span})",
            tab.property_lookup_row
        ));
    }
}

fn validate_helper_settings(settings: &HelperSettings, helper: &str, errors: &mut Vec<String>) {
    if settings.tab(&settings.system_tab_id).is_none() {
        errors.push(format!(
            "{helper}.systemTabId '{}' has no entry in {helper}.tabs",
            settings.system_tab_id
        ));
    }
    if let Some(ref env_tab) = settings.env_vars_tab_id {
        if settings.tab(env_tab).is_none() {
            errors.push(format!(
                "{helper}.envVarsTabId '{env_tab}' has no entry in {helper}.tabs"
            ));
        }
    }
    for (name, tab) in &settings.tabs {
        validate_tab(name.as_str(), tab, errors);
    }
}

/// Validate a parsed configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// Helper and extension identifiers are only checked for shape here;
/// resolving them to implementations happens at engine construction.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &GathererConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.helper.trim().is_empty() {
        errors.push("helper must not be empty".to_string());
    }

    if config.batch_update_buffer == 0 {
        errors.push("batchUpdateBuffer must be at least 1".to_string());
    }

    if config.fetch_concurrency == 0 {
        errors.push("fetchConcurrency must be at least 1".to_string());
    }

    if config.fetch_timeout_ms == Some(0) {
        errors.push("fetchTimeoutMs must be > 0".to_string());
    }

    let mut seen = BTreeSet::new();
    for (i, ext) in config.extensions.iter().enumerate() {
        if ext.trim().is_empty() {
            errors.push(format!("Extension {i} has an empty name"));
        } else if !seen.insert(ext.as_str()) {
            errors.push(format!("Extension '{ext}' is listed more than once"));
        }
    }

    for (field, value) in [
        ("statusProperty", &config.status_property),
        ("errorProperty", &config.error_property),
        ("urlProperty", &config.url_property),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("{field} must not be empty"));
        }
    }
    if config.status_property == config.error_property {
        errors.push(format!(
            "statusProperty and errorProperty must differ (both '{}')",
            config.status_property
        ));
    }

    if !config.helper.trim().is_empty() {
        match config.helper_settings() {
            Some(settings) => validate_helper_settings(settings, &config.helper, &mut errors),
            None => errors.push(format!(
                "Missing settings block '{}' for the configured helper",
                config.helper
            )),
        }
    }

    if !errors.is_empty() {
        bail!(
            "Config validation failed:\n  - {}",
            errors.join("\n  - ")
        );
    }

    Ok(())
}
