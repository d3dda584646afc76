//! Gatherer configuration types.

use std::collections::BTreeMap;

use gatherer_types::{DatasetConfig, DatasetId};
use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

const DEFAULT_FETCH_CONCURRENCY: usize = 4;

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

fn default_status_property() -> String {
    "status".to_string()
}

fn default_error_property() -> String {
    "error".to_string()
}

fn default_url_property() -> String {
    "url".to_string()
}

/// Top-level gatherer configuration.
///
/// Any key that is not a known field is read as a helper settings block,
/// so `tabular: { systemTabId: ..., tabs: ... }` sits next to `helper`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GathererConfig {
    /// Primary connector identifier (see `HelperKind`).
    pub helper: String,
    /// Ordered extension identifiers.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Records accumulated before one destination write.
    pub batch_update_buffer: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub quiet: bool,
    /// Maximum in-flight fetches per run.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Extra attempts for retryable fetch errors.
    #[serde(default)]
    pub fetch_retries: u32,
    /// Per-request timeout enforced by the connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
    /// Property receiving the run status text.
    #[serde(default = "default_status_property")]
    pub status_property: String,
    /// Property receiving the fetch error message.
    #[serde(default = "default_error_property")]
    pub error_property: String,
    /// Property holding the URL to fetch.
    #[serde(default = "default_url_property")]
    pub url_property: String,
    /// Per-helper settings blocks keyed by helper id.
    #[serde(flatten)]
    pub helpers: BTreeMap<String, HelperSettings>,
}

impl GathererConfig {
    /// Settings block for the configured helper.
    pub fn helper_settings(&self) -> Option<&HelperSettings> {
        self.helpers.get(&self.helper)
    }

    /// Log level implied by the `verbose`/`debug`/`quiet` flags.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_flags(self.verbose, self.debug, self.quiet)
    }
}

/// Dataset wiring for one helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperSettings {
    /// Dataset whose first record supplies request environment values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars_tab_id: Option<DatasetId>,
    /// Dataset holding the trigger ledger.
    pub system_tab_id: DatasetId,
    /// Layout of every dataset the helper may touch.
    #[serde(default)]
    pub tabs: BTreeMap<DatasetId, DatasetConfig>,
}

impl HelperSettings {
    /// Layout for `dataset`, if configured.
    pub fn tab(&self, dataset: &DatasetId) -> Option<&DatasetConfig> {
        self.tabs.get(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatherer_types::DataAxis;

    #[test]
    fn defaults_apply_to_optional_knobs() {
        let config: GathererConfig = serde_json::from_str(
            r#"{
                "helper": "tabular",
                "batchUpdateBuffer": 10,
                "tabular": {"systemTabId": "System"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.fetch_retries, 0);
        assert!(config.fetch_timeout_ms.is_none());
        assert_eq!(config.status_property, "status");
        assert_eq!(config.error_property, "error");
        assert_eq!(config.url_property, "url");
        assert!(config.extensions.is_empty());
        assert!(!config.quiet);
    }

    #[test]
    fn helper_block_is_flattened() {
        let config: GathererConfig = serde_json::from_str(
            r#"{
                "helper": "tabular",
                "extensions": ["timestamp"],
                "batchUpdateBuffer": 5,
                "tabular": {
                    "envVarsTabId": "Settings",
                    "systemTabId": "System",
                    "tabs": {
                        "Sources-1": {"dataAxis": "row", "propertyLookupRow": 2, "skipRows": 3}
                    }
                }
            }"#,
        )
        .unwrap();
        let settings = config.helper_settings().unwrap();
        assert_eq!(settings.system_tab_id.as_str(), "System");
        assert_eq!(settings.env_vars_tab_id.as_ref().unwrap().as_str(), "Settings");
        let tab = settings.tab(&DatasetId::new("Sources-1")).unwrap();
        assert_eq!(tab.data_axis, DataAxis::Row);
        assert_eq!(tab.skip_columns, 0);
        assert!(settings.tab(&DatasetId::new("Sources-9")).is_none());
    }

    #[test]
    fn log_level_follows_flags() {
        let mut config: GathererConfig = serde_json::from_str(
            r#"{"helper": "tabular", "batchUpdateBuffer": 1, "debug": true, "quiet": true}"#,
        )
        .unwrap();
        assert_eq!(config.log_level(), LogLevel::Error);
        config.quiet = false;
        assert_eq!(config.log_level(), LogLevel::Debug);
        config.debug = false;
        assert_eq!(config.log_level(), LogLevel::Warn);
        config.verbose = true;
        assert_eq!(config.log_level(), LogLevel::Info);
    }
}
