//! Helper and extension resolution at engine construction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use gatherer_state::{TabularStore, TriggerScheduler};

use crate::config::types::{GathererConfig, HelperSettings};
use crate::connector::{ApiHandler, Connector, TabularConnector};
use crate::errors::PipelineError;
use crate::extension::{Extension, ExtensionRegistry};

/// Built-in primary connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperKind {
    Tabular,
}

impl HelperKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tabular => TabularConnector::ID,
        }
    }
}

impl FromStr for HelperKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            TabularConnector::ID => Ok(Self::Tabular),
            other => Err(PipelineError::config(format!("unknown helper '{other}'"))),
        }
    }
}

impl fmt::Display for HelperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host capabilities injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn TabularStore>,
    pub scheduler: Arc<dyn TriggerScheduler>,
    pub api: Arc<dyn ApiHandler>,
}

/// Concrete capabilities for one engine instance.
pub struct Resolved {
    pub connector: Arc<dyn Connector>,
    pub extensions: Vec<Arc<dyn Extension>>,
}

fn helper_settings(config: &GathererConfig) -> Result<&HelperSettings, PipelineError> {
    config.helper_settings().ok_or_else(|| {
        PipelineError::config(format!(
            "missing settings block '{}' for the configured helper",
            config.helper
        ))
    })
}

/// Check that the helper and every extension resolve, without building
/// anything.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] naming the unresolved identifiers.
pub fn check_capabilities(
    config: &GathererConfig,
    registry: &ExtensionRegistry,
) -> Result<HelperKind, PipelineError> {
    let kind: HelperKind = config.helper.parse()?;
    helper_settings(config)?;
    let missing: Vec<&str> = config
        .extensions
        .iter()
        .filter(|id| !registry.contains(id))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::config(format!(
            "unknown extension(s): {}",
            missing.join(", ")
        )));
    }
    Ok(kind)
}

/// Resolve the configured helper and extensions to implementations.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] for an unknown helper, a missing
/// settings block or an unresolved extension.
pub fn resolve(
    config: &GathererConfig,
    collaborators: Collaborators,
    registry: &ExtensionRegistry,
) -> Result<Resolved, PipelineError> {
    let kind: HelperKind = config.helper.parse()?;
    let settings = helper_settings(config)?.clone();
    let extensions = registry.resolve(&config.extensions, config)?;

    let connector: Arc<dyn Connector> = match kind {
        HelperKind::Tabular => Arc::new(TabularConnector::new(
            settings,
            collaborators.store,
            collaborators.scheduler,
            collaborators.api,
            config.fetch_timeout_ms.map(Duration::from_millis),
        )?),
    };

    tracing::debug!(
        helper = %kind,
        extensions = ?config.extensions,
        "Resolved capabilities"
    );
    Ok(Resolved {
        connector,
        extensions,
    })
}
