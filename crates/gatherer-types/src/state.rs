//! Run status and trigger ledger model types.

use serde::{Deserialize, Serialize};

/// Opaque identifier handed out by a trigger scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(String);

impl TriggerId {
    /// Create a new trigger identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for TriggerId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Outcome status written alongside each run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Retrieved,
    Error,
    Pending,
}

impl RunStatus {
    /// Cell text for the status property.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retrieved => "Retrieved",
            Self::Error => "Error",
            Self::Pending => "Pending",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
