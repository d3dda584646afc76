//! Dataset identity and layout configuration.

use serde::{Deserialize, Serialize};

/// Opaque dataset identifier (e.g. `"Sources-1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Create a new dataset identifier.
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

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for DatasetId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Which grid axis carries one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataAxis {
    /// Each data row is a record; the header is a row.
    Row,
    /// Each data column is a record; the header is a column.
    Column,
}

impl std::fmt::Display for DataAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Row => "row",
            Self::Column => "column",
        })
    }
}

/// Layout of one dataset.
///
/// `property_lookup_row` is 1-based and counts along the axis opposite to
/// `data_axis`: a row number for [`DataAxis::Row`], a column number for
/// [`DataAxis::Column`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetConfig {
    pub data_axis: DataAxis,
    pub property_lookup_row: usize,
    #[serde(default)]
    pub skip_rows: usize,
    #[serde(default)]
    pub skip_columns: usize,
}

impl DatasetConfig {
    /// Number of header lines skipped along the record axis.
    #[must_use]
    pub fn header_span(&self) -> usize {
        match self.data_axis {
            DataAxis::Row => self.skip_rows,
            DataAxis::Column => self.skip_columns,
        }
    }

    /// Whether the property lookup line sits inside the skipped header region.
    #[must_use]
    pub fn lookup_within_header(&self) -> bool {
        self.property_lookup_row >= 1 && self.property_lookup_row <= self.header_span()
    }
}
