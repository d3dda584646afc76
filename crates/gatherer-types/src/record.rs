//! Structured key/value view of one dataset row or column.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cell::CellValue;

/// Ordered mapping from property name to cell value.
///
/// Property order follows the dataset header the record was read from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, CellValue>);

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `property`, if present.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&CellValue> {
        self.0.get(property)
    }

    /// Value for `property`, reading absent properties as empty.
    #[must_use]
    pub fn value(&self, property: &str) -> CellValue {
        self.0.get(property).cloned().unwrap_or_default()
    }

    /// Insert or replace a property, keeping its original position if it
    /// already exists. Returns the previous value.
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<CellValue>) -> Option<CellValue> {
        self.0.insert(property.into(), value.into())
    }

    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.0.contains_key(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every value is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.values().all(CellValue::is_blank)
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<CellValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
