//! Record filters.
//!
//! A filter expression is `name` (property is truthy), `!name` (property is
//! falsy) or `name=value` (displayed value equals `value`). A run keeps the
//! records that satisfy every filter.

use std::fmt;
use std::str::FromStr;

use gatherer_types::Record;

use crate::errors::PipelineError;
use crate::schema::Header;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Truthy(String),
    Falsy(String),
    Equals { property: String, value: String },
}

impl Filter {
    pub fn property(&self) -> &str {
        match self {
            Self::Truthy(p) | Self::Falsy(p) | Self::Equals { property: p, .. } => p,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Truthy(p) => record.value(p).is_truthy(),
            Self::Falsy(p) => !record.value(p).is_truthy(),
            Self::Equals { property, value } => record.value(property).to_string().trim() == value.as_str(),
        }
    }
}

impl FromStr for Filter {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let filter = if let Some((property, value)) = s.split_once('=') {
            Self::Equals {
                property: property.trim().to_string(),
                value: value.trim().to_string(),
            }
        } else if let Some(property) = s.strip_prefix('!') {
            Self::Falsy(property.trim().to_string())
        } else {
            Self::Truthy(s.to_string())
        };
        if filter.property().is_empty() {
            return Err(PipelineError::config(format!(
                "invalid filter '{s}': missing property name"
            )));
        }
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truthy(p) => f.write_str(p),
            Self::Falsy(p) => write!(f, "!{p}"),
            Self::Equals { property, value } => write!(f, "{property}={value}"),
        }
    }
}

/// Conjunction of filters. An empty set keeps every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet(Vec<Filter>);

impl FilterSet {
    /// Parse filter expressions.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an expression without a
    /// property name.
    pub fn parse<S: AsRef<str>>(expressions: &[S]) -> Result<Self, PipelineError> {
        expressions
            .iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Reject filters that name properties the source header lacks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the unknown properties.
    pub fn check_properties(&self, header: &Header) -> Result<(), PipelineError> {
        let unknown: Vec<&str> = self
            .0
            .iter()
            .map(Filter::property)
            .filter(|p| !header.contains(p))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::config(format!(
                "filter references unknown propert{}: {}",
                if unknown.len() == 1 { "y" } else { "ies" },
                unknown.join(", ")
            )))
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|f| f.matches(record))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter()
    }
}
