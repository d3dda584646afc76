//! Schema mapping between raw dataset grids and ordered records.
//!
//! The header is the line at `propertyLookupRow` (1-based) in the header
//! region. Records start after `skipRows`/`skipColumns` and extraction
//! stops at the first fully blank record. [`to_patch`] is the structural
//! inverse used for appends.

pub mod axis;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gatherer_types::{CellValue, DatasetConfig, DatasetId, Grid, Record};

use crate::errors::PipelineError;
pub use axis::{strategy, AxisStrategy, ColumnAxis, RowAxis};

/// Property names of a dataset and where they sit along the header line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<(String, usize)>,
}

impl Header {
    /// Read the header line, skipping blank slots. May return an empty
    /// header when the line is absent or blank.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for a zero `propertyLookupRow` or
    /// duplicate property names.
    pub fn scan(
        dataset: &DatasetId,
        grid: &Grid,
        config: &DatasetConfig,
    ) -> Result<Self, PipelineError> {
        let Some(lookup) = config.property_lookup_row.checked_sub(1) else {
            return Err(PipelineError::config(format!(
                "dataset '{dataset}': propertyLookupRow must be >= 1"
            )));
        };
        let s = strategy(config.data_axis);
        let mut entries: Vec<(String, usize)> = Vec::new();
        for pos in s.pos_skip(config)..s.pos_count(grid) {
            let cell = s.value(grid, lookup, pos);
            if cell.is_blank() {
                continue;
            }
            let name = cell.to_string().trim().to_string();
            if entries.iter().any(|(existing, _)| *existing == name) {
                return Err(PipelineError::config(format!(
                    "dataset '{dataset}': duplicate property name '{name}'"
                )));
            }
            entries.push((name, pos));
        }
        Ok(Self { entries })
    }

    /// Like [`Header::scan`] but an empty header is an error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SchemaMismatch`] when no property names are
    /// found, plus everything [`Header::scan`] returns.
    pub fn read(
        dataset: &DatasetId,
        grid: &Grid,
        config: &DatasetConfig,
    ) -> Result<Self, PipelineError> {
        let header = Self::scan(dataset, grid, config)?;
        if header.is_empty() {
            return Err(PipelineError::schema(
                dataset,
                format!(
                    "header absent at {} {}",
                    config.data_axis, config.property_lookup_row
                ),
            ));
        }
        Ok(header)
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, pos)| *pos)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First free position after the last property.
    pub fn next_position(&self, config: &DatasetConfig) -> usize {
        let s = strategy(config.data_axis);
        self.entries
            .iter()
            .map(|(_, pos)| pos + 1)
            .max()
            .unwrap_or_else(|| s.pos_skip(config))
    }

    fn span(&self) -> Option<(usize, usize)> {
        let first = self.entries.iter().map(|(_, pos)| *pos).min()?;
        let last = self.entries.iter().map(|(_, pos)| *pos).max()?;
        Some((first, last))
    }
}

/// A block of cells to write, anchored at a 1-based (`start_row`, `start_col`).
#[derive(Debug, Clone, PartialEq)]
pub struct CellPatch {
    pub start_row: usize,
    pub start_col: usize,
    pub values: Grid,
}

impl CellPatch {
    /// Paste the patch into a local grid copy, growing it as needed.
    pub fn apply(&self, grid: &mut Grid) {
        let row0 = self.start_row.saturating_sub(1);
        let col0 = self.start_col.saturating_sub(1);
        if grid.len() < row0 + self.values.len() {
            grid.resize_with(row0 + self.values.len(), Vec::new);
        }
        for (offset, source) in self.values.iter().enumerate() {
            let target = &mut grid[row0 + offset];
            if target.len() < col0 + source.len() {
                target.resize(col0 + source.len(), CellValue::Empty);
            }
            target[col0..col0 + source.len()].clone_from_slice(source);
        }
    }
}

/// Extract the ordered records of a dataset.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaMismatch`] if the header is absent and
/// [`PipelineError::Config`] for duplicate property names.
pub fn to_records(
    dataset: &DatasetId,
    grid: &Grid,
    config: &DatasetConfig,
) -> Result<Vec<Record>, PipelineError> {
    let header = Header::read(dataset, grid, config)?;
    Ok(records_with_header(&header, grid, config))
}

/// Extract records using an already-read header.
pub fn records_with_header(header: &Header, grid: &Grid, config: &DatasetConfig) -> Vec<Record> {
    let s = strategy(config.data_axis);
    let mut records = Vec::new();
    for line in s.line_skip(config)..s.line_count(grid) {
        let record: Record = header
            .entries
            .iter()
            .map(|(name, pos)| (name.clone(), s.value(grid, line, *pos).clone()))
            .collect();
        if record.is_blank() {
            break;
        }
        records.push(record);
    }
    records
}

/// First line after the last populated record line. Only value positions
/// are considered, so labels in the skipped region do not count.
pub fn next_free_line(grid: &Grid, config: &DatasetConfig) -> usize {
    let s = strategy(config.data_axis);
    let first = s.line_skip(config);
    let positions = s.pos_skip(config)..s.pos_count(grid);
    (first..s.line_count(grid))
        .rev()
        .find(|line| {
            positions
                .clone()
                .any(|pos| !s.value(grid, *line, pos).is_blank())
        })
        .map_or(first, |line| line + 1)
}

/// Build the cells that append `records` after the last populated record
/// of `existing`. Properties missing from the header are dropped; header
/// properties missing from a record are written blank.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaMismatch`] if the header is empty or a
/// record shares no property with it.
pub fn to_patch(
    dataset: &DatasetId,
    records: &[Record],
    header: &Header,
    config: &DatasetConfig,
    existing: &Grid,
) -> Result<CellPatch, PipelineError> {
    let Some((first, last)) = header.span() else {
        return Err(PipelineError::schema(dataset, "destination header is empty"));
    };

    let width = last - first + 1;
    let mut lines: Grid = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if !record.property_names().any(|p| header.contains(p)) {
            return Err(PipelineError::schema(
                dataset,
                format!("record {i} shares no property with the destination header"),
            ));
        }
        let mut line = vec![CellValue::Empty; width];
        for (name, pos) in &header.entries {
            line[pos - first] = record.value(name);
        }
        lines.push(line);
    }

    let s = strategy(config.data_axis);
    let (row, col) = s.cell(next_free_line(existing, config), first);
    Ok(CellPatch {
        start_row: row + 1,
        start_col: col + 1,
        values: s.orient(lines),
    })
}

/// Caches destination headers so each destination's header is read once.
#[derive(Debug, Default)]
pub struct SchemaMapper {
    headers: Mutex<HashMap<DatasetId, Arc<Header>>>,
}

impl SchemaMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header of `dataset`, read from `grid` on first use.
    ///
    /// # Errors
    ///
    /// Propagates [`Header::read`] errors; a poisoned cache lock is an
    /// infrastructure error.
    pub fn destination_header(
        &self,
        dataset: &DatasetId,
        grid: &Grid,
        config: &DatasetConfig,
    ) -> Result<Arc<Header>, PipelineError> {
        let mut headers = self
            .headers
            .lock()
            .map_err(|_| anyhow::anyhow!("schema header cache lock poisoned"))?;
        if let Some(header) = headers.get(dataset) {
            return Ok(Arc::clone(header));
        }
        let header = Arc::new(Header::read(dataset, grid, config)?);
        tracing::debug!(dataset = %dataset, properties = header.len(), "Cached destination header");
        headers.insert(dataset.clone(), Arc::clone(&header));
        Ok(header)
    }

    /// Drop a cached header, e.g. after the destination layout changed.
    pub fn invalidate(&self, dataset: &DatasetId) {
        if let Ok(mut headers) = self.headers.lock() {
            headers.remove(dataset);
        }
    }

    pub fn is_cached(&self, dataset: &DatasetId) -> bool {
        self.headers
            .lock()
            .map(|headers| headers.contains_key(dataset))
            .unwrap_or(false)
    }
}
