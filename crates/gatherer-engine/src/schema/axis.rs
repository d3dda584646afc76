//! Row and column orientation strategies.
//!
//! Both strategies address a grid through (`line`, `pos`) coordinates: a
//! *line* is one record (or the header), a *pos* is a property slot within
//! it. For the row axis a line is a row; for the column axis a line is a
//! column. All indices here are 0-based.

use gatherer_types::{CellValue, DataAxis, DatasetConfig, Grid};

/// Maps record-oriented coordinates onto a row-major grid.
pub trait AxisStrategy: Send + Sync {
    fn axis(&self) -> DataAxis;

    /// Grid (`row`, `col`) of (`line`, `pos`).
    fn cell(&self, line: usize, pos: usize) -> (usize, usize);

    /// Leading lines that belong to the header region.
    fn line_skip(&self, config: &DatasetConfig) -> usize;

    /// Leading positions that hold labels rather than values.
    fn pos_skip(&self, config: &DatasetConfig) -> usize;

    /// Number of lines present in `grid`.
    fn line_count(&self, grid: &Grid) -> usize;

    /// Number of positions present in `grid`.
    fn pos_count(&self, grid: &Grid) -> usize;

    /// Turn line-major values into a row-major grid.
    fn orient(&self, lines: Grid) -> Grid;

    fn value<'g>(&self, grid: &'g Grid, line: usize, pos: usize) -> &'g CellValue {
        let (row, col) = self.cell(line, pos);
        CellValue::at(grid, row, col)
    }
}

fn widest(grid: &Grid) -> usize {
    grid.iter().map(Vec::len).max().unwrap_or(0)
}

/// One record per row, header in a row.
pub struct RowAxis;

impl AxisStrategy for RowAxis {
    fn axis(&self) -> DataAxis {
        DataAxis::Row
    }

    fn cell(&self, line: usize, pos: usize) -> (usize, usize) {
        (line, pos)
    }

    fn line_skip(&self, config: &DatasetConfig) -> usize {
        config.skip_rows
    }

    fn pos_skip(&self, config: &DatasetConfig) -> usize {
        config.skip_columns
    }

    fn line_count(&self, grid: &Grid) -> usize {
        grid.len()
    }

    fn pos_count(&self, grid: &Grid) -> usize {
        widest(grid)
    }

    fn orient(&self, lines: Grid) -> Grid {
        lines
    }
}

/// One record per column, header in a column.
pub struct ColumnAxis;

impl AxisStrategy for ColumnAxis {
    fn axis(&self) -> DataAxis {
        DataAxis::Column
    }

    fn cell(&self, line: usize, pos: usize) -> (usize, usize) {
        (pos, line)
    }

    fn line_skip(&self, config: &DatasetConfig) -> usize {
        config.skip_columns
    }

    fn pos_skip(&self, config: &DatasetConfig) -> usize {
        config.skip_rows
    }

    fn line_count(&self, grid: &Grid) -> usize {
        widest(grid)
    }

    fn pos_count(&self, grid: &Grid) -> usize {
        grid.len()
    }

    fn orient(&self, lines: Grid) -> Grid {
        let height = widest(&lines);
        (0..height)
            .map(|pos| {
                lines
                    .iter()
                    .map(|line| line.get(pos).cloned().unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

/// Strategy for `axis`.
pub fn strategy(axis: DataAxis) -> &'static dyn AxisStrategy {
    match axis {
        DataAxis::Row => &RowAxis,
        DataAxis::Column => &ColumnAxis,
    }
}
