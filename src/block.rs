use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// The contents of one cell of a tabular measurement source
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Empty
        } else {
            trimmed
                .parse::<f64>()
                .map_or_else(|_| Self::Text(trimmed.to_owned()), Self::Number)
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Empty => Ok(()),
        }
    }
}

impl From<f64> for Cell {
    fn from(x: f64) -> Self {
        Self::Number(x)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_owned())
        }
    }
}

/// A rectangular window into a sheet
///
/// Rows and columns use 1-based spreadsheet coordinates and the window is half-open, so
/// `Window { row_start: 66, row_end: 69, col_start: 4, col_end: 14 }` selects three rows of ten
/// cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Window {
    pub const fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        Self {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    pub const fn rows(&self) -> usize {
        self.row_end.saturating_sub(self.row_start)
    }

    pub const fn columns(&self) -> usize {
        self.col_end.saturating_sub(self.col_start)
    }
}

/// An immutable block of measurement rows
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementBlock {
    rows: Vec<Vec<Cell>>,
}

impl MeasurementBlock {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a block of purely numeric rows
    pub fn from_numbers(rows: &[Vec<f64>]) -> Self {
        Self::new(
            rows.iter()
                .map(|row| row.iter().copied().map(Cell::Number).collect())
                .collect(),
        )
    }

    /// Extract a window from a headerless CSV source
    ///
    /// # Errors
    /// Returns [`Error::MissingCell`] if any cell of the window is absent from the source, or a
    /// CSV error if the source cannot be parsed.
    pub fn from_csv<R: Read>(reader: R, window: Window) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let records = rdr
            .records()
            .take(window.row_end.saturating_sub(1))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(window.rows());
        for row in window.row_start..window.row_end {
            let record = records
                .get(row.wrapping_sub(1))
                .ok_or(Error::MissingCell {
                    row,
                    column: window.col_start,
                })?;
            let cells = (window.col_start..window.col_end)
                .map(|column| {
                    record
                        .get(column.wrapping_sub(1))
                        .map(Cell::parse)
                        .ok_or(Error::MissingCell { row, column })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(cells);
        }

        tracing::debug!(
            rows = rows.len(),
            columns = window.columns(),
            "extracted measurement block"
        );
        Ok(Self::new(rows))
    }

    /// Extract a window from a CSV file on disk
    ///
    /// # Errors
    /// Fails if the file cannot be read, or as for [`MeasurementBlock::from_csv`].
    pub fn from_path(path: &Path, window: Window) -> Result<Self> {
        let file = fs::read(path)?;
        Self::from_csv(&file[..], window)
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The numeric value at a zero-based position within the block
    ///
    /// # Errors
    /// Returns [`Error::MissingCell`] when the position lies outside the block, and
    /// [`Error::NonNumericCell`] when the cell holds text or nothing.
    pub fn number(&self, row: usize, column: usize) -> Result<f64> {
        match self.rows.get(row).and_then(|cells| cells.get(column)) {
            Some(Cell::Number(x)) => Ok(*x),
            Some(other) => Err(Error::NonNumericCell {
                row,
                column,
                found: other.to_string(),
            }),
            None => Err(Error::MissingCell { row, column }),
        }
    }

    /// The numeric values of one column
    ///
    /// # Errors
    /// Fails if any row lacks a number in `column`.
    pub fn column(&self, column: usize) -> Result<Vec<f64>> {
        (0..self.rows.len())
            .map(|row| self.number(row, column))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::{Cell, MeasurementBlock, Window};
    use crate::error::Error;
    use crate::Result;

    const SHEET: &str = "\
title,,,
x,1.5,2.5,label
y,3.5,,4.5
";

    #[test]
    fn windows_are_one_based_and_half_open() -> Result<()> {
        let block = MeasurementBlock::from_csv(SHEET.as_bytes(), Window::new(2, 4, 2, 4))?;

        assert_eq!(block.len(), 2);
        assert_eq!(
            block.rows()[0],
            vec![Cell::Number(1.5), Cell::Number(2.5)]
        );
        assert_eq!(block.rows()[1], vec![Cell::Number(3.5), Cell::Empty]);
        Ok(())
    }

    #[test]
    fn text_and_empty_cells_are_kept() -> Result<()> {
        let block = MeasurementBlock::from_csv(SHEET.as_bytes(), Window::new(2, 4, 1, 5))?;

        assert_eq!(block.rows()[0][0], Cell::Text("x".to_owned()));
        assert_eq!(block.rows()[0][3], Cell::Text("label".to_owned()));
        assert!(matches!(
            block.number(1, 2),
            Err(Error::NonNumericCell { row: 1, column: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn absent_cells_are_errors() {
        let beyond_columns = MeasurementBlock::from_csv(SHEET.as_bytes(), Window::new(2, 3, 1, 6));
        assert!(matches!(
            beyond_columns,
            Err(Error::MissingCell { row: 2, column: 5 })
        ));

        let beyond_rows = MeasurementBlock::from_csv(SHEET.as_bytes(), Window::new(3, 6, 1, 2));
        assert!(matches!(
            beyond_rows,
            Err(Error::MissingCell { row: 4, .. })
        ));
    }

    #[test]
    fn columns_are_read_as_numbers() -> Result<()> {
        let block = MeasurementBlock::from_numbers(&[vec![1.0, 2.0], vec![3.0, 4.0]]);

        assert_eq!(block.column(1)?, vec![2.0, 4.0]);
        assert!(block.number(2, 0).is_err());
        Ok(())
    }
}
