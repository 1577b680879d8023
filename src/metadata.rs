use std::collections::HashMap;
use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};

use crate::domain::Row;
use crate::error::HarvestError;

/// Rows above the data block hold the title, instructions and column headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    pub header_row: usize,
    pub first_data_row: usize,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            header_row: 6,
            first_data_row: 7,
        }
    }
}

pub trait MetadataSource: Send + Sync {
    /// All data rows of one sheet, in sheet order. Either the whole sheet is read or an error
    /// is returned.
    fn rows(&self, sheet_index: usize, path: &Path) -> Result<Vec<Row>, HarvestError>;
}

#[derive(Debug, Clone, Default)]
pub struct XlsxMetadataSource {
    layout: SheetLayout,
}

impl XlsxMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataSource for XlsxMetadataSource {
    fn rows(&self, sheet_index: usize, path: &Path) -> Result<Vec<Row>, HarvestError> {
        let mut workbook = open_workbook_auto(path).map_err(|err| {
            HarvestError::SourceUnavailable(format!("open {}: {err}", path.display()))
        })?;
        let range = workbook
            .worksheet_range_at(sheet_index)
            .ok_or_else(|| {
                HarvestError::SourceUnavailable(format!(
                    "sheet {sheet_index} missing in {}",
                    path.display()
                ))
            })?
            .map_err(|err| {
                HarvestError::SourceUnavailable(format!("read sheet {sheet_index}: {err}"))
            })?;

        rows_from_grid(&absolute_grid(&range), self.layout).map_err(|message| {
            HarvestError::SourceUnavailable(format!("sheet {sheet_index}: {message}"))
        })
    }
}

/// Cell grid indexed by absolute sheet coordinates. calamine ranges start at the first used
/// cell, so leading empty rows and columns are padded back in.
fn absolute_grid(range: &Range<Data>) -> Vec<Vec<String>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let mut grid = vec![Vec::new(); start_row as usize];
    for cells in range.rows() {
        let mut row = vec![String::new(); start_col as usize];
        row.extend(cells.iter().map(cell_to_string));
        grid.push(row);
    }
    grid
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
            value.trim().to_string()
        }
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            (*value as i64).to_string()
        }
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        other => other.to_string(),
    }
}

/// Zips the header row with every data row. Fully blank rows are dropped.
pub fn rows_from_grid(grid: &[Vec<String>], layout: SheetLayout) -> Result<Vec<Row>, String> {
    let header = grid
        .get(layout.header_row)
        .ok_or_else(|| format!("header row {} missing", layout.header_row))?;
    if header.iter().all(|cell| cell.trim().is_empty()) {
        return Err(format!("header row {} is empty", layout.header_row));
    }

    let rows = grid
        .iter()
        .enumerate()
        .skip(layout.first_data_row)
        .map(|(index, cells)| {
            let mapped = header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.trim().is_empty())
                .map(|(col, name)| {
                    let value = cells.get(col).cloned().unwrap_or_default();
                    (name.trim().to_string(), value)
                })
                .collect::<HashMap<_, _>>();
            Row::new(index, mapped)
        })
        .filter(|row| !row.is_blank())
        .collect();
    Ok(rows)
}
