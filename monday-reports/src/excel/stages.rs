//! Transform stages
//!
//! Each stage takes the workbook model and mutates it in place. Stages are
//! independent; the pipeline in `mod.rs` decides ordering and how far to run
//! after a failure.

use chrono::NaiveDate;
use log::{info, warn};

use super::model::{Cell, Sheet, TableSpan, WorkbookModel};
use super::{DATA_SHEET_NAME, DEFAULT_SHEET_NAME, TransformError};

/// Headers whose columns get normalized to the short-date format.
pub const DATE_COLUMN_HEADERS: &[&str] = &[
    "E-Sign Signed Date",
    "Lead Created Date",
    "Date of Birth",
];

/// Widest a column is allowed to grow when sized from content.
pub const MAX_COLUMN_WIDTH: f64 = 50.0;

/// Size every column to its longest displayed value plus padding, capped at
/// [`MAX_COLUMN_WIDTH`].
pub fn fix_column_widths(sheet: &mut Sheet) {
    let columns = sheet.column_count();
    for col in 0..columns {
        let longest = sheet
            .rows
            .iter()
            .filter_map(|row| row.get(col))
            .map(Cell::display_len)
            .max()
            .unwrap_or(0);
        // An all-empty column keeps whatever width it already had.
        if longest == 0 {
            continue;
        }
        let width = ((longest + 2) as f64).min(MAX_COLUMN_WIDTH);
        sheet.column_widths.insert(col as u16, width);
    }
    sheet.autofit = false;
}

/// Rewrite the known date columns so every value displays as mm/dd/yyyy.
/// Values that cannot be read as a date become empty cells.
pub fn normalize_date_columns(sheet: &mut Sheet) {
    let header_count = sheet.rows.first().map(Vec::len).unwrap_or(0);
    let targets: Vec<usize> = DATE_COLUMN_HEADERS
        .iter()
        .filter_map(|name| sheet.header_index(name))
        .collect();
    if targets.is_empty() || header_count == 0 {
        return;
    }

    for col in &targets {
        sheet.date_columns.insert(*col as u16);
    }

    for row in sheet.rows.iter_mut().skip(1) {
        for &col in &targets {
            let Some(cell) = row.get_mut(col) else { continue };
            let replacement = match cell {
                Cell::Empty | Cell::Date(_) => continue,
                Cell::Text(text) => parse_loose_date(text).map(Cell::Date),
                Cell::Number(serial) => {
                    super::model::excel_serial_to_date(*serial).map(Cell::Date)
                }
                Cell::Bool(_) => None,
            };
            *cell = replacement.unwrap_or(Cell::Empty);
        }
    }
}

/// Accepts the date shapes that show up in exported reports. Time-of-day
/// suffixes are ignored.
pub fn parse_loose_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let date_part = trimmed.split_whitespace().next().unwrap_or(trimmed);
    let formats = ["%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d", "%m-%d-%Y", "%d-%b-%Y"];
    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").ok()
}

/// Annotate the sheet's used range as a banded table. Empty sheets and
/// header-only sheets are left alone.
pub fn add_data_table(sheet: &mut Sheet) {
    if sheet.rows.len() < 2 {
        info!("Sheet '{}' has no data rows, skipping table", sheet.name);
        return;
    }
    let last_row = (sheet.rows.len() - 1) as u32;
    let last_col = (sheet.column_count() - 1) as u16;
    sheet.table = Some(TableSpan {
        name: "Table1".to_string(),
        last_row,
        last_col,
    });
}

/// Rename the default export sheet to its report name. Missing source sheet
/// is a logged no-op, not an error.
pub fn rename_data_sheet(model: &mut WorkbookModel) {
    match model.sheet_mut(DEFAULT_SHEET_NAME) {
        Some(sheet) => {
            sheet.name = DATA_SHEET_NAME.to_string();
            info!("Renamed '{}' to '{}'", DEFAULT_SHEET_NAME, DATA_SHEET_NAME);
        }
        None => {
            info!(
                "No '{}' sheet found, leaving sheet names as-is",
                DEFAULT_SHEET_NAME
            );
        }
    }
}

/// Build one count-by-Status summary sheet per requested name. The data
/// sheet must carry a Status column; without one the report cannot be
/// summarized and the stage fails.
pub fn build_status_summaries(
    model: &mut WorkbookModel,
    sheet_names: &[String],
) -> Result<(), TransformError> {
    if sheet_names.is_empty() {
        return Ok(());
    }

    let data = model
        .sheet(DATA_SHEET_NAME)
        .or_else(|| model.sheets.first())
        .ok_or_else(|| TransformError::SheetNotFound(DATA_SHEET_NAME.to_string()))?;
    let status_col = data
        .header_index("Status")
        .ok_or(TransformError::MissingStatusColumn)?;

    let mut counts: Vec<(String, usize)> = Vec::new();
    for row in data.rows.iter().skip(1) {
        let value = row
            .get(status_col)
            .map(Cell::display_string)
            .unwrap_or_default();
        if value.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(status, _)| *status == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }
    counts.sort_by(|a, b| a.0.cmp(&b.0));
    let total: usize = counts.iter().map(|(_, n)| n).sum();

    for name in sheet_names {
        let mut sheet = Sheet::new(name.clone());
        sheet.rows.push(vec![
            Cell::Text("Row Labels".to_string()),
            Cell::Text("Count of Status".to_string()),
        ]);
        for (status, count) in &counts {
            sheet.rows.push(vec![
                Cell::Text(status.clone()),
                Cell::Number(*count as f64),
            ]);
        }
        sheet.rows.push(vec![
            Cell::Text("Grand Total".to_string()),
            Cell::Number(total as f64),
        ]);
        sheet.autofit = true;

        // Rebuilding an existing summary replaces it in place.
        match model.sheet_position(name) {
            Some(pos) => {
                warn!("Summary sheet '{}' already exists, replacing it", name);
                model.sheets[pos] = sheet;
            }
            None => model.sheets.push(sheet),
        }
    }

    Ok(())
}

/// Put the data sheet first, summaries after in their configured order, and
/// make the data sheet the one open on load.
pub fn reorder_sheets(model: &mut WorkbookModel, summary_order: &[String]) {
    let mut ordered: Vec<Sheet> = Vec::with_capacity(model.sheets.len());
    let mut remaining = std::mem::take(&mut model.sheets);

    if let Some(pos) = remaining.iter().position(|s| s.name == DATA_SHEET_NAME) {
        ordered.push(remaining.remove(pos));
    }
    for name in summary_order {
        if let Some(pos) = remaining.iter().position(|s| &s.name == name) {
            ordered.push(remaining.remove(pos));
        }
    }
    ordered.append(&mut remaining);

    model.sheets = ordered;
    model.active = 0;
}
