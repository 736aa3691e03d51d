//! In-memory workbook model
//!
//! The transform pipeline reads a workbook once with calamine, mutates this
//! model through its stages, and writes the result back with rust_xlsxwriter.
//! Formatting state (column widths, date formats, the data table, the active
//! sheet) lives here because calamine cannot round-trip it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Table, TableColumn, TableStyle, Workbook};

/// A single cell value, reduced to what the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// The value as it displays in a cell. Dates use the fixed short-date
    /// pattern, not the user's locale.
    pub fn display_string(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Cell::Bool(b) => b.to_string(),
            Cell::Date(d) => d.format("%m/%d/%Y").to_string(),
        }
    }

    pub fn display_len(&self) -> usize {
        self.display_string().chars().count()
    }
}

/// A banded table covering a sheet's used range from A1.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpan {
    pub name: String,
    pub last_row: u32,
    pub last_col: u16,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// Row-major cells; row 0 is the header row.
    pub rows: Vec<Vec<Cell>>,
    /// Explicit display widths set by the width-fix stage.
    pub column_widths: BTreeMap<u16, f64>,
    /// Columns rewritten to the short-date display format.
    pub date_columns: BTreeSet<u16>,
    pub table: Option<TableSpan>,
    /// Auto-fit columns on save (overrides explicit widths).
    pub autofit: bool,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Sheet {
        Sheet {
            name: name.into(),
            rows: Vec::new(),
            column_widths: BTreeMap::new(),
            date_columns: BTreeSet::new(),
            table: None,
            autofit: false,
        }
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Index of a header cell whose text equals `name` exactly.
    pub fn header_index(&self, name: &str) -> Option<usize> {
        self.rows.first()?.iter().position(|cell| {
            matches!(cell, Cell::Text(text) if text == name)
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkbookModel {
    pub sheets: Vec<Sheet>,
    /// Index of the sheet that is active and solely selected on save.
    pub active: usize,
}

impl WorkbookModel {
    pub fn load(path: &Path) -> Result<WorkbookModel> {
        let mut workbook: Xlsx<_> = open_workbook(path)
            .with_context(|| format!("Failed to open workbook: {}", path.display()))?;

        let sheet_names = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(sheet_names.len());
        for name in sheet_names {
            let range = workbook
                .worksheet_range(&name)
                .with_context(|| format!("Failed to read sheet: {}", name))?;
            let mut sheet = Sheet::new(&name);
            sheet.rows = range
                .rows()
                .map(|row| row.iter().map(convert_cell).collect())
                .collect();
            sheets.push(sheet);
        }

        Ok(WorkbookModel { sheets, active: 0 })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("mm/dd/yyyy");

        for (index, sheet) in self.sheets.iter().enumerate() {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (row_idx, row) in sheet.rows.iter().enumerate() {
                for (col_idx, cell) in row.iter().enumerate() {
                    let row = row_idx as u32;
                    let col = col_idx as u16;
                    match cell {
                        Cell::Empty => {}
                        Cell::Text(s) => {
                            worksheet.write_string(row, col, s)?;
                        }
                        Cell::Number(n) => {
                            worksheet.write_number(row, col, *n)?;
                        }
                        Cell::Bool(b) => {
                            worksheet.write_boolean(row, col, *b)?;
                        }
                        Cell::Date(d) => {
                            worksheet.write_datetime_with_format(row, col, d, &date_format)?;
                        }
                    }
                }
            }

            if let Some(span) = &sheet.table {
                let columns: Vec<TableColumn> = sheet
                    .rows
                    .first()
                    .map(|header| {
                        header
                            .iter()
                            .enumerate()
                            .map(|(i, cell)| {
                                let text = cell.display_string();
                                let header = if text.is_empty() {
                                    format!("Column{}", i + 1)
                                } else {
                                    text
                                };
                                TableColumn::new().set_header(header)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let table = Table::new()
                    .set_name(&span.name)
                    .set_style(TableStyle::Medium9)
                    .set_banded_rows(true)
                    .set_banded_columns(true)
                    .set_columns(&columns);
                worksheet.add_table(0, 0, span.last_row, span.last_col, &table)?;
            }

            for (col, width) in &sheet.column_widths {
                worksheet.set_column_width(*col, *width)?;
            }
            if sheet.autofit {
                worksheet.autofit();
            }
            if index == self.active {
                worksheet.set_active(true);
            }
        }

        workbook
            .save(path)
            .with_context(|| format!("Failed to save workbook: {}", path.display()))?;
        Ok(())
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) => NaiveDate::parse_from_str(&s[..s.len().min(10)], "%Y-%m-%d")
            .map(Cell::Date)
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// Convert an Excel 1900-epoch serial number to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let days = serial.trunc() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(chrono::Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excel_serial_to_date() {
        // 1 = 1899-12-31, 2 = 1900-01-01 (with the Lotus leap-year quirk
        // folded into the 1899-12-30 epoch).
        assert_eq!(
            excel_serial_to_date(45_992.0),
            NaiveDate::from_ymd_opt(2025, 12, 1)
        );
        assert_eq!(
            excel_serial_to_date(45_992.75),
            NaiveDate::from_ymd_opt(2025, 12, 1)
        );
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Empty.display_string(), "");
        assert_eq!(Cell::Text("Status".into()).display_string(), "Status");
        assert_eq!(Cell::Number(42.0).display_string(), "42");
        assert_eq!(Cell::Number(1.5).display_string(), "1.5");
        assert_eq!(
            Cell::Date(NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()).display_string(),
            "02/09/2026"
        );
    }

    #[test]
    fn test_header_index_exact_match() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.rows = vec![vec![
            Cell::Text("Lead Created Date".into()),
            Cell::Text("Status".into()),
        ]];
        assert_eq!(sheet.header_index("Status"), Some(1));
        assert_eq!(sheet.header_index("status"), None);
        assert_eq!(sheet.header_index("E-Sign Signed Date"), None);
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = std::env::temp_dir().join(format!("mr-model-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.xlsx");

        let mut sheet = Sheet::new("Sheet1");
        sheet.rows = vec![
            vec![Cell::Text("Status".into()), Cell::Text("Count".into())],
            vec![Cell::Text("Open".into()), Cell::Number(3.0)],
            vec![
                Cell::Date(NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()),
                Cell::Bool(true),
            ],
        ];
        let model = WorkbookModel {
            sheets: vec![sheet],
            active: 0,
        };
        model.save(&path).unwrap();

        let reloaded = WorkbookModel::load(&path).unwrap();
        assert_eq!(reloaded.sheets.len(), 1);
        assert_eq!(reloaded.sheets[0].name, "Sheet1");
        assert_eq!(reloaded.sheets[0].rows[0][0], Cell::Text("Status".into()));
        assert_eq!(reloaded.sheets[0].rows[1][1], Cell::Number(3.0));
        assert_eq!(
            reloaded.sheets[0].rows[2][0],
            Cell::Date(NaiveDate::from_ymd_opt(2026, 2, 9).unwrap())
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
