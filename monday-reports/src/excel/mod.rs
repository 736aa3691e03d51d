//! Spreadsheet transform pipeline
//!
//! Takes a downloaded report workbook and prepares it for delivery: sized
//! columns, normalized dates, a banded data table, count-by-Status summary
//! sheets, and a predictable sheet order. The workbook is loaded into memory
//! once, mutated stage by stage, and written back exactly once. A stage
//! failure still writes the file so the stages that did run are kept.

pub mod model;
pub mod stages;

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use thiserror::Error;

pub use model::{Cell, Sheet, WorkbookModel};

/// Name the raw export's data sheet ends up with.
pub const DATA_SHEET_NAME: &str = "All Fields All Time";
/// Name exports arrive with.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),
    #[error("No 'Status' column in the data sheet")]
    MissingStatusColumn,
}

/// Run the full pipeline on `path`, rewriting it in place.
///
/// Stage failures are returned to the caller, but the workbook is saved
/// first with whatever stages completed.
pub fn transform(path: &Path, summary_sheets: &[String]) -> Result<()> {
    info!("Transforming {}", path.display());
    let mut model = WorkbookModel::load(path)?;

    let result = run_stages(&mut model, summary_sheets);

    model
        .save(path)
        .with_context(|| format!("Failed to write transformed workbook: {}", path.display()))?;
    result.with_context(|| format!("Transform incomplete for {}", path.display()))
}

fn run_stages(model: &mut WorkbookModel, summary_sheets: &[String]) -> Result<()> {
    for sheet in &mut model.sheets {
        stages::fix_column_widths(sheet);
    }
    if let Some(first) = model.sheets.first_mut() {
        stages::normalize_date_columns(first);
        stages::add_data_table(first);
    }
    stages::rename_data_sheet(model);
    stages::build_status_summaries(model, summary_sheets)?;
    stages::reorder_sheets(model, summary_sheets);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Cell;

    fn write_fixture(path: &Path, rows: Vec<Vec<Cell>>) {
        let mut sheet = model::Sheet::new(DEFAULT_SHEET_NAME);
        sheet.rows = rows;
        let model = WorkbookModel {
            sheets: vec![sheet],
            active: 0,
        };
        model.save(path).unwrap();
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_transform_end_to_end() {
        let dir = std::env::temp_dir().join(format!("mr-transform-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("report.xlsx");
        write_fixture(
            &path,
            vec![
                vec![text("Name"), text("Status"), text("Lead Created Date")],
                vec![text("A"), text("Open"), text("2026-02-02")],
                vec![text("B"), text("Open"), text("garbage")],
                vec![text("C"), text("Signed"), text("02/05/2026")],
            ],
        );

        transform(&path, &["Status Summary".to_string()]).unwrap();

        let model = WorkbookModel::load(&path).unwrap();
        let names: Vec<&str> = model.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![DATA_SHEET_NAME, "Status Summary"]);

        let data = model.sheet(DATA_SHEET_NAME).unwrap();
        assert_eq!(
            data.rows[1][2],
            Cell::Date(chrono::NaiveDate::from_ymd_opt(2026, 2, 2).unwrap())
        );
        assert_eq!(data.rows[2][2], Cell::Empty);

        let summary = model.sheet("Status Summary").unwrap();
        assert_eq!(summary.rows[0][0], text("Row Labels"));
        assert_eq!(summary.rows[1], vec![text("Open"), Cell::Number(2.0)]);
        assert_eq!(summary.rows[2], vec![text("Signed"), Cell::Number(1.0)]);
        assert_eq!(
            summary.rows[3],
            vec![text("Grand Total"), Cell::Number(3.0)]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_transform_saves_partial_work_on_failure() {
        let dir = std::env::temp_dir().join(format!("mr-partial-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("no-status.xlsx");
        write_fixture(
            &path,
            vec![
                vec![text("Name")],
                vec![text("A")],
            ],
        );

        let result = transform(&path, &["Status Summary".to_string()]);
        assert!(result.is_err());

        // The rename ran before the failing summary stage and must persist.
        let model = WorkbookModel::load(&path).unwrap();
        assert!(model.sheet(DATA_SHEET_NAME).is_some());
        assert!(model.sheet("Status Summary").is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_widths_sized_on_every_sheet() {
        let mut data = model::Sheet::new(DEFAULT_SHEET_NAME);
        data.rows = vec![
            vec![text("Status")],
            vec![text("Open")],
        ];
        let mut extra = model::Sheet::new("Archive");
        extra.rows = vec![
            vec![text("Old Status"), text("Reason For Closure")],
            vec![text("Closed"), text("Duplicate intake")],
        ];
        let mut model = WorkbookModel {
            sheets: vec![data, extra],
            active: 0,
        };

        run_stages(&mut model, &[]).unwrap();

        assert!(!model.sheets[0].column_widths.is_empty());
        let archive = model.sheet("Archive").unwrap();
        assert_eq!(archive.column_widths[&0], 12.0);
        assert_eq!(archive.column_widths[&1], 20.0);
    }

    #[test]
    fn test_transform_without_summaries() {
        let dir = std::env::temp_dir().join(format!("mr-nosum-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("plain.xlsx");
        write_fixture(
            &path,
            vec![
                vec![text("Name")],
                vec![text("A")],
            ],
        );

        transform(&path, &[]).unwrap();

        let model = WorkbookModel::load(&path).unwrap();
        assert_eq!(model.sheets.len(), 1);
        assert_eq!(model.sheets[0].name, DATA_SHEET_NAME);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
