//! Spreadsheet export and the column layout shared with the console table.

use rust_xlsxwriter::Workbook;

use crate::aggregate::{FileDetail, StudentSummary};
use crate::error::Result;
use crate::models::format_timestamp;

/// MIME type of the generated workbook.
pub const XLSX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Name of the single worksheet.
pub const SHEET_NAME: &str = "Submissions";

/// Shown in place of a missing timestamp.
pub const NOT_AVAILABLE: &str = "N/A";

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A row type that can be laid out as a table.
pub trait ReportRow {
    /// Column names, in field order.
    fn headers() -> &'static [&'static str];

    /// Cell values, one per header.
    fn cells(&self) -> Vec<Cell>;
}

impl ReportRow for StudentSummary {
    fn headers() -> &'static [&'static str] {
        &["Student", "Files Submitted", "Last Modified"]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.student.clone()),
            Cell::Number(self.files_submitted as f64),
            Cell::Text(
                self.last_modified
                    .as_ref()
                    .map(format_timestamp)
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            ),
        ]
    }
}

impl ReportRow for FileDetail {
    fn headers() -> &'static [&'static str] {
        &[
            "Student Name",
            "File Name",
            "Last Modified",
            "MIME Type",
            "Total Submissions",
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.student.clone()),
            Cell::Text(self.file_name.clone()),
            Cell::Text(format_timestamp(&self.last_modified)),
            Cell::Text(self.mime_type.clone()),
            Cell::Number(self.total_submissions as f64),
        ]
    }
}

/// Serialize `rows` into an `.xlsx` workbook with a header row.
///
/// An empty slice still yields a valid workbook holding only the header.
pub fn to_spreadsheet_bytes<R: ReportRow>(rows: &[R]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in R::headers().iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        for (col, cell) in row.cells().iter().enumerate() {
            match cell {
                Cell::Text(s) => worksheet.write_string(r, col as u16, s.as_str())?,
                Cell::Number(n) => worksheet.write_number(r, col as u16, *n)?,
            };
        }
    }

    Ok(workbook.save_to_buffer()?)
}
