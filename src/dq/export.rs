// Writing the check results to an Excel workbook.

use std::collections::HashSet;
use std::io::Write;

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tempfile::NamedTempFile;

use crate::dq::*;

/// Excel refuses longer worksheet names.
const MAX_SHEET_NAME: usize = 31;

#[derive(PartialEq, Debug, Clone)]
pub struct ExportReport {
    pub path: String,
    /// The worksheets written, in order.
    pub sheets: Vec<String>,
    /// The tables that could not be written, with the reason.
    pub failed: Vec<(String, String)>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn sheet_name(table_name: &str) -> String {
    table_name.chars().take(MAX_SHEET_NAME).collect()
}

fn fill_sheet(name: &str, table: &Table, header_format: &Format) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;
    for (col, c) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, c.as_str(), header_format)?;
    }
    for (idx, row) in table.rows.iter().enumerate() {
        let lineno = (idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => {
                    sheet.write_string(lineno, col, s.as_str())?;
                }
                Cell::Number(x) if x.is_finite() => {
                    sheet.write_number(lineno, col, *x)?;
                }
                // Excel has no representation for NaN or infinities.
                Cell::Number(_) => {}
                Cell::Int(i) => {
                    sheet.write_number(lineno, col, *i as f64)?;
                }
                Cell::Empty => {}
            }
        }
    }
    Ok(sheet)
}

/// Writes every table to its own worksheet, named after the table.
///
/// A new workbook is built for every call, so that running the checks again
/// replaces the previous results. A table that cannot be written is reported in
/// `ExportReport::failed` and the other tables are still written.
pub fn export_workbook(path: &str, tables: &[&Table]) -> DqResult<ExportReport> {
    let header_format = Format::new().set_bold();
    let mut workbook = Workbook::new();
    let mut used: HashSet<String> = HashSet::new();
    let mut report = ExportReport {
        path: path.to_string(),
        sheets: Vec::new(),
        failed: Vec::new(),
    };

    for table in tables.iter() {
        let name = sheet_name(&table.name);
        if !used.insert(name.to_lowercase()) {
            warn!("export_workbook: duplicate worksheet name {:?}", name);
            report
                .failed
                .push((table.name.clone(), "duplicate worksheet name".to_string()));
            continue;
        }
        match fill_sheet(&name, table, &header_format) {
            Ok(sheet) => {
                debug!("export_workbook: {}: {} rows", name, table.rows.len());
                workbook.push_worksheet(sheet);
                report.sheets.push(name);
            }
            Err(e) => {
                warn!("export_workbook: cannot write {}: {}", table.name, e);
                report.failed.push((table.name.clone(), e.to_string()));
            }
        }
    }

    let buffer = workbook.save_to_buffer().context(ExportIoSnafu { path })?;
    // The workbook is written to a temporary file next to the target, then
    // renamed over it. A failed write leaves the previous workbook in place.
    let target = Path::new(path);
    let dir = match target.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).context(ExportWriteSnafu { path })?;
    file.write_all(&buffer).context(ExportWriteSnafu { path })?;
    file.as_file().sync_all().context(ExportWriteSnafu { path })?;
    file.persist(target)
        .map_err(|e| e.error)
        .context(ExportWriteSnafu { path })?;
    info!(
        "export_workbook: wrote {} worksheet(s) to {}",
        report.sheets.len(),
        path
    );
    Ok(report)
}
