use calamine::DataType;

use crate::dq::io_common::{RawCell, RawTable};
use crate::dq::*;

fn read_cell(cell: &DataType) -> RawCell {
    match cell {
        DataType::String(s) if s.trim().is_empty() => RawCell::Empty,
        DataType::String(s) => RawCell::Text(s.clone()),
        DataType::Float(f) => RawCell::Number(*f),
        DataType::Int(i) => RawCell::Number(*i as f64),
        DataType::Bool(b) => RawCell::Bool(*b),
        DataType::DateTime(serial) => RawCell::DateTime(*serial),
        DataType::Empty => RawCell::Empty,
        // Formula errors (#N/A, #DIV/0!, ...) carry no value.
        _ => RawCell::Empty,
    }
}

fn get_range(path: &str, worksheet_name: Option<&str>) -> DqResult<calamine::Range<DataType>> {
    debug!("get_range: path: {:?} worksheet: {:?}", path, worksheet_name);
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet) = worksheet_name {
        let wrange = workbook
            .worksheet_range(worksheet)
            .context(MissingWorksheetSnafu { path, worksheet })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let wrange = workbook
            .worksheet_range_at(0)
            .context(MissingWorksheetSnafu {
                path,
                worksheet: "<first>",
            })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    }
}

pub fn read_excel_table(path: &str, worksheet_name: Option<&str>) -> DqResult<RawTable> {
    ensure!(Path::new(path).is_file(), InputNotFoundSnafu { path });
    let wrange = get_range(path, worksheet_name)?;

    let mut iter = wrange.rows();
    let header: Vec<String> = iter
        .next()
        .context(InputFormatSnafu {
            path,
            lineno: 1usize,
            message: "empty worksheet",
        })?
        .iter()
        .map(|c| match read_cell(c) {
            RawCell::Text(s) => s.trim().to_string(),
            RawCell::Number(x) => format!("{}", x),
            _ => "".to_string(),
        })
        .collect();
    debug!("read_excel_table: header: {:?}", header);

    let rows: Vec<Vec<RawCell>> = iter.map(|row| row.iter().map(read_cell).collect()).collect();
    Ok(RawTable {
        path: path.to_string(),
        header,
        rows,
    })
}
