// Primitives for reading CSV files.

use crate::dq::io_common::{RawCell, RawTable};
use crate::dq::*;

pub fn read_csv_table(path: &str) -> DqResult<RawTable> {
    ensure!(Path::new(path).is_file(), InputNotFoundSnafu { path });
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let header: Vec<String> = rdr
        .headers()
        .context(CsvLineParseSnafu { path, lineno: 1usize })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    debug!("read_csv_table: {}: header: {:?}", path, header);
    ensure!(
        !header.iter().all(|h| h.is_empty()),
        InputFormatSnafu {
            path,
            lineno: 1usize,
            message: "empty header"
        }
    );

    let mut rows: Vec<Vec<RawCell>> = Vec::new();
    for (idx, line_r) in rdr.records().enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        let row: Vec<RawCell> = line
            .iter()
            .map(|s| {
                if s.trim().is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::Text(s.to_string())
                }
            })
            .collect();
        rows.push(row);
    }
    Ok(RawTable {
        path: path.to_string(),
        header,
        rows,
    })
}
