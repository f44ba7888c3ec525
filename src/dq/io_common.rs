// Conversion of raw tabular content into snapshots, shared by all the providers.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use dq_checks::builder::SnapshotBuilder;

use crate::dq::*;

/// A cell as read by one of the providers, before interpretation.
#[derive(PartialEq, Debug, Clone)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// An Excel serial date.
    DateTime(f64),
}

/// The content of a worksheet or a CSV file: a header row then the data rows.
#[derive(PartialEq, Debug, Clone)]
pub struct RawTable {
    pub path: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    fn column(&self, name: &str) -> DqResult<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .context(InputFormatSnafu {
                path: self.path.clone(),
                lineno: 1usize,
                message: format!("missing column {:?}", name),
            })
    }

    // Data rows with their line number in the source (the header is line 1).
    fn data_rows(&self) -> impl Iterator<Item = (usize, &Vec<RawCell>)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx + 2, row))
            .filter(|(_, row)| !row.iter().all(|c| cell_text(c).is_empty()))
    }
}

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%b %d, %Y %I:%M:%S %p",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

// Excel stores dates up to 9999-12-31 (serial 2958465).
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

fn excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let ms = (serial * 86_400_000.0).round() as i64;
    base.checked_add_signed(chrono::Duration::milliseconds(ms))
}

fn parse_text_timestamp(s: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    if let Some(f) = format {
        return NaiveDateTime::parse_from_str(s, f)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(s, f).ok()?.and_hms_opt(0, 0, 0));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}

pub fn parse_timestamp(cell: &RawCell, format: Option<&str>) -> Option<NaiveDateTime> {
    match cell {
        RawCell::DateTime(serial) | RawCell::Number(serial) => excel_serial(*serial),
        RawCell::Text(s) => parse_text_timestamp(s.trim(), format),
        _ => None,
    }
}

/// The textual content of a cell, as used for identifiers and group names.
pub fn cell_text(cell: &RawCell) -> String {
    match cell {
        RawCell::Empty => "".to_string(),
        RawCell::Text(s) => s.trim().to_string(),
        RawCell::Number(x) => format!("{}", x),
        RawCell::Bool(b) => b.to_string(),
        RawCell::DateTime(serial) => excel_serial(*serial)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    }
}

/// The value of a cell: blank is missing, numbers are numbers and everything else is text.
pub fn cell_value(cell: &RawCell) -> Value {
    match cell {
        RawCell::Empty => Value::Missing,
        RawCell::Number(x) => Value::Number(*x),
        RawCell::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
        RawCell::Text(s) if s.trim().is_empty() => Value::Missing,
        RawCell::Text(s) => match s.trim().parse::<f64>() {
            Ok(x) if x.is_finite() => Value::Number(x),
            _ => Value::Text(s.trim().to_string()),
        },
        RawCell::DateTime(_) => Value::Text(cell_text(cell)),
    }
}

/// Builds the snapshot of the submissions.
///
/// The identifier, enumerator, unit and timestamp columns are mandatory. All the
/// other columns become fields.
pub fn build_snapshot(raw: &RawTable, columns: &ColumnSettings) -> DqResult<Snapshot> {
    let id_idx = raw.column(&columns.id)?;
    let enum_idx = raw.column(&columns.enumerator)?;
    let unit_idx = raw.column(&columns.unit)?;
    let ts_idx = raw.column(&columns.submitted)?;
    let version_idx = match &columns.form_version {
        Some(c) => Some(raw.column(c)?),
        None => None,
    };
    let key_columns = [id_idx, enum_idx, unit_idx, ts_idx];
    let field_columns: Vec<(usize, &str)> = raw
        .header
        .iter()
        .enumerate()
        .filter(|(idx, _)| !key_columns.contains(idx))
        .map(|(idx, h)| (idx, h.as_str()))
        .collect();
    let field_names: Vec<&str> = field_columns.iter().map(|(_, h)| *h).collect();
    let mut builder = SnapshotBuilder::new(&field_names);

    let empty = RawCell::Empty;
    for (lineno, row) in raw.data_rows() {
        let get = |idx: usize| row.get(idx).unwrap_or(&empty);
        let submitted = parse_timestamp(get(ts_idx), columns.timestamp_format.as_deref())
            .context(InputFormatSnafu {
                path: raw.path.clone(),
                lineno,
                message: format!("cannot read the timestamp {:?}", get(ts_idx)),
            })?;
        let fields = field_columns
            .iter()
            .map(|(idx, h)| (h.to_string(), cell_value(get(*idx))))
            .collect();
        let record = Record {
            row: 0,
            id: cell_text(get(id_idx)),
            enumerator: cell_text(get(enum_idx)),
            unit: cell_text(get(unit_idx)),
            submitted,
            form_version: version_idx
                .map(|idx| cell_text(get(idx)))
                .filter(|v| !v.is_empty()),
            fields,
        };
        debug!("build_snapshot: line {}: {:?}", lineno, record);
        builder.push(record);
    }
    let snapshot = builder.build();
    info!(
        "build_snapshot: {}: {} records, {} fields",
        raw.path,
        snapshot.len(),
        snapshot.fields.len()
    );
    Ok(snapshot)
}

/// Builds the reference table of expected counts per unit.
pub fn build_reference(
    raw: &RawTable,
    unit_column: &str,
    expected_column: &str,
) -> DqResult<Vec<ReferenceEntry>> {
    let unit_idx = raw.column(unit_column)?;
    let expected_idx = raw.column(expected_column)?;
    let empty = RawCell::Empty;
    let mut res: Vec<ReferenceEntry> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (lineno, row) in raw.data_rows() {
        let unit = cell_text(row.get(unit_idx).unwrap_or(&empty));
        let expected_cell = row.get(expected_idx).unwrap_or(&empty);
        let expected = match cell_value(expected_cell) {
            Value::Number(x) if x >= 0.0 && x.fract() == 0.0 => x as u64,
            _ => {
                return InputFormatSnafu {
                    path: raw.path.clone(),
                    lineno,
                    message: format!(
                        "expected count {:?} is not a non-negative integer",
                        expected_cell
                    ),
                }
                .fail()
            }
        };
        if let Some(previous) = seen.insert(unit.clone(), lineno) {
            return InputFormatSnafu {
                path: raw.path.clone(),
                lineno,
                message: format!("unit {:?} already listed on line {}", unit, previous),
            }
            .fail();
        }
        res.push(ReferenceEntry { unit, expected });
    }
    info!("build_reference: {}: {} units", raw.path, res.len());
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn columns() -> ColumnSettings {
        ColumnSettings {
            id: "hhid".to_string(),
            enumerator: "enum".to_string(),
            unit: "village".to_string(),
            submitted: "date".to_string(),
            form_version: Some("version".to_string()),
            timestamp_format: None,
        }
    }

    fn raw(rows: Vec<Vec<RawCell>>) -> RawTable {
        RawTable {
            path: "survey.csv".to_string(),
            header: ["hhid", "enum", "village", "date", "version", "inc_01"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        }
    }

    #[test]
    fn timestamps() {
        let expected = NaiveDate::from_ymd_opt(2023, 3, 1)
            .unwrap()
            .and_hms_opt(9, 12, 0)
            .unwrap();
        for s in [
            "2023-03-01 09:12:00",
            "2023-03-01T09:12:00",
            "2023-03-01T09:12:00Z",
            "Mar 1, 2023 9:12:00 AM",
            "01/03/2023 09:12",
        ] {
            assert_eq!(parse_timestamp(&text(s), None), Some(expected), "{}", s);
        }
        // 2023-03-01 09:12 in Excel.
        let serial = 44986.0 + (9.0 * 60.0 + 12.0) / 1440.0;
        assert_eq!(parse_timestamp(&RawCell::DateTime(serial), None), Some(expected));
        assert_eq!(
            parse_timestamp(&text("01-03-2023"), Some("%d-%m-%Y")),
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp(&text("yesterday"), None), None);
        for bad in [-1e300, -1.0, 1e300, f64::NAN, f64::INFINITY] {
            assert_eq!(parse_timestamp(&RawCell::Number(bad), None), None, "{}", bad);
            assert_eq!(parse_timestamp(&RawCell::DateTime(bad), None), None, "{}", bad);
        }
    }

    #[test]
    fn cells() {
        assert_eq!(cell_value(&text(" 12.5 ")), Value::Number(12.5));
        assert_eq!(cell_value(&text("  ")), Value::Missing);
        assert_eq!(cell_value(&text("kg")), Value::Text("kg".to_string()));
        assert_eq!(cell_text(&RawCell::Number(3004.0)), "3004");
        assert_eq!(cell_text(&text(" 003004 ")), "003004");
    }

    #[test]
    fn snapshot_from_rows() {
        let t = raw(vec![
            vec![
                text("3001"),
                text("alice"),
                text("north"),
                text("2023-03-01 09:00:00"),
                text("2301"),
                text("10"),
            ],
            vec![RawCell::Empty; 6],
            vec![
                text("3002"),
                text("bob"),
                text("south"),
                text("2023-03-02 10:00:00"),
                RawCell::Empty,
                RawCell::Empty,
            ],
        ]);
        let s = build_snapshot(&t, &columns()).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.fields, vec!["version", "inc_01"]);
        assert_eq!(s.records[0].form_version, Some("2301".to_string()));
        assert_eq!(s.records[0].value("inc_01"), &Value::Number(10.0));
        assert_eq!(s.records[1].form_version, None);
        assert_eq!(s.records[1].value("inc_01"), &Value::Missing);
        assert_eq!(s.records[1].row, 2);
    }

    #[test]
    fn malformed_rows() {
        let t = raw(vec![vec![
            text("3001"),
            text("alice"),
            text("north"),
            text("soon"),
            text("2301"),
            text("10"),
        ]]);
        match build_snapshot(&t, &columns()) {
            Err(DqError::InputFormat { lineno, .. }) => assert_eq!(lineno, 2),
            x => panic!("unexpected {:?}", x),
        }
        let mut cols = columns();
        cols.unit = "district".to_string();
        match build_snapshot(&t, &cols) {
            Err(DqError::InputFormat { lineno, message, .. }) => {
                assert_eq!(lineno, 1);
                assert!(message.contains("district"));
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn malformed_serial_dates() {
        let t = raw(vec![vec![
            text("3001"),
            text("alice"),
            text("north"),
            RawCell::Number(-1e300),
            text("2301"),
            text("10"),
        ]]);
        assert!(matches!(
            build_snapshot(&t, &columns()),
            Err(DqError::InputFormat { lineno: 2, .. })
        ));
    }

    #[test]
    fn reference_rows() {
        let t = RawTable {
            path: "villages.csv".to_string(),
            header: vec!["village".to_string(), "target".to_string()],
            rows: vec![
                vec![text("north"), text("40")],
                vec![text("south"), RawCell::Number(0.0)],
            ],
        };
        let r = build_reference(&t, "village", "target").unwrap();
        assert_eq!(r[0], ReferenceEntry { unit: "north".to_string(), expected: 40 });
        assert_eq!(r[1].expected, 0);

        let bad = RawTable {
            rows: vec![vec![text("north"), text("-3")]],
            ..t.clone()
        };
        assert!(matches!(
            build_reference(&bad, "village", "target"),
            Err(DqError::InputFormat { .. })
        ));
        let twice = RawTable {
            rows: vec![vec![text("north"), text("3")], vec![text("north"), text("4")]],
            ..t
        };
        assert!(matches!(
            build_reference(&twice, "village", "target"),
            Err(DqError::InputFormat { .. })
        ));
    }
}
