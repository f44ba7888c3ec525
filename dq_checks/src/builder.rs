pub use crate::config::*;

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// A builder for assembling a snapshot row by row.
///
/// The rows are numbered in the order they are added, starting at 1.
///
/// ```
/// use dq_checks::builder::SnapshotBuilder;
/// use dq_checks::Value;
///
/// let submitted = chrono::NaiveDate::from_ymd_opt(2023, 3, 1)
///     .unwrap()
///     .and_hms_opt(9, 30, 0)
///     .unwrap();
///
/// let mut builder = SnapshotBuilder::new(&["inc_01"]);
/// builder.add_record("3004", "alice", "north", submitted, &[("inc_01", Value::Number(10.0))]);
/// let snapshot = builder.build();
///
/// assert_eq!(snapshot.len(), 1);
/// assert_eq!(snapshot.records[0].row, 1);
/// ```
pub struct SnapshotBuilder {
    pub(crate) _fields: Vec<String>,
    pub(crate) _records: Vec<Record>,
}

impl SnapshotBuilder {
    pub fn new(fields: &[&str]) -> SnapshotBuilder {
        SnapshotBuilder {
            _fields: fields.iter().map(|f| f.to_string()).collect(),
            _records: Vec::new(),
        }
    }

    /// Adds a submission with the mandatory attributes and some field values.
    pub fn add_record(
        &mut self,
        id: &str,
        enumerator: &str,
        unit: &str,
        submitted: NaiveDateTime,
        values: &[(&str, Value)],
    ) -> &mut Record {
        let fields: BTreeMap<String, Value> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.push(Record {
            row: self._records.len() + 1,
            id: id.to_string(),
            enumerator: enumerator.to_string(),
            unit: unit.to_string(),
            submitted,
            form_version: None,
            fields,
        })
    }

    /// Adds a complete record. Its row number is reassigned to keep the rows in sequence.
    pub fn push(&mut self, mut record: Record) -> &mut Record {
        record.row = self._records.len() + 1;
        for k in record.fields.keys() {
            if !self._fields.contains(k) {
                self._fields.push(k.clone());
            }
        }
        self._records.push(record);
        let last = self._records.len() - 1;
        &mut self._records[last]
    }

    pub fn build(self) -> Snapshot {
        Snapshot {
            records: self._records,
            fields: self._fields,
        }
    }
}
