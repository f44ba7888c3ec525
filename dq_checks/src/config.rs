// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use chrono::NaiveDateTime;

/// The content of one cell of a survey submission.
#[derive(PartialEq, Debug, Clone)]
pub enum Value {
    Number(f64),
    Text(String),
    /// A blank cell. Missing values are excluded from all the statistics.
    Missing,
}

impl Value {
    /// The numeric content, if any. Text cells are not coerced.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(x) if x.is_finite() => Some(*x),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(_) => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Missing => Ok(()),
        }
    }
}

/// One survey submission.
#[derive(PartialEq, Debug, Clone)]
pub struct Record {
    /// The 1-based index of the data row in the source file.
    pub row: usize,
    pub id: String,
    pub enumerator: String,
    pub unit: String,
    pub submitted: NaiveDateTime,
    pub form_version: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// The value of a field. Fields that were not present in the row are missing.
    pub fn value(&self, field: &str) -> &Value {
        static MISSING: Value = Value::Missing;
        self.fields.get(field).unwrap_or(&MISSING)
    }
}

/// The expected number of submissions for one geographic unit.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReferenceEntry {
    pub unit: String,
    pub expected: u64,
}

/// A dataset as loaded for one run. It is never modified after construction.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<Record>,
    /// The names of the columns of the dataset, in source order.
    pub fields: Vec<String>,
}

impl Snapshot {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The non-missing numeric values of a field, in row order.
    pub fn numbers(&self, field: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|r| r.value(field).as_number())
            .collect()
    }

    /// A fingerprint of the content of the snapshot.
    ///
    /// Two snapshots with the same records and columns have the same digest.
    pub fn digest(&self) -> String {
        let mut canonical = self.fields.join("\u{1f}");
        for r in self.records.iter() {
            canonical.push('\u{1e}');
            canonical.push_str(&format!(
                "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
                r.row,
                r.id,
                r.enumerator,
                r.unit,
                r.submitted,
                r.form_version.clone().unwrap_or_default()
            ));
            for (k, v) in r.fields.iter() {
                canonical.push_str(&format!("\u{1f}{}={:?}", k, v));
            }
        }
        sha256::digest(canonical)
    }
}

// ******** Output data structures *********

#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
    Int(i64),
    Empty,
}

impl From<&Value> for Cell {
    fn from(v: &Value) -> Cell {
        match v {
            Value::Number(x) => Cell::Number(*x),
            Value::Text(s) => Cell::Text(s.clone()),
            Value::Missing => Cell::Empty,
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(x: Option<f64>) -> Cell {
        match x {
            Some(x) => Cell::Number(x),
            None => Cell::Empty,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }
}

/// The result of one check: a named table with a fixed column order.
#[derive(PartialEq, Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: &str, columns: &[&str]) -> Table {
        Table {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// All the cells of one column, in row order.
    pub fn column(&self, column: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DegeneracyKind {
    ZeroVariance,
    AllMissing,
}

/// A field that could not be checked meaningfully. This is not an error: the
/// field is skipped and the other fields are still processed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Degeneracy {
    pub field: String,
    pub kind: DegeneracyKind,
}

impl Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            DegeneracyKind::ZeroVariance => write!(f, "{}: zero variance, skipped", self.field),
            DegeneracyKind::AllMissing => write!(f, "{}: all values missing, skipped", self.field),
        }
    }
}

/// Errors that prevent one check from completing.
///
/// They only concern the check that raised them: the other checks of a run
/// are not affected.
#[derive(PartialEq, Debug, Clone)]
pub enum CheckError {
    UnknownField(String),
    /// The rows (1-based) that have a blank identifier.
    BlankIdentifiers(Vec<usize>),
    InvalidThreshold(f64),
    InvalidBounds { field: String, min: f64, max: f64 },
    EmptyRuleSet,
}

impl Error for CheckError {}

impl Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::UnknownField(field) => write!(f, "unknown field {:?}", field),
            CheckError::BlankIdentifiers(rows) => {
                write!(f, "blank identifier in {} row(s): {:?}", rows.len(), rows)
            }
            CheckError::InvalidThreshold(k) => {
                write!(f, "the outlier threshold must be positive, got {}", k)
            }
            CheckError::InvalidBounds { field, min, max } => {
                write!(f, "invalid bounds for {}: min {} > max {}", field, min, max)
            }
            CheckError::EmptyRuleSet => write!(f, "no programming rule to apply"),
        }
    }
}

// ********* Configuration **********

/// How the bounds of an outlier check are derived.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum OutlierBound {
    /// Number of standard deviations away from the mean.
    Relative(f64),
    /// Fixed inclusive bounds.
    Absolute { min: f64, max: f64 },
}

impl OutlierBound {
    pub const DEFAULT_THRESHOLD: f64 = 3.0;
}

#[derive(PartialEq, Debug, Clone)]
pub struct OutlierSpec {
    pub field: String,
    pub bound: OutlierBound,
}

/// Which groups appear in the group summary.
///
/// - Left only reports the groups that have at least one submission.
///
/// - Right also reports the units of the reference table that have no
/// submission at all, with zero counts.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum JoinMode {
    #[default]
    Left,
    Right,
}

/// The attribute of a record used to group submissions.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum GroupKey {
    Enumerator,
    Unit,
    Field(String),
}
