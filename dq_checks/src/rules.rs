use log::{debug, info};

use crate::config::*;

pub const PROGRAMMING_CHECK: &str = "survey_programming_check";

/// The result of applying one rule to one record.
#[derive(PartialEq, Debug, Clone)]
pub enum Outcome {
    Pass,
    /// The values that help diagnosing the issue, by field name.
    Fail(Vec<(String, Value)>),
}

type Predicate = Box<dyn Fn(&Record) -> Outcome + Send + Sync>;

/// A named invariant that every submission is expected to satisfy.
pub struct Rule {
    pub name: String,
    /// The fields read by the predicate. They must exist in the snapshot.
    pub fields: Vec<String>,
    predicate: Predicate,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

fn support(record: &Record, fields: &[&str]) -> Vec<(String, Value)> {
    fields
        .iter()
        .map(|f| (f.to_string(), record.value(f).clone()))
        .collect()
}

// Compares two form versions numerically when both are numbers.
fn version_is_older(version: &str, minimum: &str) -> bool {
    match (version.trim().parse::<f64>(), minimum.trim().parse::<f64>()) {
        (Ok(v), Ok(m)) => v < m,
        _ => version.trim() < minimum.trim(),
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Number(x), Value::Text(s)) | (Value::Text(s), Value::Number(x)) => {
            s.trim().parse::<f64>().map(|y| y == *x).unwrap_or(false)
        }
        (Value::Text(s), Value::Text(t)) => s.trim() == t.trim(),
        (Value::Missing, Value::Missing) => true,
        _ => false,
    }
}

impl Rule {
    pub fn new<F>(name: &str, predicate: F) -> Rule
    where
        F: Fn(&Record) -> Outcome + Send + Sync + 'static,
    {
        Rule {
            name: name.to_string(),
            fields: Vec::new(),
            predicate: Box::new(predicate),
        }
    }

    /// Declares the fields read by the predicate, so that a misspelled field
    /// name is reported instead of being read as missing.
    pub fn with_fields(mut self, fields: &[&str]) -> Rule {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    fn reading(mut self, fields: Vec<String>) -> Rule {
        self.fields = fields;
        self
    }

    pub fn apply(&self, record: &Record) -> Outcome {
        (self.predicate)(record)
    }

    /// Fails for the submissions made with a form older than `minimum`.
    /// Submissions without a form version also fail.
    pub fn outdated_form_version(name: &str, minimum: &str) -> Rule {
        let minimum = minimum.to_string();
        Rule::new(name, move |r| match &r.form_version {
            Some(v) if !version_is_older(v, &minimum) => Outcome::Pass,
            v => Outcome::Fail(vec![(
                "form_version".to_string(),
                match v {
                    Some(v) => Value::Text(v.clone()),
                    None => Value::Missing,
                },
            )]),
        })
    }

    /// Fails when both fields are filled and hold different values, for example
    /// a production unit that differs from the sale unit of the same crop.
    pub fn fields_differ(name: &str, a: &str, b: &str) -> Rule {
        let read = vec![a.to_string(), b.to_string()];
        let (a, b) = (a.to_string(), b.to_string());
        Rule::new(name, move |r| {
            let (va, vb) = (r.value(&a), r.value(&b));
            if va.is_missing() || vb.is_missing() || same_value(va, vb) {
                Outcome::Pass
            } else {
                Outcome::Fail(support(r, &[a.as_str(), b.as_str()]))
            }
        })
        .reading(read)
    }

    /// Fails when the field holds the given value, for example a wrong-site flag.
    pub fn field_equals(name: &str, field: &str, value: Value, report: &[String]) -> Rule {
        let field = field.to_string();
        let mut reported: Vec<String> = vec![field.clone()];
        reported.extend(report.iter().cloned());
        let read = reported.clone();
        Rule::new(name, move |r| {
            if same_value(r.value(&field), &value) {
                let fields: Vec<&str> = reported.iter().map(|s| s.as_str()).collect();
                Outcome::Fail(support(r, &fields))
            } else {
                Outcome::Pass
            }
        })
        .reading(read)
    }

    /// Fails when the field is blank.
    pub fn field_missing(name: &str, field: &str, report: &[String]) -> Rule {
        let field = field.to_string();
        let report = report.to_vec();
        let mut read: Vec<String> = vec![field.clone()];
        read.extend(report.iter().cloned());
        Rule::new(name, move |r| {
            if r.value(&field).is_missing() {
                let fields: Vec<&str> = report.iter().map(|s| s.as_str()).collect();
                Outcome::Fail(support(r, &fields))
            } else {
                Outcome::Pass
            }
        })
        .reading(read)
    }

    /// Fails when the numeric value of the field is strictly above the limit.
    pub fn field_above(name: &str, field: &str, limit: f64, report: &[String]) -> Rule {
        let field = field.to_string();
        let mut reported: Vec<String> = vec![field.clone()];
        reported.extend(report.iter().cloned());
        let read = reported.clone();
        Rule::new(name, move |r| match r.value(&field).as_number() {
            Some(v) if v > limit => {
                let fields: Vec<&str> = reported.iter().map(|s| s.as_str()).collect();
                Outcome::Fail(support(r, &fields))
            }
            _ => Outcome::Pass,
        })
        .reading(read)
    }
}

/// Applies all the rules to all the records.
///
/// The output has one row per failed (record, rule) pair, in row order then
/// rule order: a record that fails several rules appears several times. The
/// columns are the record identifiers, the `issue` (name of the rule) and the
/// union of all the values reported by the failed rules.
pub fn check_rules(snapshot: &Snapshot, rules: &[Rule]) -> Result<Table, CheckError> {
    if rules.is_empty() {
        return Err(CheckError::EmptyRuleSet);
    }
    for rule in rules.iter() {
        if let Some(f) = rule.fields.iter().find(|f| !snapshot.has_field(f)) {
            return Err(CheckError::UnknownField(f.clone()));
        }
    }

    let mut failures: Vec<(&Record, &Rule, Vec<(String, Value)>)> = Vec::new();
    let mut support_columns: Vec<String> = Vec::new();
    for r in snapshot.records.iter() {
        for rule in rules.iter() {
            if let Outcome::Fail(values) = rule.apply(r) {
                debug!("check_rules: row {} failed {:?}", r.row, rule.name);
                for (k, _) in values.iter() {
                    if !support_columns.contains(k) {
                        support_columns.push(k.clone());
                    }
                }
                failures.push((r, rule, values));
            }
        }
    }

    let mut columns: Vec<&str> = vec!["id", "enumerator", "unit", "issue"];
    columns.extend(support_columns.iter().map(|c| c.as_str()));
    let mut table = Table::new(PROGRAMMING_CHECK, &columns);
    for (r, rule, values) in failures.iter() {
        let mut row = vec![
            Cell::from(r.id.as_str()),
            Cell::from(r.enumerator.as_str()),
            Cell::from(r.unit.as_str()),
            Cell::from(rule.name.as_str()),
        ];
        row.extend(support_columns.iter().map(|c| {
            values
                .iter()
                .find(|(k, _)| k == c)
                .map(|(_, v)| Cell::from(v))
                .unwrap_or(Cell::Empty)
        }));
        table.rows.push(row);
    }
    info!(
        "check_rules: {} issue(s) from {} rule(s)",
        table.rows.len(),
        rules.len()
    );
    Ok(table)
}
