use log::debug;

use crate::config::*;

/// Summary statistics over the non-missing values of a field.
///
/// All the statistics are undefined when there is no value.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Summary {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub sd: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// The population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let var = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn summarize(values: &[f64]) -> Summary {
    Summary {
        count: values.len(),
        mean: mean(values),
        median: median(values),
        sd: std_dev(values),
        min: values.iter().cloned().reduce(f64::min),
        max: values.iter().cloned().reduce(f64::max),
    }
}

pub const DESCRIPTIVE_STATS: &str = "descriptive_stats";

/// Builds the table of descriptive statistics, one row per field.
///
/// Arguments:
/// * `snapshot` the loaded submissions
/// * `fields` pairs of (field name, human-readable label)
pub fn describe(snapshot: &Snapshot, fields: &[(String, String)]) -> Result<Table, CheckError> {
    let mut table = Table::new(
        DESCRIPTIVE_STATS,
        &["field", "label", "n", "mean", "median", "sd", "min", "max"],
    );
    for (field, label) in fields.iter() {
        if !snapshot.has_field(field) {
            return Err(CheckError::UnknownField(field.clone()));
        }
        let s = summarize(&snapshot.numbers(field));
        debug!("describe: {}: {:?}", field, s);
        table.rows.push(vec![
            Cell::from(field.as_str()),
            Cell::from(label.as_str()),
            Cell::Int(s.count as i64),
            s.mean.into(),
            s.median.into(),
            s.sd.into(),
            s.min.into(),
            s.max.into(),
        ]);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SnapshotBuilder;
    use chrono::NaiveDate;

    fn day(d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn summary_of_values() {
        let s = summarize(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, Some(2.5));
        assert_eq!(s.median, Some(2.5));
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(4.0));
        let sd = s.sd.unwrap();
        assert!((sd - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn summary_of_nothing_is_undefined() {
        let s = summarize(&[]);
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, None);
        assert_eq!(s.median, None);
        assert_eq!(s.sd, None);
        assert_eq!(s.min, None);
        assert_eq!(s.max, None);
    }

    #[test]
    fn missing_values_are_excluded() {
        let mut b = SnapshotBuilder::new(&["age"]);
        b.add_record("1", "e1", "u1", day(1), &[("age", Value::Number(20.0))]);
        b.add_record("2", "e1", "u1", day(1), &[("age", Value::Missing)]);
        b.add_record("3", "e1", "u1", day(1), &[("age", Value::Number(40.0))]);
        b.add_record("4", "e1", "u1", day(1), &[("age", Value::Text("n/a".to_string()))]);
        let snapshot = b.build();

        let table = describe(&snapshot, &[("age".to_string(), "Age".to_string())]).unwrap();
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row[2], Cell::Int(2));
        assert_eq!(row[3], Cell::Number(30.0));
        assert_eq!(
            mean(&snapshot.numbers("age")),
            Some(30.0),
            "the reported mean is the mean of the non-missing values"
        );
    }

    #[test]
    fn empty_field_reports_nulls() {
        let mut b = SnapshotBuilder::new(&["age"]);
        b.add_record("1", "e1", "u1", day(1), &[("age", Value::Missing)]);
        let snapshot = b.build();
        let table = describe(&snapshot, &[("age".to_string(), "Age".to_string())]).unwrap();
        let row = &table.rows[0];
        assert_eq!(row[2], Cell::Int(0));
        assert!(row[3..].iter().all(|c| *c == Cell::Empty));
    }

    #[test]
    fn unknown_field_fails() {
        let snapshot = SnapshotBuilder::new(&["age"]).build();
        let res = describe(&snapshot, &[("weight".to_string(), "Weight".to_string())]);
        assert_eq!(res, Err(CheckError::UnknownField("weight".to_string())));
    }
}
