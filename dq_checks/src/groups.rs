use chrono::NaiveDate;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::*;
use crate::stats::{summarize, Summary};

impl GroupKey {
    /// The group a record belongs to.
    pub fn key_of(&self, r: &Record) -> String {
        match self {
            GroupKey::Enumerator => r.enumerator.clone(),
            GroupKey::Unit => r.unit.clone(),
            GroupKey::Field(f) => r.value(f).to_string(),
        }
    }
}

pub struct GroupOptions<'a> {
    /// Used to name the output tables: `{name}_check` and `{name}_by_day`.
    pub name: String,
    pub stat_fields: Vec<String>,
    pub reference: Option<&'a [ReferenceEntry]>,
    pub join: JoinMode,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupSummary {
    pub group: String,
    pub submissions: u64,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    /// The number of submissions on each day, aligned with `GroupReport::days`.
    pub per_day: Vec<u64>,
    /// Aligned with the statistics fields of the options.
    pub stats: Vec<Summary>,
    pub expected: Option<u64>,
    pub pct_expected: Option<f64>,
}

impl GroupSummary {
    pub fn days_active(&self) -> usize {
        self.per_day.iter().filter(|c| **c > 0).count()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupReport {
    /// All the days with at least one submission, in calendar order.
    pub days: Vec<NaiveDate>,
    /// Sorted by group.
    pub groups: Vec<GroupSummary>,
    pub by_day: Table,
    pub summary: Table,
}

/// Percentage of the expected number of submissions. Undefined when nothing is expected.
pub fn pct_expected(total: u64, expected: u64) -> Option<f64> {
    if expected == 0 {
        None
    } else {
        Some(total as f64 / expected as f64 * 100.0)
    }
}

/// Aggregates the submissions by group.
///
/// Arguments:
/// * `snapshot` the loaded submissions
/// * `key` returns the group of a record
/// * `options` the statistics to compute and the optional reference table
///
/// Each group gets its count of submissions per calendar day (zero when
/// nothing was submitted that day), its total, the summary statistics of the
/// requested fields and, when a reference table is given, the progress against
/// the expected number of submissions.
pub fn aggregate<K>(
    snapshot: &Snapshot,
    key: K,
    options: &GroupOptions,
) -> Result<GroupReport, CheckError>
where
    K: Fn(&Record) -> String,
{
    if let Some(f) = options.stat_fields.iter().find(|f| !snapshot.has_field(f)) {
        return Err(CheckError::UnknownField(f.clone()));
    }

    let days: Vec<NaiveDate> = snapshot
        .records
        .iter()
        .map(|r| r.submitted.date())
        .collect::<BTreeSet<NaiveDate>>()
        .into_iter()
        .collect();
    let day_index: HashMap<NaiveDate, usize> =
        days.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut members: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for r in snapshot.records.iter() {
        members.entry(key(r)).or_default().push(r);
    }
    let expected: Option<HashMap<&str, u64>> = options
        .reference
        .map(|entries| entries.iter().map(|e| (e.unit.as_str(), e.expected)).collect());

    if options.join == JoinMode::Right {
        if let Some(entries) = options.reference {
            for e in entries.iter() {
                if !members.contains_key(&e.unit) {
                    debug!("aggregate: {}: adding inactive group {:?}", options.name, e.unit);
                    members.insert(e.unit.clone(), Vec::new());
                }
            }
        }
    }

    let mut groups: Vec<GroupSummary> = Vec::new();
    for (group, records) in members.iter() {
        let mut per_day: Vec<u64> = vec![0; days.len()];
        for r in records.iter() {
            per_day[day_index[&r.submitted.date()]] += 1;
        }
        let stats: Vec<Summary> = options
            .stat_fields
            .iter()
            .map(|f| {
                let values: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.value(f).as_number())
                    .collect();
                summarize(&values)
            })
            .collect();
        let submissions = records.len() as u64;
        let group_expected = expected
            .as_ref()
            .and_then(|m| m.get(group.as_str()).cloned());
        groups.push(GroupSummary {
            group: group.clone(),
            submissions,
            first_day: records.iter().map(|r| r.submitted.date()).min(),
            last_day: records.iter().map(|r| r.submitted.date()).max(),
            per_day,
            stats,
            expected: group_expected,
            pct_expected: group_expected.and_then(|e| pct_expected(submissions, e)),
        });
    }
    info!(
        "aggregate: {}: {} group(s) over {} day(s)",
        options.name,
        groups.len(),
        days.len()
    );

    let by_day = by_day_table(&options.name, &days, &groups);
    let summary = summary_table(options, &groups);
    Ok(GroupReport {
        days,
        groups,
        by_day,
        summary,
    })
}

/// Aggregates the submissions by enumerator, by geographic unit or by the value of a field.
pub fn aggregate_by(
    snapshot: &Snapshot,
    key: &GroupKey,
    options: &GroupOptions,
) -> Result<GroupReport, CheckError> {
    if let GroupKey::Field(f) = key {
        if !snapshot.has_field(f) {
            return Err(CheckError::UnknownField(f.clone()));
        }
    }
    aggregate(snapshot, |r| key.key_of(r), options)
}

fn format_day(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn by_day_table(name: &str, days: &[NaiveDate], groups: &[GroupSummary]) -> Table {
    let mut columns: Vec<String> = vec!["group".to_string()];
    columns.extend(days.iter().map(format_day));
    columns.push("total".to_string());
    let rows = groups
        .iter()
        .map(|g| {
            let mut row = vec![Cell::from(g.group.as_str())];
            row.extend(g.per_day.iter().map(|c| Cell::Int(*c as i64)));
            row.push(Cell::Int(g.submissions as i64));
            row
        })
        .collect();
    Table {
        name: format!("{}_by_day", name),
        columns,
        rows,
    }
}

fn summary_table(options: &GroupOptions, groups: &[GroupSummary]) -> Table {
    let mut columns: Vec<String> = ["group", "submissions", "first_day", "last_day", "days_active"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    for f in options.stat_fields.iter() {
        for s in ["mean", "median", "sd", "min", "max"] {
            columns.push(format!("{}_{}", f, s));
        }
    }
    if options.reference.is_some() {
        columns.push("expected".to_string());
        columns.push("pct_expected".to_string());
    }

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for g in groups.iter() {
        let day_cell = |d: Option<NaiveDate>| match d {
            Some(d) => Cell::Text(format_day(&d)),
            None => Cell::Empty,
        };
        let mut row = vec![
            Cell::from(g.group.as_str()),
            Cell::Int(g.submissions as i64),
            day_cell(g.first_day),
            day_cell(g.last_day),
            Cell::Int(g.days_active() as i64),
        ];
        for s in g.stats.iter() {
            row.push(Cell::from(s.mean));
            row.push(Cell::from(s.median));
            row.push(Cell::from(s.sd));
            row.push(Cell::from(s.min));
            row.push(Cell::from(s.max));
        }
        if options.reference.is_some() {
            row.push(match g.expected {
                Some(e) => Cell::Int(e as i64),
                None => Cell::Empty,
            });
            row.push(Cell::from(g.pct_expected));
        }
        rows.push(row);
    }
    Table {
        name: format!("{}_check", options.name),
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SnapshotBuilder;

    fn at(d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn sample() -> Snapshot {
        let mut b = SnapshotBuilder::new(&["inc_01"]);
        let rows = [
            ("alice", "north", 1, 10.0),
            ("alice", "north", 1, 20.0),
            ("bob", "south", 1, 30.0),
            ("alice", "south", 3, 40.0),
            ("bob", "south", 3, 50.0),
            ("carol", "east", 2, 60.0),
        ];
        for (idx, (e, u, d, v)) in rows.iter().enumerate() {
            b.add_record(
                &idx.to_string(),
                e,
                u,
                at(*d, 9 + idx as u32),
                &[("inc_01", Value::Number(*v))],
            );
        }
        b.build()
    }

    fn options<'a>(
        name: &str,
        reference: Option<&'a [ReferenceEntry]>,
        join: JoinMode,
    ) -> GroupOptions<'a> {
        GroupOptions {
            name: name.to_string(),
            stat_fields: vec!["inc_01".to_string()],
            reference,
            join,
        }
    }

    fn reference() -> Vec<ReferenceEntry> {
        vec![
            ReferenceEntry {
                unit: "north".to_string(),
                expected: 4,
            },
            ReferenceEntry {
                unit: "south".to_string(),
                expected: 0,
            },
            ReferenceEntry {
                unit: "west".to_string(),
                expected: 5,
            },
        ]
    }

    #[test]
    fn by_day_pivot_by_enumerator() {
        let s = sample();
        let o = options("enumerator", None, JoinMode::Left);
        let report = aggregate_by(&s, &GroupKey::Enumerator, &o).unwrap();
        assert_eq!(report.days.len(), 3);
        assert_eq!(report.by_day.name, "enumerator_by_day");
        assert_eq!(
            report.by_day.columns,
            vec!["group", "2023-03-01", "2023-03-02", "2023-03-03", "total"]
        );
        let alice = &report.groups[0];
        assert_eq!(alice.group, "alice");
        assert_eq!(alice.per_day, vec![2, 0, 1]);
        assert_eq!(alice.days_active(), 2);
        assert_eq!(alice.stats[0].mean, Some(70.0 / 3.0));
        // Days without submission are zero, not absent.
        assert_eq!(
            report.by_day.rows[2],
            vec![
                Cell::from("carol"),
                Cell::Int(0),
                Cell::Int(1),
                Cell::Int(0),
                Cell::Int(1),
            ]
        );
        assert_eq!(report.summary.name, "enumerator_check");
        assert!(report.summary.column_index("expected").is_none());
    }

    #[test]
    fn day_totals_match_group_totals() {
        let s = sample();
        for key in [GroupKey::Enumerator, GroupKey::Unit] {
            let report = aggregate_by(&s, &key, &options("g", None, JoinMode::Left)).unwrap();
            let total: u64 = report.groups.iter().map(|g| g.submissions).sum();
            assert_eq!(total as usize, s.len());
            for g in report.groups.iter() {
                assert_eq!(g.per_day.iter().sum::<u64>(), g.submissions);
            }
        }
    }

    #[test]
    fn progress_against_reference() {
        let s = sample();
        let r = reference();
        let o = options("village", Some(r.as_slice()), JoinMode::Left);
        let report = aggregate_by(&s, &GroupKey::Unit, &o).unwrap();
        let names: Vec<&str> = report.groups.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(names, vec!["east", "north", "south"]);
        let north = &report.groups[1];
        assert_eq!(north.expected, Some(4));
        assert_eq!(north.pct_expected, Some(50.0));
        // Expected zero: undefined rather than a division by zero.
        let south = &report.groups[2];
        assert_eq!(south.expected, Some(0));
        assert_eq!(south.pct_expected, None);
        // No reference entry.
        assert_eq!(report.groups[0].expected, None);
        let pct = report.summary.column("pct_expected").unwrap();
        assert_eq!(pct, vec![&Cell::Empty, &Cell::Number(50.0), &Cell::Empty]);
    }

    #[test]
    fn right_join_adds_inactive_units() {
        let s = sample();
        let r = reference();
        let o = options("village", Some(r.as_slice()), JoinMode::Right);
        let report = aggregate_by(&s, &GroupKey::Unit, &o).unwrap();
        let west = report.groups.iter().find(|g| g.group == "west").unwrap();
        assert_eq!(west.submissions, 0);
        assert_eq!(west.per_day, vec![0, 0, 0]);
        assert_eq!(west.pct_expected, Some(0.0));
        assert_eq!(west.stats[0].mean, None);
        assert_eq!(report.by_day.rows.len(), 4);
    }

    #[test]
    fn custom_key() {
        let s = sample();
        let o = options("hour", None, JoinMode::Left);
        let report = aggregate(&s, |r| r.submitted.format("%H").to_string(), &o).unwrap();
        assert_eq!(report.groups.len(), 6);
    }

    #[test]
    fn unknown_fields() {
        let s = sample();
        assert_eq!(
            aggregate_by(
                &s,
                &GroupKey::Field("team".to_string()),
                &options("team", None, JoinMode::Left)
            ),
            Err(CheckError::UnknownField("team".to_string()))
        );
        let mut o = options("enumerator", None, JoinMode::Left);
        o.stat_fields = vec!["inc_02".to_string()];
        assert_eq!(
            aggregate_by(&s, &GroupKey::Enumerator, &o),
            Err(CheckError::UnknownField("inc_02".to_string()))
        );
    }
}
