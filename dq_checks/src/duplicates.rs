use log::{debug, info};
use std::collections::{HashMap, HashSet};

use crate::config::*;

pub const DUPLICATE_CHECK: &str = "duplicate_check";

/// All the records that share one identifier, in row order.
#[derive(PartialEq, Debug, Clone)]
pub struct DuplicateGroup {
    pub id: String,
    pub rows: Vec<usize>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DuplicateReport {
    /// Ordered by the first appearance of the identifier.
    pub groups: Vec<DuplicateGroup>,
    pub table: Table,
}

fn blank_rows(snapshot: &Snapshot) -> Vec<usize> {
    snapshot
        .records
        .iter()
        .filter(|r| r.id.trim().is_empty())
        .map(|r| r.row)
        .collect()
}

// Indexes of the records for each identifier, with the identifiers in order of first appearance.
fn group_indexes(snapshot: &Snapshot) -> Vec<(String, Vec<usize>)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, r) in snapshot.records.iter().enumerate() {
        match positions.get(r.id.as_str()) {
            Some(pos) => groups[*pos].1.push(idx),
            None => {
                positions.insert(r.id.as_str(), groups.len());
                groups.push((r.id.clone(), vec![idx]));
            }
        }
    }
    groups
}

/// Finds the identifiers that are used by more than one submission.
///
/// Arguments:
/// * `snapshot` the loaded submissions
/// * `outcome_fields` extra fields reported for each colliding record, to help
/// deciding which submission to keep
///
/// A blank identifier is an error: blank identifiers are not considered equal
/// to each other.
pub fn find_duplicates(
    snapshot: &Snapshot,
    outcome_fields: &[String],
) -> Result<DuplicateReport, CheckError> {
    let blanks = blank_rows(snapshot);
    if !blanks.is_empty() {
        return Err(CheckError::BlankIdentifiers(blanks));
    }
    if let Some(f) = outcome_fields.iter().find(|f| !snapshot.has_field(f)) {
        return Err(CheckError::UnknownField(f.clone()));
    }

    let mut columns = vec![
        "id",
        "row",
        "enumerator",
        "unit",
        "submitted",
        "occurrence",
        "group_size",
    ];
    columns.extend(outcome_fields.iter().map(|f| f.as_str()));
    let mut table = Table::new(DUPLICATE_CHECK, &columns);

    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for (id, idxs) in group_indexes(snapshot) {
        if idxs.len() < 2 {
            continue;
        }
        debug!("find_duplicates: id {:?} appears {} times", id, idxs.len());
        for (occurrence, idx) in idxs.iter().enumerate() {
            let r = &snapshot.records[*idx];
            let mut row = vec![
                Cell::from(r.id.as_str()),
                Cell::Int(r.row as i64),
                Cell::from(r.enumerator.as_str()),
                Cell::from(r.unit.as_str()),
                Cell::Text(r.submitted.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::Int(occurrence as i64 + 1),
                Cell::Int(idxs.len() as i64),
            ];
            row.extend(outcome_fields.iter().map(|f| Cell::from(r.value(f))));
            table.rows.push(row);
        }
        groups.push(DuplicateGroup {
            id,
            rows: idxs.iter().map(|idx| snapshot.records[*idx].row).collect(),
        });
    }
    info!(
        "find_duplicates: {} duplicated identifier(s) over {} records",
        groups.len(),
        snapshot.len()
    );
    Ok(DuplicateReport { groups, table })
}

/// Returns a working copy of the snapshot in which every identifier is unique.
///
/// The submissions sharing an identifier `id` are renamed `id_1`, `id_2`, ... in
/// row order. If such a name is already used by another submission, the
/// numbering skips it. The input snapshot is left untouched.
pub fn remediate(snapshot: &Snapshot) -> Result<Snapshot, CheckError> {
    let blanks = blank_rows(snapshot);
    if !blanks.is_empty() {
        return Err(CheckError::BlankIdentifiers(blanks));
    }
    let mut taken: HashSet<String> = snapshot.records.iter().map(|r| r.id.clone()).collect();
    let mut res = snapshot.clone();
    for (id, idxs) in group_indexes(snapshot) {
        if idxs.len() < 2 {
            continue;
        }
        let mut suffix = 0;
        for idx in idxs {
            let new_id = loop {
                suffix += 1;
                let candidate = format!("{}_{}", id, suffix);
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            debug!("remediate: row {}: {} -> {}", res.records[idx].row, id, new_id);
            taken.insert(new_id.clone());
            res.records[idx].id = new_id;
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SnapshotBuilder;
    use chrono::NaiveDate;

    fn ts() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn snapshot_with_ids(ids: &[&str]) -> Snapshot {
        let mut b = SnapshotBuilder::new(&["consent"]);
        for id in ids {
            b.add_record(id, "e1", "u1", ts(), &[("consent", Value::Number(1.0))]);
        }
        b.build()
    }

    #[test]
    fn remediation_numbers_in_row_order() {
        let s = snapshot_with_ids(&[
            "3001", "3002", "3003", "3005", "3004", "3006", "3007", "3008", "3004",
        ]);
        let fixed = remediate(&s).unwrap();
        assert_eq!(fixed.records[4].row, 5);
        assert_eq!(fixed.records[4].id, "3004_1");
        assert_eq!(fixed.records[8].row, 9);
        assert_eq!(fixed.records[8].id, "3004_2");
        // The original snapshot is not touched.
        assert_eq!(s.records[4].id, "3004");
        assert_eq!(s.records[8].id, "3004");
    }

    #[test]
    fn remediated_ids_are_unique() {
        let s = snapshot_with_ids(&["a", "a", "a_1", "b", "a", "b", "c"]);
        let fixed = remediate(&s).unwrap();
        let ids: HashSet<&str> = fixed.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), fixed.records.len());
        assert_eq!(fixed.records[0].id, "a_2");
        assert_eq!(fixed.records[2].id, "a_1");
    }

    #[test]
    fn report_lists_colliding_records() {
        let s = snapshot_with_ids(&["x", "y", "x", "z", "y", "x"]);
        let report = find_duplicates(&s, &["consent".to_string()]).unwrap();
        assert_eq!(
            report.groups,
            vec![
                DuplicateGroup {
                    id: "x".to_string(),
                    rows: vec![1, 3, 6]
                },
                DuplicateGroup {
                    id: "y".to_string(),
                    rows: vec![2, 5]
                },
            ]
        );
        assert_eq!(report.table.rows.len(), 5);
        assert_eq!(report.table.columns.last().unwrap(), "consent");
        assert_eq!(report.table.rows[2][5], Cell::Int(3));
        assert_eq!(report.table.rows[2][6], Cell::Int(3));
    }

    #[test]
    fn no_duplicates() {
        let s = snapshot_with_ids(&["1", "2", "3"]);
        let report = find_duplicates(&s, &[]).unwrap();
        assert!(report.groups.is_empty());
        assert!(report.table.rows.is_empty());
        assert_eq!(remediate(&s).unwrap(), s);
    }

    #[test]
    fn blank_identifiers_are_an_error() {
        let s = snapshot_with_ids(&["1", "", "2", " "]);
        assert_eq!(
            find_duplicates(&s, &[]),
            Err(CheckError::BlankIdentifiers(vec![2, 4]))
        );
        assert_eq!(remediate(&s), Err(CheckError::BlankIdentifiers(vec![2, 4])));
    }
}
