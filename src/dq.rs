use log::{debug, info, warn};

use dq_checks::duplicates::{find_duplicates, remediate, DUPLICATE_CHECK};
use dq_checks::groups::{aggregate_by, GroupOptions};
use dq_checks::outliers::{find_outliers, OUTLIER_CHECK};
use dq_checks::rules::{check_rules, Rule, PROGRAMMING_CHECK};
use dq_checks::stats::{describe, DESCRIPTIVE_STATS};
use dq_checks::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Reader, Xlsx};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::dq::config_reader::*;
use crate::dq::export::export_workbook;
use crate::dq::io_common::{build_reference, build_snapshot, RawTable};
use crate::dq::io_csv::read_csv_table;
use crate::dq::io_xlsx::read_excel_table;

pub mod config_reader;
mod export;
mod io_common;
mod io_csv;
mod io_xlsx;

/// The name of the sheet listing the outcome of every check.
pub const CHECK_STATUS: &str = "check_status";

const DEFAULT_OUTPUT: &str = "dq_report.xlsx";
const DEFAULT_EXPECTED_COLUMN: &str = "expected";

// The file formats that can be read.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Provider {
    Csv,
    Xlsx,
}

#[derive(Debug, Snafu)]
pub enum DqError {
    #[snafu(display("Cannot find the input file {path}"))]
    InputNotFound { path: String },
    #[snafu(display("{path}:{lineno}: {message}"))]
    InputFormat {
        path: String,
        lineno: usize,
        message: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Worksheet {worksheet} not found in {path}"))]
    MissingWorksheet { path: String, worksheet: String },
    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading {path} at line {lineno}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Invalid JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfig { message: String },
    #[snafu(display("Cannot write the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Cannot build the workbook {path}"))]
    ExportIo {
        source: rust_xlsxwriter::XlsxError,
        path: String,
    },
    #[snafu(display("Cannot write the workbook {path}"))]
    ExportWrite {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Incomplete export to {path}, failed sheets: {failed}"))]
    ExportIncomplete { path: String, failed: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DqResult<T> = Result<T, DqError>;

/// The result of one check. A failed check has an error and no table.
#[derive(PartialEq, Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub tables: Vec<Table>,
    pub warnings: Vec<String>,
    pub error: Option<CheckError>,
}

impl CheckOutcome {
    fn completed(name: &str, tables: Vec<Table>, warnings: Vec<String>) -> CheckOutcome {
        CheckOutcome {
            name: name.to_string(),
            tables,
            warnings,
            error: None,
        }
    }

    fn failed(name: &str, error: CheckError) -> CheckOutcome {
        warn!("check {} failed: {}", name, error);
        CheckOutcome {
            name: name.to_string(),
            tables: Vec::new(),
            warnings: Vec::new(),
            error: Some(error),
        }
    }

    pub fn status(&self) -> &'static str {
        if self.error.is_some() {
            "failed"
        } else {
            "ok"
        }
    }

    /// The number of rows of the main table of the check.
    pub fn rows(&self) -> usize {
        self.tables.first().map(|t| t.rows.len()).unwrap_or(0)
    }
}

/// Runs all the configured checks.
///
/// The checks are independent: the failure of one of them is recorded in its
/// outcome and the other checks still run. When duplicates are found, the
/// checks after the duplicate check see the remediated working copy. The
/// original snapshot is used when the remediation is not possible.
pub fn run_checks(
    snapshot: &Snapshot,
    reference: Option<&[ReferenceEntry]>,
    plan: &CheckPlan,
) -> Vec<CheckOutcome> {
    let mut outcomes: Vec<CheckOutcome> = Vec::new();
    let mut working: Option<Snapshot> = None;

    if let Some(outcome_fields) = &plan.duplicates {
        match find_duplicates(snapshot, outcome_fields) {
            Ok(report) => {
                info!("run_checks: {} duplicated identifier(s)", report.groups.len());
                if !report.groups.is_empty() {
                    match remediate(snapshot) {
                        Ok(s) => working = Some(s),
                        Err(e) => warn!("run_checks: cannot remediate duplicates: {}", e),
                    }
                }
                outcomes.push(CheckOutcome::completed(
                    DUPLICATE_CHECK,
                    vec![report.table],
                    Vec::new(),
                ));
            }
            Err(e) => outcomes.push(CheckOutcome::failed(DUPLICATE_CHECK, e)),
        }
    }
    let snapshot = working.as_ref().unwrap_or(snapshot);

    if !plan.outliers.is_empty() {
        outcomes.push(match find_outliers(snapshot, &plan.outliers) {
            Ok(report) => {
                let warnings = report.warnings.iter().map(|w| w.to_string()).collect();
                CheckOutcome::completed(OUTLIER_CHECK, vec![report.table], warnings)
            }
            Err(e) => CheckOutcome::failed(OUTLIER_CHECK, e),
        });
    }

    if !plan.descriptive_stats.is_empty() {
        outcomes.push(match describe(snapshot, &plan.descriptive_stats) {
            Ok(table) => CheckOutcome::completed(DESCRIPTIVE_STATS, vec![table], Vec::new()),
            Err(e) => CheckOutcome::failed(DESCRIPTIVE_STATS, e),
        });
    }

    for g in plan.groupings.iter() {
        let name = format!("{}_check", g.name);
        let options = GroupOptions {
            name: g.name.clone(),
            stat_fields: g.stat_fields.clone(),
            reference: if g.use_reference { reference } else { None },
            join: g.join,
        };
        outcomes.push(match aggregate_by(snapshot, &g.key, &options) {
            Ok(report) => {
                CheckOutcome::completed(&name, vec![report.summary, report.by_day], Vec::new())
            }
            Err(e) => CheckOutcome::failed(&name, e),
        });
    }

    if !plan.rules.is_empty() {
        outcomes.push(match check_rules(snapshot, &plan.rules) {
            Ok(table) => CheckOutcome::completed(PROGRAMMING_CHECK, vec![table], Vec::new()),
            Err(e) => CheckOutcome::failed(PROGRAMMING_CHECK, e),
        });
    }

    outcomes
}

pub fn check_status_table(outcomes: &[CheckOutcome]) -> Table {
    let mut table = Table::new(CHECK_STATUS, &["check", "status", "rows", "reason", "warnings"]);
    for o in outcomes.iter() {
        let reason = match &o.error {
            Some(e) => Cell::Text(e.to_string()),
            None => Cell::Empty,
        };
        let warnings = if o.warnings.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(o.warnings.join("; "))
        };
        table.rows.push(vec![
            Cell::from(o.name.as_str()),
            Cell::from(o.status()),
            Cell::Int(o.rows() as i64),
            reason,
            warnings,
        ]);
    }
    table
}

fn build_summary_js(snapshot: &Snapshot, outcomes: &[CheckOutcome]) -> JSValue {
    let checks: Vec<JSValue> = outcomes
        .iter()
        .map(|o| {
            json!({
                "name": o.name,
                "status": o.status(),
                "rows": o.rows(),
                "warnings": o.warnings,
                "reason": o.error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();
    json!({
        "records": snapshot.len(),
        "digest": snapshot.digest(),
        "checks": checks,
    })
}

fn read_summary(path: &str) -> DqResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

// Relative paths in the configuration are relative to the configuration file.
fn resolve(root: &Path, file_path: &str) -> String {
    let p: PathBuf = [root, Path::new(file_path)].iter().collect();
    p.display().to_string()
}

fn read_source(source: &FileSource) -> DqResult<RawTable> {
    info!("Attempting to read {:?}", source.file_path);
    match source.provider()? {
        Provider::Csv => read_csv_table(&source.file_path),
        Provider::Xlsx => {
            read_excel_table(&source.file_path, source.worksheet_name.as_deref())
        }
    }
}

pub fn load_snapshot(source: &FileSource, columns: &ColumnSettings) -> DqResult<Snapshot> {
    let raw = read_source(source)?;
    build_snapshot(&raw, columns)
}

pub fn load_reference(
    source: &FileSource,
    columns: &ColumnSettings,
) -> DqResult<Vec<ReferenceEntry>> {
    let raw = read_source(source)?;
    let unit_column = source.unit_column.as_deref().unwrap_or(&columns.unit);
    let expected_column = source
        .expected_column
        .as_deref()
        .unwrap_or(DEFAULT_EXPECTED_COLUMN);
    build_reference(&raw, unit_column, expected_column)
}

/// The command line settings of a run. The paths given here take precedence over
/// the paths of the configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RunSettings {
    pub config: String,
    pub input: Option<String>,
    pub reference_table: Option<String>,
    pub out: Option<String>,
    /// A file path or `stdout`.
    pub summary: Option<String>,
    /// A reference summary to compare against.
    pub reference: Option<String>,
}

/// Runs all the checks described by a configuration file and writes the workbook.
///
/// Returns the JSON summary of the run.
pub fn run(settings: &RunSettings) -> DqResult<JSValue> {
    let config_p = Path::new(settings.config.as_str());
    let config = read_config(&settings.config)?;
    info!("config: {:?}", config);
    let plan = validate_config(&config)?;
    debug!("plan: {:?}", plan);

    let root_p = config_p.parent().unwrap_or_else(|| Path::new(""));
    let data_source = FileSource {
        file_path: match &settings.input {
            Some(p) => p.clone(),
            None => resolve(root_p, &config.data_source.file_path),
        },
        ..config.data_source.clone()
    };
    let reference_source = match (&config.reference_source, &settings.reference_table) {
        (Some(rs), Some(p)) => Some(FileSource {
            file_path: p.clone(),
            ..rs.clone()
        }),
        (Some(rs), None) => Some(FileSource {
            file_path: resolve(root_p, &rs.file_path),
            ..rs.clone()
        }),
        (None, Some(p)) => {
            return InvalidConfigSnafu {
                message: format!(
                    "the reference table {} is given but no referenceSource is configured",
                    p
                ),
            }
            .fail()
        }
        (None, None) => None,
    };
    let output_settings = config.output_settings.clone().unwrap_or_default();
    let out_path = match (&settings.out, &output_settings.output_path) {
        (Some(p), _) => p.clone(),
        (None, Some(p)) => resolve(root_p, p),
        (None, None) => resolve(root_p, DEFAULT_OUTPUT),
    };
    let summary_path = match (&settings.summary, &output_settings.summary_path) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(p)) if p == "stdout" => Some(p.clone()),
        (None, Some(p)) => Some(resolve(root_p, p)),
        (None, None) => None,
    };

    // Loading failures abort the run.
    let snapshot = load_snapshot(&data_source, &config.columns)?;
    let reference = match &reference_source {
        Some(rs) => Some(load_reference(rs, &config.columns)?),
        None => None,
    };

    let outcomes = run_checks(&snapshot, reference.as_deref(), &plan);
    let status = check_status_table(&outcomes);
    let mut tables: Vec<&Table> = outcomes.iter().flat_map(|o| o.tables.iter()).collect();
    tables.push(&status);
    let export = export_workbook(&out_path, &tables)?;

    let summary_js = build_summary_js(&snapshot, &outcomes);
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;
    match summary_path.as_deref() {
        Some("stdout") => println!("{}", pretty_js_stats),
        Some(p) => {
            fs::write(p, &pretty_js_stats).context(WritingSummarySnafu { path: p })?;
            info!("summary written to {}", p);
        }
        None => {}
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &settings.reference {
        let summary_ref = read_summary(summary_p)?;
        debug!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    if !export.is_complete() {
        let failed: Vec<&str> = export.failed.iter().map(|(n, _)| n.as_str()).collect();
        return ExportIncompleteSnafu {
            path: out_path,
            failed: failed.join(", "),
        }
        .fail();
    }
    Ok(summary_js)
}
