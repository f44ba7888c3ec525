use crate::dq::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
    #[serde(rename = "summaryPath")]
    pub summary_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    /// `csv` or `xlsx`. Inferred from the file extension when absent.
    pub provider: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "worksheetName")]
    pub worksheet_name: Option<String>,
    // Only for the reference table
    #[serde(rename = "unitColumn")]
    pub unit_column: Option<String>,
    #[serde(rename = "expectedColumn")]
    pub expected_column: Option<String>,
}

impl FileSource {
    pub fn provider(&self) -> DqResult<Provider> {
        let p = match &self.provider {
            Some(p) => p.to_lowercase(),
            None => Path::new(&self.file_path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase(),
        };
        match p.as_str() {
            "csv" => Ok(Provider::Csv),
            "xlsx" | "excel" => Ok(Provider::Xlsx),
            x => InvalidConfigSnafu {
                message: format!("unknown provider {:?} for {}", x, self.file_path),
            }
            .fail(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSettings {
    pub id: String,
    pub enumerator: String,
    pub unit: String,
    pub submitted: String,
    #[serde(rename = "formVersion")]
    pub form_version: Option<String>,
    #[serde(rename = "timestampFormat")]
    pub timestamp_format: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateSettings {
    pub enabled: Option<bool>,
    #[serde(rename = "outcomeFields")]
    pub outcome_fields: Option<Vec<String>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutlierSettings {
    pub field: String,
    pub threshold: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StatSettings {
    pub field: String,
    pub label: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GroupingSettings {
    pub name: String,
    pub key: String,
    #[serde(rename = "statFields")]
    pub stat_fields: Option<Vec<String>>,
    #[serde(rename = "useReference")]
    pub use_reference: Option<bool>,
    #[serde(rename = "includeInactive")]
    pub include_inactive: Option<bool>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RuleSettings {
    pub name: String,
    pub kind: String,
    pub field: Option<String>,
    pub fields: Option<Vec<String>>,
    pub value: Option<JSValue>,
    pub report: Option<Vec<String>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DqConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: Option<OutputSettings>,
    #[serde(rename = "dataSource")]
    pub data_source: FileSource,
    #[serde(rename = "referenceSource")]
    pub reference_source: Option<FileSource>,
    pub columns: ColumnSettings,
    pub duplicates: Option<DuplicateSettings>,
    #[serde(rename = "outlierThreshold")]
    pub outlier_threshold: Option<f64>,
    pub outliers: Option<Vec<OutlierSettings>>,
    #[serde(rename = "descriptiveStats")]
    pub descriptive_stats: Option<Vec<StatSettings>>,
    pub groupings: Option<Vec<GroupingSettings>>,
    pub rules: Option<Vec<RuleSettings>>,
}

pub fn read_config(path: &str) -> DqResult<DqConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: DqConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// A grouping, validated.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupingPlan {
    pub name: String,
    pub key: GroupKey,
    pub stat_fields: Vec<String>,
    pub use_reference: bool,
    pub join: JoinMode,
}

/// Everything the checks need, read once from the configuration.
#[derive(Debug)]
pub struct CheckPlan {
    /// The outcome fields to report, if the duplicate check is enabled.
    pub duplicates: Option<Vec<String>>,
    pub outliers: Vec<OutlierSpec>,
    pub descriptive_stats: Vec<(String, String)>,
    pub groupings: Vec<GroupingPlan>,
    pub rules: Vec<Rule>,
}

fn validate_outliers(config: &DqConfig) -> DqResult<Vec<OutlierSpec>> {
    let default_k = config
        .outlier_threshold
        .unwrap_or(OutlierBound::DEFAULT_THRESHOLD);
    let mut res: Vec<OutlierSpec> = Vec::new();
    for o in config.outliers.clone().unwrap_or_default() {
        let bound = match (o.min, o.max, o.threshold) {
            (Some(min), Some(max), None) => OutlierBound::Absolute { min, max },
            (None, None, k) => OutlierBound::Relative(k.unwrap_or(default_k)),
            x => {
                return InvalidConfigSnafu {
                    message: format!(
                        "outlier check on {}: give either a threshold or both min and max, \
                         got {:?}",
                        o.field, x
                    ),
                }
                .fail()
            }
        };
        res.push(OutlierSpec {
            field: o.field,
            bound,
        });
    }
    Ok(res)
}

fn validate_grouping(g: &GroupingSettings, has_reference: bool) -> DqResult<GroupingPlan> {
    let key = match g.key.as_str() {
        "enumerator" => GroupKey::Enumerator,
        "unit" => GroupKey::Unit,
        x => match x.strip_prefix("field:") {
            Some(f) if !f.is_empty() => GroupKey::Field(f.to_string()),
            _ => {
                return InvalidConfigSnafu {
                    message: format!("grouping {}: unknown key {:?}", g.name, x),
                }
                .fail()
            }
        },
    };
    let use_reference = g.use_reference.unwrap_or(false);
    // The reference table gives expected counts per geographic unit.
    if use_reference && key != GroupKey::Unit {
        return InvalidConfigSnafu {
            message: format!("grouping {}: useReference requires the unit key", g.name),
        }
        .fail();
    }
    if use_reference && !has_reference {
        return InvalidConfigSnafu {
            message: format!(
                "grouping {} uses the reference table, but none is configured",
                g.name
            ),
        }
        .fail();
    }
    let join = match g.include_inactive {
        Some(true) if use_reference => JoinMode::Right,
        Some(true) => {
            return InvalidConfigSnafu {
                message: format!("grouping {}: includeInactive requires useReference", g.name),
            }
            .fail()
        }
        _ => JoinMode::Left,
    };
    Ok(GroupingPlan {
        name: g.name.clone(),
        key,
        stat_fields: g.stat_fields.clone().unwrap_or_default(),
        use_reference,
        join,
    })
}

fn js_to_value(js: &JSValue) -> Option<Value> {
    match js {
        JSValue::Number(n) => n.as_f64().map(Value::Number),
        JSValue::String(s) => Some(Value::Text(s.clone())),
        JSValue::Bool(b) => Some(Value::Number(if *b { 1.0 } else { 0.0 })),
        _ => None,
    }
}

fn validate_rule(r: &RuleSettings, has_form_version: bool) -> DqResult<Rule> {
    let fail = |what: &str| {
        InvalidConfigSnafu {
            message: format!("rule {} ({}): {}", r.name, r.kind, what),
        }
        .fail()
    };
    let report = r.report.clone().unwrap_or_default();
    let rule = match r.kind.as_str() {
        "outdatedFormVersion" if !has_form_version => {
            return fail("columns.formVersion is not configured")
        }
        "outdatedFormVersion" => match r.value.as_ref().and_then(js_to_value) {
            Some(v) => Rule::outdated_form_version(&r.name, &v.to_string()),
            None => return fail("missing value"),
        },
        "fieldsDiffer" => match r.fields.as_deref() {
            Some([a, b]) => Rule::fields_differ(&r.name, a, b),
            _ => return fail("fields must name exactly two fields"),
        },
        "fieldEquals" => match (&r.field, r.value.as_ref().and_then(js_to_value)) {
            (Some(f), Some(v)) => Rule::field_equals(&r.name, f, v, &report),
            _ => return fail("field and value are required"),
        },
        "fieldMissing" => match &r.field {
            Some(f) => Rule::field_missing(&r.name, f, &report),
            None => return fail("field is required"),
        },
        "fieldAbove" => match (&r.field, r.value.as_ref().and_then(|v| v.as_f64())) {
            (Some(f), Some(limit)) => Rule::field_above(&r.name, f, limit, &report),
            _ => return fail("field and a numeric value are required"),
        },
        _ => return fail("unknown rule kind"),
    };
    Ok(rule)
}

/// Validates the configuration once, before loading any data.
pub fn validate_config(config: &DqConfig) -> DqResult<CheckPlan> {
    let has_reference = config.reference_source.is_some();
    let duplicates = match &config.duplicates {
        Some(DuplicateSettings {
            enabled: Some(false),
            ..
        }) => None,
        Some(d) => Some(d.outcome_fields.clone().unwrap_or_default()),
        None => Some(Vec::new()),
    };
    let descriptive_stats = config
        .descriptive_stats
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|s| {
            let label = s.label.unwrap_or_else(|| s.field.clone());
            (s.field, label)
        })
        .collect();
    let groupings = config
        .groupings
        .clone()
        .unwrap_or_default()
        .iter()
        .map(|g| validate_grouping(g, has_reference))
        .collect::<DqResult<Vec<GroupingPlan>>>()?;
    let rules = config
        .rules
        .clone()
        .unwrap_or_default()
        .iter()
        .map(|r| validate_rule(r, config.columns.form_version.is_some()))
        .collect::<DqResult<Vec<Rule>>>()?;
    Ok(CheckPlan {
        duplicates,
        outliers: validate_outliers(config)?,
        descriptive_stats,
        groupings,
        rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> DqConfig {
        let js = format!(
            r#"{{
            "dataSource": {{ "filePath": "survey.csv" }},
            "columns": {{ "id": "hhid", "enumerator": "enum", "unit": "village", "submitted": "date",
                         "formVersion": "version" }}
            {}
        }}"#,
            extra
        );
        serde_json::from_str(&js).unwrap()
    }

    #[test]
    fn defaults() {
        let c = config("");
        assert_eq!(c.data_source.provider().unwrap(), Provider::Csv);
        let plan = validate_config(&c).unwrap();
        assert_eq!(plan.duplicates, Some(vec![]));
        assert!(plan.outliers.is_empty());
        assert!(plan.rules.is_empty());
    }

    #[test]
    fn outliers_and_groupings() {
        let c = config(
            r#", "outlierThreshold": 2.5,
            "referenceSource": { "filePath": "villages.xlsx", "unitColumn": "village", "expectedColumn": "target" },
            "outliers": [ { "field": "a" }, { "field": "b", "threshold": 4 }, { "field": "c", "min": 0, "max": 10 } ],
            "groupings": [ { "name": "village", "key": "unit", "useReference": true, "includeInactive": true },
                           { "name": "team", "key": "field:team" } ]"#,
        );
        let plan = validate_config(&c).unwrap();
        let bounds: Vec<OutlierBound> = plan.outliers.iter().map(|o| o.bound).collect();
        assert_eq!(
            bounds,
            vec![
                OutlierBound::Relative(2.5),
                OutlierBound::Relative(4.0),
                OutlierBound::Absolute { min: 0.0, max: 10.0 }
            ]
        );
        assert_eq!(plan.groupings[0].join, JoinMode::Right);
        assert_eq!(plan.groupings[1].key, GroupKey::Field("team".to_string()));
        assert_eq!(plan.groupings[1].join, JoinMode::Left);
        assert_eq!(
            c.reference_source.unwrap().provider().unwrap(),
            Provider::Xlsx
        );
    }

    #[test]
    fn rules() {
        let c = config(
            r#", "rules": [
                { "name": "old", "kind": "outdatedFormVersion", "value": 2301 },
                { "name": "units", "kind": "fieldsDiffer", "fields": ["a", "b"] },
                { "name": "site", "kind": "fieldEquals", "field": "wrong_site", "value": 1, "report": ["crop"] },
                { "name": "gps", "kind": "fieldMissing", "field": "gps" },
                { "name": "plots", "kind": "fieldAbove", "field": "plots", "value": 20 }
            ]"#,
        );
        let plan = validate_config(&c).unwrap();
        let names: Vec<&str> = plan.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["old", "units", "site", "gps", "plots"]);
    }

    #[test]
    fn form_version_rule_needs_the_column() {
        let mut c = config(
            r#", "rules": [ { "name": "old", "kind": "outdatedFormVersion", "value": 2301 } ]"#,
        );
        assert!(validate_config(&c).is_ok());
        c.columns.form_version = None;
        match validate_config(&c) {
            Err(DqError::InvalidConfig { message }) => assert!(message.contains("formVersion")),
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn invalid_configurations() {
        for extra in [
            r#", "rules": [ { "name": "x", "kind": "sometimes" } ]"#,
            r#", "rules": [ { "name": "x", "kind": "fieldsDiffer", "fields": ["a"] } ]"#,
            r#", "groupings": [ { "name": "x", "key": "team" } ]"#,
            r#", "groupings": [ { "name": "x", "key": "unit", "useReference": true } ]"#,
            r#", "referenceSource": { "filePath": "villages.csv" },
                "groupings": [ { "name": "x", "key": "enumerator", "useReference": true,
                                 "includeInactive": true } ]"#,
            r#", "referenceSource": { "filePath": "villages.csv" },
                "groupings": [ { "name": "x", "key": "field:team", "useReference": true } ]"#,
            r#", "outliers": [ { "field": "a", "min": 0 } ]"#,
        ] {
            let res = validate_config(&config(extra));
            assert!(
                matches!(res, Err(DqError::InvalidConfig { .. })),
                "{}: {:?}",
                extra,
                res
            );
        }
    }
}
