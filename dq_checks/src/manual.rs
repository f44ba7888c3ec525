/*!

This is the long-form manual for `dq_checks` and `surveydq`.

## Input formats

The following providers are supported for the survey dataset and for the reference table:
* `csv` Comma Separated Values, with a header row
* `xlsx` Excel workbook. The first worksheet is used unless `worksheetName` is given.

The survey dataset has one row per submission. Four columns are mandatory:
the identifier, the enumerator, the geographic unit and the submission
timestamp. The form version column is optional. All the other columns are read
as fields: blank cells are missing values, cells that parse as numbers are
numbers, everything else is text.

```text
hhid,enum_name,village,submissiondate,formdef_version,inc_01,prod_unit,sale_unit
3001,alice,north,2023-03-01 09:12:00,2301,10,kg,kg
3002,bob,south,2023-03-01 10:40:00,2301,12,kg,bag
```

Timestamps are read with `timestampFormat` if it is given, then with the
usual export formats (`2023-03-01 09:12:00`, `2023-03-01T09:12:00`,
`Mar 1, 2023 9:12:00 AM`, `01/03/2023 09:12`, `2023-03-01`). Excel dates are
read natively.

The reference table maps each geographic unit to its expected number of
submissions:

```text
village,target
north,40
south,35
```

## Output

All the results are written to one Excel workbook, one worksheet per check:

| worksheet                   | content                                                    |
|-----------------------------|------------------------------------------------------------|
| `duplicate_check`           | every submission whose identifier is used more than once  |
| `outlier_check`             | every (submission, field) outside of the bounds            |
| `descriptive_stats`         | n, mean, median, sd, min and max of each field             |
| `<grouping>_check`          | per group: submissions, statistics, progress               |
| `<grouping>_by_day`         | per group: submissions on each day                         |
| `survey_programming_check`  | every (submission, rule) that failed                       |
| `check_status`              | the status of every check and the warnings                 |

The standard deviation is the population standard deviation. A check that
fails (for example because of a misconfigured field name) is reported as
`failed` in `check_status` with its reason, and the other checks are still
exported.

Identifiers that are duplicated are renamed `id_1`, `id_2`, ... (in row
order) in the working copy used by the other checks. A blank identifier makes
the duplicate check fail; the other checks then run on the original data.

## Configuration

The program reads a JSON configuration file. Relative paths are resolved
against the directory of the configuration file.

```json
{
  "outputSettings": { "outputPath": "dq_report.xlsx", "summaryPath": "summary.json" },
  "dataSource": { "provider": "csv", "filePath": "survey.csv" },
  "referenceSource": { "provider": "csv", "filePath": "villages.csv",
                       "unitColumn": "village", "expectedColumn": "target" },
  "columns": { "id": "hhid", "enumerator": "enum_name", "unit": "village",
               "submitted": "submissiondate", "formVersion": "formdef_version" },
  "duplicates": { "enabled": true, "outcomeFields": ["inc_01"] },
  "outlierThreshold": 3.0,
  "outliers": [ { "field": "inc_01" }, { "field": "age", "min": 0, "max": 110 } ],
  "descriptiveStats": [ { "field": "inc_01", "label": "Crop income" } ],
  "groupings": [
    { "name": "enumerator", "key": "enumerator", "statFields": ["inc_01"] },
    { "name": "village", "key": "unit", "useReference": true, "includeInactive": false }
  ],
  "rules": [
    { "name": "outdated_form", "kind": "outdatedFormVersion", "value": "2301" },
    { "name": "unit_mismatch", "kind": "fieldsDiffer", "fields": ["prod_unit", "sale_unit"] },
    { "name": "wrong_site", "kind": "fieldEquals", "field": "wrong_site", "value": 1 }
  ]
}
```

Outliers:
 - `threshold` (number, optional): number of standard deviations, defaults to `outlierThreshold`
   (itself 3 by default)
 - `min` and `max` (numbers, optional): if both are given, fixed bounds are used instead

Groupings:
 - `key`: `enumerator`, `unit`, or `field:<name>` to group by the value of any field
 - `useReference` (optional): adds the expected count and the percentage of it.
   Only allowed with the `unit` key.
 - `includeInactive` (optional): also reports the units of the reference table
   without any submission. This is off by default: inactive units are silently
   left out.

Rule kinds:
 - `outdatedFormVersion` (`value`): the form version is older than `value`.
   Requires `columns.formVersion`.
 - `fieldsDiffer` (`fields`, two names): both are filled and different
 - `fieldEquals` (`field`, `value`): the field holds the value
 - `fieldMissing` (`field`): the field is blank
 - `fieldAbove` (`field`, `value`): the number in the field is above `value`

`fieldEquals`, `fieldMissing` and `fieldAbove` also accept `report` (array of
field names): extra values to show next to the issue. Every field named by a
rule must exist in the data, otherwise the check fails.

## Command line

```text
surveydq --config checks.json [--input survey.csv] [--reference-table villages.csv]
         [--out report.xlsx] [--summary summary.json|stdout] [--reference expected.json] [--verbose]
```

The paths given on the command line take precedence over the paths of the
configuration file. The summary is a JSON document with the number of
records, a SHA-256 digest of the data, and the status, row count and warnings
of each check. With `--reference`, the summary is compared to an expected one:
the differences are printed and the program exits with an error.

 */
