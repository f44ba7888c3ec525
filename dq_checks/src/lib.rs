/*!
Data-quality checks for field-survey data.

All the checks work on an immutable [`Snapshot`] of the submissions and
produce named [`Table`]s. They do not depend on each other: a failure in one
check leaves the results of the other checks valid.

- [`duplicates`] identifiers used by more than one submission, and a remediated
  working copy with unique identifiers
- [`outliers`] values too far from the mean, or outside of fixed bounds
- [`stats`] descriptive statistics per field
- [`groups`] per-enumerator or per-unit counts by day, statistics and progress
  against an expected number of submissions
- [`rules`] named survey-programming invariants

See the [`manual`] for the configuration file used by the `surveydq` program.
*/

mod config;
pub mod builder;
pub mod duplicates;
pub mod groups;
pub mod manual;
pub mod outliers;
pub mod rules;
pub mod stats;

pub use crate::config::*;
