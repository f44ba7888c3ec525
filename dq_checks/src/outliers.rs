use log::{debug, info, warn};

use crate::config::*;
use crate::stats::{mean, std_dev};

pub const OUTLIER_CHECK: &str = "outlier_check";

/// The bounds that were applied to one field.
#[derive(PartialEq, Debug, Clone)]
pub struct FieldBounds {
    pub field: String,
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub upper: f64,
}

/// One value outside of the bounds of its field.
#[derive(PartialEq, Debug, Clone)]
pub struct Flag {
    pub row: usize,
    pub field: String,
    pub value: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct OutlierReport {
    pub bounds: Vec<FieldBounds>,
    pub flags: Vec<Flag>,
    pub warnings: Vec<Degeneracy>,
    pub table: Table,
}

fn validate(spec: &OutlierSpec) -> Result<(), CheckError> {
    match spec.bound {
        OutlierBound::Relative(k) if !(k.is_finite() && k > 0.0) => {
            Err(CheckError::InvalidThreshold(k))
        }
        OutlierBound::Absolute { min, max } if min > max => Err(CheckError::InvalidBounds {
            field: spec.field.clone(),
            min,
            max,
        }),
        _ => Ok(()),
    }
}

// The bounds of a field, or the reason why it cannot be checked.
fn field_bounds(snapshot: &Snapshot, spec: &OutlierSpec) -> Result<FieldBounds, DegeneracyKind> {
    let values = snapshot.numbers(&spec.field);
    let (mu, sigma) = match (mean(&values), std_dev(&values)) {
        (Some(mu), Some(sigma)) => (mu, sigma),
        _ => return Err(DegeneracyKind::AllMissing),
    };
    let (lower, upper) = match spec.bound {
        OutlierBound::Relative(_) if sigma == 0.0 => return Err(DegeneracyKind::ZeroVariance),
        OutlierBound::Relative(k) => (mu - k * sigma, mu + k * sigma),
        OutlierBound::Absolute { min, max } => (min, max),
    };
    Ok(FieldBounds {
        field: spec.field.clone(),
        mean: mu,
        sd: sigma,
        lower,
        upper,
    })
}

/// Flags the values that are too far from the other values of the same field.
///
/// The fields are processed in the order given. The mean and the standard
/// deviation are computed over the non-missing values of the current snapshot.
/// In relative mode, a value `v` is flagged when `|v - mean| > k * sd`. In absolute
/// mode, it is flagged when it is outside of `[min, max]`.
///
/// Fields without any value, and fields with zero variance in relative mode, are
/// skipped with a warning.
pub fn find_outliers(
    snapshot: &Snapshot,
    specs: &[OutlierSpec],
) -> Result<OutlierReport, CheckError> {
    for spec in specs.iter() {
        if !snapshot.has_field(&spec.field) {
            return Err(CheckError::UnknownField(spec.field.clone()));
        }
        validate(spec)?;
    }

    let mut table = Table::new(
        OUTLIER_CHECK,
        &[
            "id",
            "enumerator",
            "unit",
            "field",
            "value",
            "mean",
            "sd",
            "lower",
            "upper",
        ],
    );
    let mut all_bounds: Vec<FieldBounds> = Vec::new();
    let mut flags: Vec<Flag> = Vec::new();
    let mut warnings: Vec<Degeneracy> = Vec::new();

    for spec in specs.iter() {
        let b = match field_bounds(snapshot, spec) {
            Ok(b) => b,
            Err(kind) => {
                let d = Degeneracy {
                    field: spec.field.clone(),
                    kind,
                };
                warn!("find_outliers: {}", d);
                warnings.push(d);
                continue;
            }
        };
        debug!("find_outliers: bounds {:?}", b);
        for r in snapshot.records.iter() {
            let v = match r.value(&spec.field).as_number() {
                Some(v) => v,
                None => continue,
            };
            let is_outlier = match spec.bound {
                OutlierBound::Relative(k) => (v - b.mean).abs() > k * b.sd,
                OutlierBound::Absolute { min, max } => v < min || v > max,
            };
            if is_outlier {
                table.rows.push(vec![
                    Cell::from(r.id.as_str()),
                    Cell::from(r.enumerator.as_str()),
                    Cell::from(r.unit.as_str()),
                    Cell::from(spec.field.as_str()),
                    Cell::Number(v),
                    Cell::Number(b.mean),
                    Cell::Number(b.sd),
                    Cell::Number(b.lower),
                    Cell::Number(b.upper),
                ]);
                flags.push(Flag {
                    row: r.row,
                    field: spec.field.clone(),
                    value: v,
                });
            }
        }
        all_bounds.push(b);
    }
    info!(
        "find_outliers: {} flag(s) over {} field(s)",
        flags.len(),
        specs.len()
    );
    Ok(OutlierReport {
        bounds: all_bounds,
        flags,
        warnings,
        table,
    })
}
