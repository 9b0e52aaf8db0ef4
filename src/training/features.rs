//! Table to matrix conversion for the estimators

use crate::error::{Result, WizardError};
use crate::table::{column_kind, series, ColumnKind};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::BTreeSet;

fn reject_nulls(s: &Series) -> Result<()> {
    if s.null_count() > 0 {
        return Err(WizardError::NullValues {
            column: s.name().to_string(),
            count: s.null_count(),
        });
    }
    Ok(())
}

/// Numeric or boolean column as `f64` values; text must be encoded first.
fn feature_values(s: &Series) -> Result<Vec<f64>> {
    match column_kind(s.dtype()) {
        ColumnKind::Numeric | ColumnKind::Boolean => {}
        _ => return Err(WizardError::NonNumericColumn(s.name().to_string())),
    }
    reject_nulls(s)?;
    let casted = s.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Row-major feature matrix over `names`, in that order
pub fn feature_matrix<S: AsRef<str>>(df: &DataFrame, names: &[S]) -> Result<Array2<f64>> {
    let columns = names
        .iter()
        .map(|name| feature_values(series(df, name.as_ref())?))
        .collect::<Result<Vec<_>>>()?;
    Ok(Array2::from_shape_fn((df.height(), columns.len()), |(i, j)| columns[j][i]))
}

/// Numeric regression target
pub fn regression_target(s: &Series) -> Result<Array1<f64>> {
    if column_kind(s.dtype()) != ColumnKind::Numeric {
        return Err(WizardError::NonNumericColumn(s.name().to_string()));
    }
    reject_nulls(s)?;
    let casted = s.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Render a class value the way it appears in reports
fn number_label(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Class codes `0..k` for a classification target, plus the label of each code.
///
/// Classes are the sorted distinct values: numeric order for numbers,
/// lexicographic order for everything else.
pub fn class_codes(s: &Series) -> Result<(Array1<f64>, Vec<String>)> {
    reject_nulls(s)?;

    let (values, labels): (Vec<String>, Vec<String>) = if column_kind(s.dtype()) == ColumnKind::Numeric {
        let casted = s.cast(&DataType::Float64)?;
        let numbers: Vec<f64> = casted.f64()?.into_iter().flatten().collect();
        let mut distinct = numbers.clone();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();
        (
            numbers.into_iter().map(number_label).collect(),
            distinct.into_iter().map(number_label).collect(),
        )
    } else {
        let casted = s.cast(&DataType::String)?;
        let texts: Vec<String> = casted.str()?.into_iter().flatten().map(str::to_string).collect();
        let distinct: BTreeSet<String> = texts.iter().cloned().collect();
        (texts, distinct.into_iter().collect())
    };

    let codes = values
        .iter()
        .map(|v| labels.iter().position(|l| l == v).unwrap_or(0) as f64)
        .collect();
    Ok((codes, labels))
}
