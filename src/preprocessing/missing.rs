//! Missing value handling
//!
//! One strategy per column. Statistics are computed on the column as it
//! stands when the strategy runs, so an earlier `Drop` on another column
//! changes what a later `Mean` sees.

use crate::error::{Result, WizardError};
use crate::table::{column_kind, numeric_values, series, ColumnKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Strategy for a column that contains nulls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    /// Leave the nulls in place
    #[default]
    None,
    /// Remove every row with a null in this column
    Drop,
    /// Fill with the mean of the non-null values (numeric only)
    Mean,
    /// Fill with the median of the non-null values (numeric only)
    Median,
    /// Fill with the most frequent value; ties go to the smallest
    Mode,
    /// Fill with zero (`false` for booleans, `"0"` for text)
    Zero,
}

impl fmt::Display for MissingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingStrategy::None => "none",
            MissingStrategy::Drop => "drop",
            MissingStrategy::Mean => "mean",
            MissingStrategy::Median => "median",
            MissingStrategy::Mode => "mode",
            MissingStrategy::Zero => "zero",
        };
        write!(f, "{}", name)
    }
}

/// Apply `strategy` to `column`, returning a new table.
///
/// A column without nulls is returned unchanged whatever the strategy.
pub fn handle_missing(df: &DataFrame, column: &str, strategy: MissingStrategy) -> Result<DataFrame> {
    let s = series(df, column)?;
    if strategy == MissingStrategy::None || s.null_count() == 0 {
        return Ok(df.clone());
    }

    if strategy == MissingStrategy::Drop {
        let mask = s.is_not_null();
        return Ok(df.filter(&mask)?);
    }

    let filled = match strategy {
        MissingStrategy::Mean | MissingStrategy::Median => {
            let values = numeric_values(s)?;
            if values.is_empty() {
                return Err(degenerate(column, strategy));
            }
            let stat = if strategy == MissingStrategy::Mean {
                mean(&values)
            } else {
                median(&values)
            };
            fill_f64(s, stat)?
        }
        MissingStrategy::Mode => match column_kind(s.dtype()) {
            ColumnKind::Numeric => {
                let values = numeric_values(s)?;
                let mode = numeric_mode(&values).ok_or_else(|| degenerate(column, strategy))?;
                fill_numeric(s, mode)?
            }
            ColumnKind::Boolean => {
                let mode = bool_mode(s)?.ok_or_else(|| degenerate(column, strategy))?;
                fill_bool(s, mode)?
            }
            ColumnKind::Categorical => {
                let mode = text_mode(s)?.ok_or_else(|| degenerate(column, strategy))?;
                fill_str(s, &mode)?
            }
            ColumnKind::Other => return Err(unfillable(s)),
        },
        MissingStrategy::Zero => match column_kind(s.dtype()) {
            ColumnKind::Numeric => fill_numeric(s, 0.0)?,
            ColumnKind::Boolean => fill_bool(s, false)?,
            ColumnKind::Categorical => fill_str(s, "0")?,
            ColumnKind::Other => return Err(unfillable(s)),
        },
        MissingStrategy::None | MissingStrategy::Drop => unreachable!("handled above"),
    };

    let mut result = df.clone();
    result.with_column(filled)?;
    Ok(result)
}

fn degenerate(column: &str, strategy: MissingStrategy) -> WizardError {
    WizardError::DegenerateStatistic {
        column: column.to_string(),
        statistic: strategy.to_string(),
    }
}

fn unfillable(s: &Series) -> WizardError {
    WizardError::InvalidInput(format!(
        "column '{}' of type {} cannot be filled",
        s.name(),
        s.dtype()
    ))
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Most frequent value, smallest on ties
pub(crate) fn numeric_mode(values: &[f64]) -> Option<f64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in values {
        // +0.0 and -0.0 count as one value
        let key = if *v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(bits, count)| (f64::from_bits(bits), count))
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.total_cmp(&a.0)))
        .map(|(value, _)| value)
}

fn bool_mode(s: &Series) -> Result<Option<bool>> {
    let ca = s.bool()?;
    let trues = ca.into_iter().flatten().filter(|v| *v).count();
    let falses = ca.into_iter().flatten().filter(|v| !*v).count();
    Ok(match (trues, falses) {
        (0, 0) => None,
        (t, f) if t > f => Some(true),
        _ => Some(false),
    })
}

/// Most frequent text value, lexicographically smallest on ties
pub(crate) fn text_mode(s: &Series) -> Result<Option<String>> {
    let casted = s.cast(&DataType::String)?;
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in casted.str()?.into_iter().flatten() {
        *counts.entry(v).or_insert(0) += 1;
    }
    // BTreeMap iterates ascending, so the first maximum is the smallest value
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    Ok(best.map(|(v, _)| v.to_string()))
}

fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Fill a numeric column, keeping integer columns integral when the value allows it.
fn fill_numeric(s: &Series, value: f64) -> Result<Series> {
    if is_integer_dtype(s.dtype()) && value.fract() == 0.0 {
        let casted = s.cast(&DataType::Int64)?;
        let filled: Int64Chunked = casted
            .i64()?
            .into_iter()
            .map(|opt| Some(opt.unwrap_or(value as i64)))
            .collect();
        Ok(filled.with_name(s.name().clone()).into_series())
    } else {
        fill_f64(s, value)
    }
}

fn fill_f64(s: &Series, value: f64) -> Result<Series> {
    let casted = s.cast(&DataType::Float64)?;
    let filled: Float64Chunked = casted
        .f64()?
        .into_iter()
        .map(|opt| Some(opt.unwrap_or(value)))
        .collect();
    Ok(filled.with_name(s.name().clone()).into_series())
}

fn fill_bool(s: &Series, value: bool) -> Result<Series> {
    let filled: BooleanChunked = s
        .bool()?
        .into_iter()
        .map(|opt| Some(opt.unwrap_or(value)))
        .collect();
    Ok(filled.with_name(s.name().clone()).into_series())
}

fn fill_str(s: &Series, value: &str) -> Result<Series> {
    let casted = s.cast(&DataType::String)?;
    let filled: StringChunked = casted
        .str()?
        .into_iter()
        .map(|opt| Some(opt.unwrap_or(value).to_string()))
        .collect();
    Ok(filled.with_name(s.name().clone()).into_series())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_mean_fill() {
        let df = df!("a" => &[Some(1.0), None, Some(3.0)]).unwrap();
        let out = handle_missing(&df, "a", MissingStrategy::Mean).unwrap();
        assert_eq!(f64_values(&out, "a"), vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_median_fill() {
        let df = df!("a" => &[Some(1.0), None, Some(3.0), Some(100.0)]).unwrap();
        let out = handle_missing(&df, "a", MissingStrategy::Median).unwrap();
        assert_eq!(
            f64_values(&out, "a"),
            vec![Some(1.0), Some(3.0), Some(3.0), Some(100.0)]
        );
    }

    #[test]
    fn test_mean_on_integer_column_becomes_float() {
        let df = df!("a" => &[Some(1i64), None, Some(2)]).unwrap();
        let out = handle_missing(&df, "a", MissingStrategy::Mean).unwrap();
        assert_eq!(out.column("a").unwrap().dtype(), &DataType::Float64);
        assert_eq!(f64_values(&out, "a")[1], Some(1.5));
    }

    #[test]
    fn test_drop_removes_whole_rows() {
        let df = df!(
            "a" => &[Some(1.0), Some(2.0), None, Some(4.0), Some(5.0), None],
            "b" => &["u", "v", "w", "x", "y", "z"],
        )
        .unwrap();
        let out = handle_missing(&df, "a", MissingStrategy::Drop).unwrap();
        assert_eq!(out.height(), 4);
        let b: Vec<&str> = out.column("b").unwrap().str().unwrap().into_iter().flatten().collect();
        assert_eq!(b, vec!["u", "v", "x", "y"]);
    }

    #[test]
    fn test_mode_ties_pick_smallest() {
        let df = df!("c" => &[Some("b"), Some("a"), None, Some("b"), Some("a")]).unwrap();
        let out = handle_missing(&df, "c", MissingStrategy::Mode).unwrap();
        assert_eq!(out.column("c").unwrap().str().unwrap().get(2), Some("a"));

        assert_eq!(numeric_mode(&[3.0, 1.0, 3.0, 1.0, 2.0]), Some(1.0));
    }

    #[test]
    fn test_mode_on_integer_column_stays_integer() {
        let df = df!("n" => &[Some(7i32), Some(7), None]).unwrap();
        let out = handle_missing(&df, "n", MissingStrategy::Mode).unwrap();
        let col = out.column("n").unwrap();
        assert_eq!(col.dtype(), &DataType::Int64);
        assert_eq!(col.i64().unwrap().get(2), Some(7));
    }

    #[test]
    fn test_mode_without_values_is_degenerate() {
        let df = df!("a" => &[None::<f64>, None]).unwrap();
        let err = handle_missing(&df, "a", MissingStrategy::Mode).unwrap_err();
        assert!(matches!(err, WizardError::DegenerateStatistic { ref column, .. } if column == "a"));
    }

    #[test]
    fn test_mean_on_text_is_rejected() {
        let df = df!("c" => &[Some("x"), None]).unwrap();
        let err = handle_missing(&df, "c", MissingStrategy::Mean).unwrap_err();
        assert!(matches!(err, WizardError::NonNumericColumn(_)));
    }

    #[test]
    fn test_zero_fill_by_kind() {
        let df = df!(
            "n" => &[Some(1.5), None],
            "b" => &[None, Some(true)],
            "t" => &[None, Some("x")],
        )
        .unwrap();
        let out = handle_missing(&df, "n", MissingStrategy::Zero).unwrap();
        let out = handle_missing(&out, "b", MissingStrategy::Zero).unwrap();
        let out = handle_missing(&out, "t", MissingStrategy::Zero).unwrap();
        assert_eq!(out.column("n").unwrap().f64().unwrap().get(1), Some(0.0));
        assert_eq!(out.column("b").unwrap().bool().unwrap().get(0), Some(false));
        assert_eq!(out.column("t").unwrap().str().unwrap().get(0), Some("0"));
    }

    #[test]
    fn test_none_and_clean_columns_are_untouched() {
        let df = df!("a" => &[Some(1.0), None]).unwrap();
        let out = handle_missing(&df, "a", MissingStrategy::None).unwrap();
        assert_eq!(out.column("a").unwrap().null_count(), 1);

        let clean = df!("a" => &[None::<f64>, None], "b" => &[1.0, 2.0]).unwrap();
        assert!(handle_missing(&clean, "b", MissingStrategy::Mode).is_ok());
    }
}
