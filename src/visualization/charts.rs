//! Chart builders
//!
//! Each builder reads a table and returns plain series data; drawing is the
//! client's job.

use crate::error::{Result, WizardError};
use crate::table::{any_value_to_text, column_kind, numeric_columns, series, ColumnKind};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub color: Option<String>,
}

/// Five-number summary of one box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSummary {
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Half-open bin `[start, end)`; the last bin also holds `end`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    /// `[x, y]` pairs sorted by x
    pub points: Vec<[f64; 2]>,
}

/// Per-row values of a numeric column
pub(crate) fn numeric_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let s = series(df, name)?;
    if column_kind(s.dtype()) != ColumnKind::Numeric {
        return Err(WizardError::NonNumericColumn(name.to_string()));
    }
    let casted = s.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

/// Per-row values of any column, as text
fn text_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let s = series(df, name)?.rechunk();
    Ok(s.iter().map(|v| any_value_to_text(&v)).collect())
}

/// Pearson correlation over pairwise complete rows; `None` when undefined
fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        None
    } else {
        Some((cov / denom).clamp(-1.0, 1.0))
    }
}

/// Correlation matrix over every numeric column
pub fn correlation_matrix(df: &DataFrame) -> Result<(Vec<String>, Vec<Vec<Option<f64>>>)> {
    let columns = numeric_columns(df);
    if columns.is_empty() {
        return Err(WizardError::InvalidInput(
            "correlation heatmap needs at least one numeric column".to_string(),
        ));
    }
    let cells = columns
        .iter()
        .map(|name| numeric_cells(df, name))
        .collect::<Result<Vec<_>>>()?;

    let matrix: Vec<Vec<Option<f64>>> = cells
        .par_iter()
        .map(|row| cells.iter().map(|col| pearson(row, col)).collect::<Vec<_>>())
        .collect();
    Ok((columns, matrix))
}

pub fn scatter(df: &DataFrame, x: &str, y: &str, color: Option<&str>) -> Result<Vec<ScatterPoint>> {
    let xs = numeric_cells(df, x)?;
    let ys = numeric_cells(df, y)?;
    let colors = match color {
        Some(name) => text_cells(df, name)?,
        None => vec![None; df.height()],
    };

    Ok(xs
        .into_iter()
        .zip(ys)
        .zip(colors)
        .filter_map(|((x, y), color)| Some(ScatterPoint { x: x?, y: y?, color }))
        .collect())
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn summarize(label: String, mut values: Vec<f64>) -> Option<BoxSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(BoxSummary {
        label,
        count: values.len(),
        min: values[0],
        q1: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q3: quantile(&values, 0.75),
        max: values[values.len() - 1],
    })
}

/// One box per column, or one box per group of the first column
pub fn box_summaries(df: &DataFrame, columns: &[String], group_by: Option<&str>) -> Result<Vec<BoxSummary>> {
    let first = columns
        .first()
        .ok_or_else(|| WizardError::InvalidInput("box plot needs at least one column".to_string()))?;

    let degenerate = |column: &str| WizardError::DegenerateStatistic {
        column: column.to_string(),
        statistic: "five-number summary".to_string(),
    };

    match group_by {
        Some(group) => {
            let values = numeric_cells(df, first)?;
            let groups = text_cells(df, group)?;
            let mut by_group: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for (value, key) in values.into_iter().zip(groups) {
                if let (Some(v), Some(k)) = (value, key) {
                    by_group.entry(k).or_default().push(v);
                }
            }
            let boxes: Vec<BoxSummary> = by_group
                .into_iter()
                .filter_map(|(key, values)| summarize(key, values))
                .collect();
            if boxes.is_empty() {
                return Err(degenerate(first));
            }
            Ok(boxes)
        }
        None => columns
            .iter()
            .map(|name| {
                let values: Vec<f64> = numeric_cells(df, name)?.into_iter().flatten().collect();
                summarize(name.clone(), values).ok_or_else(|| degenerate(name))
            })
            .collect(),
    }
}

/// Equal-width bins between the column's min and max
pub fn histogram(df: &DataFrame, column: &str, bins: usize) -> Result<Vec<HistogramBin>> {
    let values: Vec<f64> = numeric_cells(df, column)?.into_iter().flatten().collect();
    if values.is_empty() {
        return Err(WizardError::DegenerateStatistic {
            column: column.to_string(),
            statistic: "histogram range".to_string(),
        });
    }

    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + width * i as f64,
            end: lo + width * (i + 1) as f64,
            count,
        })
        .collect())
}

/// One series per y column (or per y column and group), sorted by x
pub fn line_series(df: &DataFrame, x: &str, ys: &[String], group_by: Option<&str>) -> Result<Vec<LineSeries>> {
    if ys.is_empty() {
        return Err(WizardError::InvalidInput("line chart needs at least one y column".to_string()));
    }
    let xs = numeric_cells(df, x)?;
    let groups = match group_by {
        Some(name) => Some(text_cells(df, name)?),
        None => None,
    };

    let mut out = Vec::new();
    for y in ys {
        let values = numeric_cells(df, y)?;
        let mut by_name: BTreeMap<String, Vec<[f64; 2]>> = BTreeMap::new();
        for (row, (xv, yv)) in xs.iter().zip(values.iter()).enumerate() {
            let (Some(xv), Some(yv)) = (xv, yv) else { continue };
            let name = match &groups {
                Some(g) => match &g[row] {
                    Some(key) => format!("{y}: {key}"),
                    None => continue,
                },
                None => y.clone(),
            };
            by_name.entry(name).or_default().push([*xv, *yv]);
        }
        for (name, mut points) in by_name {
            points.sort_by(|a, b| a[0].total_cmp(&b[0]));
            out.push(LineSeries { name, points });
        }
    }
    Ok(out)
}
