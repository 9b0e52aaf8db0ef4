//! Table helpers
//!
//! The pipeline's Table is a polars [`DataFrame`]. This module classifies
//! columns into the kinds the stages care about and builds the dataset
//! profile shown after an upload.

use crate::error::{Result, WizardError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of a column as seen by the pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Integer or floating point
    Numeric,
    /// True/false
    Boolean,
    /// Text or categorical
    Categorical,
    /// Dates, lists, structs...; left alone by every stage
    Other,
}

/// Classify a polars dtype
pub fn column_kind(dtype: &DataType) -> ColumnKind {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => ColumnKind::Numeric,
        DataType::Boolean => ColumnKind::Boolean,
        DataType::String | DataType::Categorical(..) => ColumnKind::Categorical,
        _ => ColumnKind::Other,
    }
}

fn columns_of_kind(df: &DataFrame, kind: ColumnKind) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| column_kind(c.dtype()) == kind)
        .map(|c| c.name().to_string())
        .collect()
}

/// Names of numeric columns, in table order
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    columns_of_kind(df, ColumnKind::Numeric)
}

/// Names of categorical (text) columns, in table order
pub fn categorical_columns(df: &DataFrame) -> Vec<String> {
    columns_of_kind(df, ColumnKind::Categorical)
}

/// Names of columns holding at least one null, in table order
pub fn columns_with_nulls(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| c.null_count() > 0)
        .map(|c| c.name().to_string())
        .collect()
}

/// Total number of null cells in the table
pub fn missing_cells(df: &DataFrame) -> usize {
    df.get_columns().iter().map(|c| c.null_count()).sum()
}

/// Fail with [`WizardError::StaleColumnReference`] unless every name is a column of `df`.
pub fn require_columns<S: AsRef<str>>(df: &DataFrame, names: &[S], stage: &str) -> Result<()> {
    for name in names {
        let name = name.as_ref();
        if df.column(name).is_err() {
            return Err(WizardError::StaleColumnReference {
                column: name.to_string(),
                stage: stage.to_string(),
            });
        }
    }
    Ok(())
}

/// Fetch a column as a materialized series, mapping absence to `FeatureNotFound`.
pub fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| WizardError::FeatureNotFound(name.to_string()))
}

/// Non-null values of a numeric column as `f64`
pub fn numeric_values(series: &Series) -> Result<Vec<f64>> {
    if column_kind(series.dtype()) != ColumnKind::Numeric {
        return Err(WizardError::NonNumericColumn(series.name().to_string()));
    }
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().flatten().collect())
}

/// Number of distinct non-null values
pub fn unique_count(series: &Series) -> usize {
    let n = series.n_unique().unwrap_or(0);
    if series.null_count() > 0 {
        n.saturating_sub(1)
    } else {
        n
    }
}

/// Render a byte count the way the upload page does: KB below 1 MiB, MB above.
pub fn format_bytes(bytes: usize) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    }
}

/// Per-column facts shown after upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub kind: ColumnKind,
    pub unique_count: usize,
    pub null_count: usize,
    pub memory_bytes: usize,
    pub memory: String,
}

/// Dataset summary shown after upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub rows: usize,
    pub columns: usize,
    pub missing_cells: usize,
    pub column_profiles: Vec<ColumnProfile>,
}

/// Build the upload summary for a table
pub fn profile(df: &DataFrame) -> DatasetProfile {
    let column_profiles = df
        .get_columns()
        .iter()
        .map(|col| {
            let series = col.as_materialized_series();
            let memory_bytes = series.estimated_size();
            ColumnProfile {
                name: col.name().to_string(),
                dtype: col.dtype().to_string(),
                kind: column_kind(col.dtype()),
                unique_count: unique_count(series),
                null_count: col.null_count(),
                memory_bytes,
                memory: format_bytes(memory_bytes),
            }
        })
        .collect();

    DatasetProfile {
        rows: df.height(),
        columns: df.width(),
        missing_cells: missing_cells(df),
        column_profiles,
    }
}

/// Convert one cell to JSON
pub fn any_value_to_json(value: AnyValue<'_>) -> serde_json::Value {
    match value {
        AnyValue::Null => serde_json::Value::Null,
        AnyValue::Boolean(v) => serde_json::json!(v),
        AnyValue::String(v) => serde_json::json!(v),
        AnyValue::StringOwned(v) => serde_json::json!(v.as_str()),
        AnyValue::Int8(v) => serde_json::json!(v),
        AnyValue::Int16(v) => serde_json::json!(v),
        AnyValue::Int32(v) => serde_json::json!(v),
        AnyValue::Int64(v) => serde_json::json!(v),
        AnyValue::UInt8(v) => serde_json::json!(v),
        AnyValue::UInt16(v) => serde_json::json!(v),
        AnyValue::UInt32(v) => serde_json::json!(v),
        AnyValue::UInt64(v) => serde_json::json!(v),
        AnyValue::Float32(v) => serde_json::json!(v),
        AnyValue::Float64(v) => serde_json::json!(v),
        other => serde_json::json!(other.to_string()),
    }
}

/// Render one cell as text (used for category labels)
pub fn any_value_to_text(value: &AnyValue<'_>) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(v) => Some(v.to_string()),
        AnyValue::StringOwned(v) => Some(v.to_string()),
        other => Some(other.to_string()),
    }
}

/// First `n` rows, column-oriented
pub fn preview(df: &DataFrame, n: usize) -> serde_json::Value {
    let head = df.head(Some(n));
    let columns: Vec<serde_json::Value> = head
        .get_columns()
        .iter()
        .map(|col| {
            let values: Vec<serde_json::Value> = (0..col.len())
                .map(|i| col.get(i).map(any_value_to_json).unwrap_or(serde_json::Value::Null))
                .collect();
            serde_json::json!({
                "name": col.name().to_string(),
                "dtype": col.dtype().to_string(),
                "values": values,
            })
        })
        .collect();

    serde_json::json!({
        "rows": head.height(),
        "columns": columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!(
            "age" => &[Some(25i64), None, Some(40), Some(40)],
            "color" => &[Some("red"), Some("blue"), None, Some("red")],
            "member" => &[true, false, true, true],
        )
        .unwrap()
    }

    #[test]
    fn test_column_kinds() {
        let df = sample();
        assert_eq!(numeric_columns(&df), vec!["age"]);
        assert_eq!(categorical_columns(&df), vec!["color"]);
        assert_eq!(column_kind(&DataType::Boolean), ColumnKind::Boolean);
        assert_eq!(column_kind(&DataType::Date), ColumnKind::Other);
    }

    #[test]
    fn test_profile() {
        let df = sample();
        let profile = profile(&df);
        assert_eq!(profile.rows, 4);
        assert_eq!(profile.columns, 3);
        assert_eq!(profile.missing_cells, 2);

        let color = &profile.column_profiles[1];
        assert_eq!(color.unique_count, 2);
        assert_eq!(color.null_count, 1);
        assert!(color.memory.ends_with("KB"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_require_columns() {
        let df = sample();
        assert!(require_columns(&df, &["age", "color"], "scaling").is_ok());
        let err = require_columns(&df, &["colour"], "scaling").unwrap_err();
        assert!(matches!(err, WizardError::StaleColumnReference { .. }));
    }

    #[test]
    fn test_preview() {
        let df = sample();
        let preview = preview(&df, 2);
        assert_eq!(preview["rows"], 2);
        assert_eq!(preview["columns"][0]["values"][1], serde_json::Value::Null);
    }
}
