//! Ingestion adapter
//!
//! Decodes the bytes of an uploaded file into a table. The format is picked
//! from the file name's extension alone. Every reader failure becomes a
//! [`WizardError::DecodeFailure`] that carries the underlying message.

use crate::error::{Result, WizardError};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::time::Instant;
use tracing::{debug, info};

/// Rows used by the CSV reader to infer column types
const CSV_INFER_SCHEMA_ROWS: usize = 1000;

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Csv,
    Excel,
    Json,
    Parquet,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Csv => write!(f, "csv"),
            DataFormat::Excel => write!(f, "excel"),
            DataFormat::Json => write!(f, "json"),
            DataFormat::Parquet => write!(f, "parquet"),
        }
    }
}

impl DataFormat {
    /// Extensions accepted by the upload surface
    pub const EXTENSIONS: [&'static str; 5] = ["csv", "xlsx", "xls", "json", "parquet"];

    /// Look up a (case-insensitive) extension
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Ok(DataFormat::Csv),
            "xlsx" | "xls" => Ok(DataFormat::Excel),
            "json" => Ok(DataFormat::Json),
            "parquet" => Ok(DataFormat::Parquet),
            other => Err(WizardError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Format of a file, from the text after its last `.`
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let ext = file_name.rsplit('.').next().unwrap_or_default();
        Self::from_extension(ext)
    }
}

/// Decode an uploaded file into a table.
pub fn ingest(bytes: &[u8], file_name: &str) -> Result<DataFrame> {
    let format = DataFormat::from_file_name(file_name)?;
    let start = Instant::now();

    let df = decode(bytes, format).map_err(|e| match e {
        WizardError::DecodeFailure { .. } => e,
        other => WizardError::DecodeFailure {
            format: format.to_string(),
            message: other.to_string(),
        },
    })?;

    if df.width() == 0 {
        return Err(WizardError::DecodeFailure {
            format: format.to_string(),
            message: "no columns found".to_string(),
        });
    }

    info!(
        file = %file_name,
        format = %format,
        bytes = bytes.len(),
        rows = df.height(),
        cols = df.width(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Dataset decoded"
    );
    Ok(df)
}

/// Decode bytes of a known format
pub fn decode(bytes: &[u8], format: DataFormat) -> Result<DataFrame> {
    match format {
        DataFormat::Csv => Ok(CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(CSV_INFER_SCHEMA_ROWS))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?),
        DataFormat::Json => Ok(JsonReader::new(Cursor::new(bytes)).finish()?),
        DataFormat::Parquet => Ok(ParquetReader::new(Cursor::new(bytes)).finish()?),
        DataFormat::Excel => decode_excel(bytes),
    }
}

fn excel_error(message: impl fmt::Display) -> WizardError {
    WizardError::DecodeFailure {
        format: DataFormat::Excel.to_string(),
        message: message.to_string(),
    }
}

/// Read the first worksheet; the first row holds the column names.
fn decode_excel(bytes: &[u8]) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(excel_error)?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| excel_error("workbook has no sheets"))?;
    let range = workbook.worksheet_range(&sheet_name).map_err(excel_error)?;
    debug!(sheet = %sheet_name, "Reading worksheet");

    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(cells) => cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Data::Empty => format!("column_{}", i),
                other => other.to_string(),
            })
            .collect(),
        None => return Err(excel_error("worksheet is empty")),
    };

    let body: Vec<&[Data]> = rows.collect();
    let columns: Vec<Column> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<&Data> = body.iter().map(|row| row.get(idx).unwrap_or(&Data::Empty)).collect();
            excel_column(name, &cells).into_column()
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

/// Build one typed column from worksheet cells
fn excel_column(name: &str, cells: &[&Data]) -> Series {
    let present: Vec<&Data> = cells.iter().copied().filter(|c| !matches!(c, Data::Empty)).collect();

    let all_numeric = present.iter().all(|c| matches!(c, Data::Int(_) | Data::Float(_)));
    let all_whole = present.iter().all(|c| match c {
        Data::Int(_) => true,
        Data::Float(v) => v.fract() == 0.0 && v.abs() < i64::MAX as f64,
        _ => false,
    });
    let all_bool = present.iter().all(|c| matches!(c, Data::Bool(_)));

    if !present.is_empty() && all_numeric && all_whole {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v),
                Data::Float(v) => Some(*v as i64),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values)
    } else if !present.is_empty() && all_numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v as f64),
                Data::Float(v) => Some(*v),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values)
    } else if !present.is_empty() && all_bool {
        let values: Vec<Option<bool>> = cells
            .iter()
            .map(|c| match c {
                Data::Bool(v) => Some(*v),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|c| match c {
                Data::Empty => None,
                other => Some(other.to_string()),
            })
            .collect();
        Series::new(name.into(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lookup() {
        assert_eq!(DataFormat::from_file_name("sales.CSV").unwrap(), DataFormat::Csv);
        assert_eq!(DataFormat::from_file_name("book.xls").unwrap(), DataFormat::Excel);
        assert_eq!(DataFormat::from_file_name("a.b.parquet").unwrap(), DataFormat::Parquet);
        assert!(matches!(
            DataFormat::from_file_name("notes.txt"),
            Err(WizardError::UnsupportedFormat(ext)) if ext == "txt"
        ));
        assert!(DataFormat::from_file_name("README").is_err());
    }

    #[test]
    fn test_ingest_csv() {
        let bytes = b"a,b,label\n1,2.5,x\n3,,y\n";
        let df = ingest(bytes, "data.csv").unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("b").unwrap().null_count(), 1);
    }

    #[test]
    fn test_ingest_json_records() {
        let bytes = br#"[{"a": 1, "b": "x"}, {"a": 2, "b": null}]"#;
        let df = ingest(bytes, "data.json").unwrap();
        assert_eq!(df.shape(), (2, 2));
    }

    #[test]
    fn test_malformed_json_is_decode_failure() {
        let err = ingest(b"{not json", "data.json").unwrap_err();
        match err {
            WizardError::DecodeFailure { format, message } => {
                assert_eq!(format, "json");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_excel_is_decode_failure() {
        let err = ingest(b"definitely not a workbook", "book.xlsx").unwrap_err();
        assert!(matches!(err, WizardError::DecodeFailure { .. }));
    }

    #[test]
    fn test_excel_column_typing() {
        let cells = [Data::Float(1.0), Data::Empty, Data::Int(3)];
        let refs: Vec<&Data> = cells.iter().collect();
        let s = excel_column("n", &refs);
        assert_eq!(s.dtype(), &DataType::Int64);
        assert_eq!(s.null_count(), 1);

        let cells = [Data::Float(1.5), Data::String("x".into())];
        let refs: Vec<&Data> = cells.iter().collect();
        assert_eq!(excel_column("m", &refs).dtype(), &DataType::String);
    }
}
