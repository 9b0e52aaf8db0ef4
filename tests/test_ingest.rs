//! Integration tests for upload decoding

use datawizard::ingest::{ingest, DataFormat};
use datawizard::table::{profile, ColumnKind};
use datawizard::WizardError;
use polars::prelude::*;

#[test]
fn test_csv_profile() {
    let csv = b"id,city,score\n1,Oslo,3.5\n2,Lima,\n3,Oslo,4.0\n";
    let df = ingest(csv, "cities.csv").unwrap();
    let summary = profile(&df);

    assert_eq!(summary.rows, 3);
    assert_eq!(summary.columns, 3);
    assert_eq!(summary.missing_cells, 1);
    assert_eq!(summary.column_profiles[1].kind, ColumnKind::Categorical);
    assert_eq!(summary.column_profiles[1].unique_count, 2);
    assert!(summary.column_profiles[0].memory.ends_with("KB"));
}

#[test]
fn test_parquet_roundtrip() {
    let mut df = df!("a" => &[1i64, 2, 3], "b" => &["x", "y", "z"]).unwrap();
    let mut buf: Vec<u8> = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut df).unwrap();

    let decoded = ingest(&buf, "table.PARQUET").unwrap();
    assert!(decoded.equals(&df));
}

#[test]
fn test_json_records() {
    let json = br#"[{"name": "a", "value": 1.5}, {"name": "b", "value": null}]"#;
    let df = ingest(json, "records.json").unwrap();
    assert_eq!(df.shape(), (2, 2));
    assert_eq!(df.column("value").unwrap().null_count(), 1);
}

#[test]
fn test_unsupported_extension() {
    let err = ingest(b"a,b\n1,2\n", "data.tsv").unwrap_err();
    assert!(matches!(err, WizardError::UnsupportedFormat(ext) if ext == "tsv"));
    assert!(err_is_user_facing(&ingest(b"", "data").unwrap_err()));
}

#[test]
fn test_wrong_declared_format() {
    let err = ingest(b"a,b\n1,2\n", "data.parquet").unwrap_err();
    match err {
        WizardError::DecodeFailure { format, message } => {
            assert_eq!(format, "parquet");
            assert!(!message.is_empty());
        }
        other => panic!("expected decode failure, got {other:?}"),
    }
}

#[test]
fn test_format_lookup_table() {
    for (name, format) in [
        ("a.csv", DataFormat::Csv),
        ("a.xlsx", DataFormat::Excel),
        ("a.XLS", DataFormat::Excel),
        ("a.json", DataFormat::Json),
        ("a.parquet", DataFormat::Parquet),
    ] {
        assert_eq!(DataFormat::from_file_name(name).unwrap(), format);
    }
}

fn err_is_user_facing(err: &WizardError) -> bool {
    err.is_user_error() && !err.to_string().is_empty()
}
