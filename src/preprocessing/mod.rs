//! Data preprocessing module
//!
//! The transformation pipeline applies four stages in a fixed order:
//! - Missing value handling, per column
//! - Feature scaling (Standard, MinMax, Robust) over a selected column set
//! - Categorical encoding (Label, OneHot), per column
//! - Duplicate row removal

mod config;
mod dedup;
mod encoder;
mod missing;
mod pipeline;
mod scaler;

pub use config::{EncodingSelection, MissingSelection, PipelinePlan, ScalingSelection};
pub use dedup::{drop_duplicates, duplicate_count};
pub use encoder::{Encoder, EncodingMethod};
pub use missing::{handle_missing, MissingStrategy};
pub use pipeline::{Pipeline, PipelineReport, PipelineRun, PipelineStage, TransformationStep};
pub use scaler::{Scaler, ScalerParams, ScalerType};

use crate::error::Result;
use crate::table::{categorical_columns, numeric_columns, unique_count};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// A column that still holds nulls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingColumn {
    pub column: String,
    pub dtype: String,
    pub missing_count: usize,
    pub missing_percent: f64,
}

/// A text column that can be encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub column: String,
    pub unique_count: usize,
    pub top_value: Option<String>,
}

/// What the preprocessing surface shows before anything is applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingOverview {
    pub rows: usize,
    pub columns: usize,
    pub missing: Vec<MissingColumn>,
    pub numeric_columns: Vec<String>,
    pub categorical: Vec<CategoricalColumn>,
    pub duplicate_rows: usize,
}

/// Summarise a table for the preprocessing surface
pub fn overview(df: &DataFrame) -> Result<PreprocessingOverview> {
    let rows = df.height();

    let missing = df
        .get_columns()
        .iter()
        .filter(|c| c.null_count() > 0)
        .map(|c| MissingColumn {
            column: c.name().to_string(),
            dtype: c.dtype().to_string(),
            missing_count: c.null_count(),
            missing_percent: 100.0 * c.null_count() as f64 / rows.max(1) as f64,
        })
        .collect();

    let categorical = categorical_columns(df)
        .into_iter()
        .map(|name| {
            let s = df.column(&name)?.as_materialized_series();
            Ok(CategoricalColumn {
                unique_count: unique_count(s),
                top_value: missing::text_mode(s)?,
                column: name,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PreprocessingOverview {
        rows,
        columns: df.width(),
        missing,
        numeric_columns: numeric_columns(df),
        categorical,
        duplicate_rows: duplicate_count(df)?,
    })
}
