//! Transformation pipeline

use super::{
    config::PipelinePlan,
    dedup::drop_duplicates,
    encoder::{Encoder, EncodingMethod},
    missing::{handle_missing, MissingStrategy},
    scaler::{Scaler, ScalerType},
};
use crate::error::Result;
use crate::table::require_columns;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// The four fixed phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    MissingValues,
    Scaling,
    Encoding,
    Deduplication,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::MissingValues => write!(f, "missing-value"),
            PipelineStage::Scaling => write!(f, "scaling"),
            PipelineStage::Encoding => write!(f, "encoding"),
            PipelineStage::Deduplication => write!(f, "deduplication"),
        }
    }
}

/// One applied mutation, recorded for audit and replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TransformationStep {
    MissingValueStrategy {
        column: String,
        strategy: MissingStrategy,
    },
    ScaleColumns {
        method: ScalerType,
        columns: Vec<String>,
    },
    EncodeColumn {
        column: String,
        method: EncodingMethod,
    },
    DeduplicateRows,
}

impl TransformationStep {
    pub fn stage(&self) -> PipelineStage {
        match self {
            TransformationStep::MissingValueStrategy { .. } => PipelineStage::MissingValues,
            TransformationStep::ScaleColumns { .. } => PipelineStage::Scaling,
            TransformationStep::EncodeColumn { .. } => PipelineStage::Encoding,
            TransformationStep::DeduplicateRows => PipelineStage::Deduplication,
        }
    }

    /// Columns the step reads; each must exist when the step runs
    pub fn columns(&self) -> Vec<&str> {
        match self {
            TransformationStep::MissingValueStrategy { column, .. }
            | TransformationStep::EncodeColumn { column, .. } => vec![column.as_str()],
            TransformationStep::ScaleColumns { columns, .. } => columns.iter().map(String::as_str).collect(),
            TransformationStep::DeduplicateRows => Vec::new(),
        }
    }
}

/// What a pipeline run did to the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub original_shape: (usize, usize),
    pub processed_shape: (usize, usize),
    /// Rows removed by `Drop` strategies
    pub rows_dropped: usize,
    pub duplicates_removed: usize,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
    pub elapsed_ms: u64,
}

/// Result of [`Pipeline::run`]
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub table: DataFrame,
    pub steps: Vec<TransformationStep>,
    pub report: PipelineReport,
}

/// Stateless runner for the four stages
pub struct Pipeline;

impl Pipeline {
    /// Apply `plan` to a copy of `df`, stage by stage.
    pub fn run(df: &DataFrame, plan: &PipelinePlan) -> Result<PipelineRun> {
        plan.validate()?;
        let start = Instant::now();
        let original_shape = df.shape();
        let mut table = df.clone();
        let mut steps = Vec::new();

        // 1. missing values, in table column order
        let missing = in_column_order(&table, &plan.missing, |s| &s.column, PipelineStage::MissingValues)?;
        for selection in missing {
            if selection.strategy == MissingStrategy::None {
                continue;
            }
            let step = TransformationStep::MissingValueStrategy {
                column: selection.column.clone(),
                strategy: selection.strategy,
            };
            table = Self::record(&table, step, &mut steps)?;
        }
        let rows_dropped = original_shape.0 - table.height();

        // 2. scaling, one joint fit
        if let Some(scaling) = plan.scaling.as_ref().filter(|s| !s.columns.is_empty()) {
            let step = TransformationStep::ScaleColumns {
                method: scaling.method,
                columns: scaling.columns.clone(),
            };
            table = Self::record(&table, step, &mut steps)?;
        }

        // 3. encoding, in table column order
        let columns_before = column_names(&table);
        let encoding = in_column_order(&table, &plan.encoding, |s| &s.column, PipelineStage::Encoding)?;
        for selection in encoding {
            if selection.method == EncodingMethod::None {
                continue;
            }
            let step = TransformationStep::EncodeColumn {
                column: selection.column.clone(),
                method: selection.method,
            };
            table = Self::record(&table, step, &mut steps)?;
        }
        let columns_after = column_names(&table);

        // 4. deduplication
        let before_dedup = table.height();
        if plan.drop_duplicates {
            table = Self::record(&table, TransformationStep::DeduplicateRows, &mut steps)?;
        }

        let report = PipelineReport {
            original_shape,
            processed_shape: table.shape(),
            rows_dropped,
            duplicates_removed: before_dedup - table.height(),
            columns_added: columns_after
                .iter()
                .filter(|c| !columns_before.contains(c))
                .cloned()
                .collect(),
            columns_removed: columns_before
                .iter()
                .filter(|c| !columns_after.contains(c))
                .cloned()
                .collect(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            steps = steps.len(),
            rows_before = original_shape.0,
            rows_after = report.processed_shape.0,
            cols_before = original_shape.1,
            cols_after = report.processed_shape.1,
            elapsed_ms = report.elapsed_ms,
            "Pipeline applied"
        );

        Ok(PipelineRun { table, steps, report })
    }

    /// Re-apply recorded steps in their recorded order
    pub fn replay(df: &DataFrame, steps: &[TransformationStep]) -> Result<DataFrame> {
        let mut table = df.clone();
        for step in steps {
            table = Self::apply_step(&table, step)?;
        }
        Ok(table)
    }

    /// Apply one step, checking first that every column it names still exists.
    pub fn apply_step(df: &DataFrame, step: &TransformationStep) -> Result<DataFrame> {
        require_columns(df, &step.columns(), &step.stage().to_string())?;
        match step {
            TransformationStep::MissingValueStrategy { column, strategy } => handle_missing(df, column, *strategy),
            TransformationStep::ScaleColumns { method, columns } => Scaler::new(*method).fit_transform(df, columns),
            TransformationStep::EncodeColumn { column, method } => Encoder::new(*method).fit_transform(df, column),
            TransformationStep::DeduplicateRows => drop_duplicates(df),
        }
    }

    fn record(df: &DataFrame, step: TransformationStep, steps: &mut Vec<TransformationStep>) -> Result<DataFrame> {
        let out = Self::apply_step(df, &step)?;
        debug!(
            stage = %step.stage(),
            step = ?step,
            rows_before = df.height(),
            rows_after = out.height(),
            cols_after = out.width(),
            "Step applied"
        );
        steps.push(step);
        Ok(out)
    }
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

/// Sort selections by the position of their column in `df`.
/// A selection naming an absent column is stale.
fn in_column_order<'a, T>(
    df: &DataFrame,
    selections: &'a [T],
    column: impl Fn(&T) -> &String,
    stage: PipelineStage,
) -> Result<Vec<&'a T>> {
    let names: Vec<&String> = selections.iter().map(&column).collect();
    require_columns(df, &names, &stage.to_string())?;

    let mut ordered: Vec<(usize, &T)> = selections
        .iter()
        .map(|s| (df.get_column_index(column(s)).unwrap_or(usize::MAX), s))
        .collect();
    ordered.sort_by_key(|(idx, _)| *idx);
    Ok(ordered.into_iter().map(|(_, s)| s).collect())
}
