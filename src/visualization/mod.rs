//! Visualization adapter
//!
//! Large tables are sampled down before any chart is built, so rendering
//! cost stays bounded whatever the upload size.

pub mod charts;

pub use charts::{BoxSummary, HistogramBin, LineSeries, ScatterPoint};

use crate::error::{Result, WizardError};
use polars::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Tables above this many rows are sampled
pub const SAMPLE_THRESHOLD: usize = 10_000;
pub const MIN_SAMPLE: usize = 1_000;
pub const MAX_SAMPLE: usize = 10_000;
pub const DEFAULT_SAMPLE: usize = 5_000;

pub const MIN_BINS: usize = 5;
pub const MAX_BINS: usize = 100;

/// Allowed sample sizes for a table, or `None` when it is small enough to chart whole
pub fn sample_bounds(rows: usize) -> Option<(usize, usize)> {
    (rows > SAMPLE_THRESHOLD).then(|| (MIN_SAMPLE, MAX_SAMPLE.min(rows)))
}

/// Seeded sample without replacement, row order preserved
pub fn sample_for_chart(df: &DataFrame, size: Option<usize>, seed: u64) -> Result<DataFrame> {
    let Some((lo, hi)) = sample_bounds(df.height()) else {
        return Ok(df.clone());
    };
    let size = size.unwrap_or(DEFAULT_SAMPLE).clamp(lo, hi);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, df.height(), size).into_vec();
    picked.sort_unstable();

    let idx = IdxCa::from_vec("idx".into(), picked.into_iter().map(|i| i as IdxSize).collect());
    debug!(rows = df.height(), sample = size, "Sampling table for chart");
    Ok(df.take(&idx)?)
}

fn default_bins() -> usize {
    30
}

/// Chart kinds with their column selectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartRequest {
    CorrelationHeatmap,
    Scatter {
        x: String,
        y: String,
        #[serde(default)]
        color: Option<String>,
    },
    Box {
        columns: Vec<String>,
        #[serde(default)]
        group_by: Option<String>,
    },
    Histogram {
        column: String,
        #[serde(default = "default_bins")]
        bins: usize,
    },
    Line {
        x: String,
        y: Vec<String>,
        #[serde(default)]
        group_by: Option<String>,
    },
}

impl ChartRequest {
    pub fn kind(&self) -> ChartKind {
        match self {
            ChartRequest::CorrelationHeatmap => ChartKind::CorrelationHeatmap,
            ChartRequest::Scatter { .. } => ChartKind::Scatter,
            ChartRequest::Box { .. } => ChartKind::Box,
            ChartRequest::Histogram { .. } => ChartKind::Histogram,
            ChartRequest::Line { .. } => ChartKind::Line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    CorrelationHeatmap,
    Scatter,
    Box,
    Histogram,
    Line,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartKind::CorrelationHeatmap => "correlation heatmap",
            ChartKind::Scatter => "scatter",
            ChartKind::Box => "box",
            ChartKind::Histogram => "histogram",
            ChartKind::Line => "line",
        };
        f.write_str(name)
    }
}

/// Which session table to chart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartSource {
    #[default]
    Raw,
    Processed,
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationRequest {
    #[serde(default)]
    pub source: ChartSource,
    #[serde(default)]
    pub sample_size: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub chart: ChartRequest,
}

impl VisualizationRequest {
    pub fn new(chart: ChartRequest) -> Self {
        Self {
            source: ChartSource::default(),
            sample_size: None,
            seed: default_seed(),
            chart,
        }
    }

    pub fn with_source(mut self, source: ChartSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = Some(size);
        self
    }
}

/// Series data for one chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartData {
    Correlation {
        columns: Vec<String>,
        /// `None` where the correlation is undefined
        matrix: Vec<Vec<Option<f64>>>,
    },
    Scatter {
        x: String,
        y: String,
        points: Vec<ScatterPoint>,
    },
    Box {
        boxes: Vec<BoxSummary>,
    },
    Histogram {
        column: String,
        bins: Vec<HistogramBin>,
    },
    Line {
        x: String,
        series: Vec<LineSeries>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub title: String,
    pub kind: ChartKind,
    /// Rows the chart was built from (after sampling)
    pub rows: usize,
    pub data: ChartData,
}

/// Build a chart from the whole table
pub fn render(df: &DataFrame, request: &ChartRequest) -> Result<Chart> {
    let (title, data) = match request {
        ChartRequest::CorrelationHeatmap => {
            let (columns, matrix) = charts::correlation_matrix(df)?;
            ("Correlation heatmap".to_string(), ChartData::Correlation { columns, matrix })
        }
        ChartRequest::Scatter { x, y, color } => (
            format!("{y} vs {x}"),
            ChartData::Scatter {
                x: x.clone(),
                y: y.clone(),
                points: charts::scatter(df, x, y, color.as_deref())?,
            },
        ),
        ChartRequest::Box { columns, group_by } => {
            let boxes = charts::box_summaries(df, columns, group_by.as_deref())?;
            let title = match group_by {
                Some(group) => format!("{} by {group}", columns[0]),
                None => format!("Distribution of {}", columns.join(", ")),
            };
            (title, ChartData::Box { boxes })
        }
        ChartRequest::Histogram { column, bins } => {
            if !(MIN_BINS..=MAX_BINS).contains(bins) {
                return Err(WizardError::InvalidParameter {
                    name: "bins".to_string(),
                    value: bins.to_string(),
                    reason: format!("must be between {MIN_BINS} and {MAX_BINS}"),
                });
            }
            (
                format!("Histogram of {column}"),
                ChartData::Histogram {
                    column: column.clone(),
                    bins: charts::histogram(df, column, *bins)?,
                },
            )
        }
        ChartRequest::Line { x, y, group_by } => (
            format!("{} over {x}", y.join(", ")),
            ChartData::Line {
                x: x.clone(),
                series: charts::line_series(df, x, y, group_by.as_deref())?,
            },
        ),
    };

    Ok(Chart {
        title,
        kind: request.kind(),
        rows: df.height(),
        data,
    })
}

/// Sample when the table is large, then build the chart
pub fn visualize(df: &DataFrame, request: &VisualizationRequest) -> Result<Chart> {
    let sampled = sample_for_chart(df, request.sample_size, request.seed)?;
    let chart = render(&sampled, &request.chart)?;
    debug!(kind = %chart.kind, rows = chart.rows, "Chart built");
    Ok(chart)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big_table(rows: usize) -> DataFrame {
        let values: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        df!("v" => values).unwrap()
    }

    #[test]
    fn test_sample_bounds() {
        assert_eq!(sample_bounds(10_000), None);
        assert_eq!(sample_bounds(10_001), Some((1_000, 10_000)));
        assert_eq!(sample_bounds(50_000), Some((1_000, 10_000)));
    }

    #[test]
    fn test_small_table_not_sampled() {
        let df = big_table(100);
        assert_eq!(sample_for_chart(&df, Some(10), 1).unwrap().height(), 100);
    }

    #[test]
    fn test_sampling_clamps_and_is_seeded() {
        let df = big_table(12_000);
        assert_eq!(sample_for_chart(&df, None, 7).unwrap().height(), DEFAULT_SAMPLE);
        assert_eq!(sample_for_chart(&df, Some(10), 7).unwrap().height(), MIN_SAMPLE);
        assert_eq!(sample_for_chart(&df, Some(50_000), 7).unwrap().height(), MAX_SAMPLE);

        let a = sample_for_chart(&df, Some(2_000), 3).unwrap();
        let b = sample_for_chart(&df, Some(2_000), 3).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_request_json() {
        let request: VisualizationRequest =
            serde_json::from_str(r#"{"chart": {"kind": "histogram", "column": "v"}}"#).unwrap();
        assert_eq!(request.source, ChartSource::Raw);
        assert_eq!(
            request.chart,
            ChartRequest::Histogram {
                column: "v".to_string(),
                bins: 30
            }
        );
    }

    #[test]
    fn test_bins_validated() {
        let df = big_table(10);
        let request = ChartRequest::Histogram {
            column: "v".to_string(),
            bins: 2,
        };
        assert!(matches!(
            render(&df, &request),
            Err(WizardError::InvalidParameter { name, .. }) if name == "bins"
        ));
    }

    #[test]
    fn test_render_scatter_rejects_text() {
        let df = df!("a" => &[1.0, 2.0], "t" => &["x", "y"]).unwrap();
        let request = ChartRequest::Scatter {
            x: "a".to_string(),
            y: "t".to_string(),
            color: None,
        };
        assert!(matches!(render(&df, &request), Err(WizardError::NonNumericColumn(c)) if c == "t"));
    }
}
