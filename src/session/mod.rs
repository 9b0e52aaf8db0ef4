//! Session-scoped pipeline state
//!
//! A [`PipelineState`] threads one dataset through upload, preprocessing,
//! training and charting. Every action checks that the artifact it needs
//! exists, and replacing an upstream artifact clears everything derived
//! from it.

mod store;

pub use store::{SessionId, SessionStore, SharedState};

use crate::error::{Result, WizardError};
use crate::ingest::ingest;
use crate::preprocessing::{Pipeline, PipelinePlan, PipelineReport, TransformationStep};
use crate::table::{profile, DatasetProfile};
use crate::training::{self, Predictor, TrainingReport, TrainingRequest};
use crate::visualization::{self, Chart, ChartSource, VisualizationRequest};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

const UPLOAD_FIRST: &str = "upload a dataset";
const PREPROCESS_FIRST: &str = "apply preprocessing";
const TRAIN_FIRST: &str = "train a model";

/// Pipeline progress, derived from which artifacts exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Empty,
    RawLoaded,
    Processed,
    Trained,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Empty => "empty",
            Stage::RawLoaded => "raw_loaded",
            Stage::Processed => "processed",
            Stage::Trained => "trained",
        };
        f.write_str(name)
    }
}

/// An uploaded table and where it came from
#[derive(Debug, Clone)]
pub struct Dataset {
    pub file_name: String,
    pub table: DataFrame,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(file_name: impl Into<String>, table: DataFrame) -> Self {
        Self {
            file_name: file_name.into(),
            table,
            loaded_at: Utc::now(),
        }
    }
}

/// Output of the last "apply pipeline"
#[derive(Debug, Clone)]
pub struct ProcessedData {
    pub table: DataFrame,
    pub steps: Vec<TransformationStep>,
    pub report: PipelineReport,
}

/// Output of the last successful "train"
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub predictor: Predictor,
    pub report: TrainingReport,
}

/// What a client sees of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub stage: Stage,
    pub file_name: Option<String>,
    pub raw_shape: Option<(usize, usize)>,
    pub processed_shape: Option<(usize, usize)>,
    pub applied_steps: usize,
    pub estimator: Option<String>,
}

/// One session's artifacts
#[derive(Debug, Default)]
pub struct PipelineState {
    raw: Option<Dataset>,
    processed: Option<ProcessedData>,
    model: Option<ModelArtifact>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        match (&self.raw, &self.processed, &self.model) {
            (None, _, _) => Stage::Empty,
            (Some(_), None, _) => Stage::RawLoaded,
            (Some(_), Some(_), None) => Stage::Processed,
            (Some(_), Some(_), Some(_)) => Stage::Trained,
        }
    }

    pub fn raw(&self) -> Option<&Dataset> {
        self.raw.as_ref()
    }

    pub fn processed(&self) -> Option<&ProcessedData> {
        self.processed.as_ref()
    }

    pub fn model(&self) -> Option<&ModelArtifact> {
        self.model.as_ref()
    }

    pub fn applied_steps(&self) -> &[TransformationStep] {
        self.processed.as_ref().map(|p| p.steps.as_slice()).unwrap_or_default()
    }

    fn log_transition(&self, from: Stage) {
        let to = self.stage();
        if from != to {
            info!(from = %from, to = %to, "Session stage changed");
        }
    }

    fn require_raw(&self, action: &str) -> Result<&Dataset> {
        self.raw
            .as_ref()
            .ok_or_else(|| WizardError::precondition(action, UPLOAD_FIRST))
    }

    fn require_processed(&self, action: &str) -> Result<&ProcessedData> {
        self.require_raw(action)?;
        self.processed
            .as_ref()
            .ok_or_else(|| WizardError::precondition(action, PREPROCESS_FIRST))
    }

    /// Replace the raw table; every artifact derived from the old one is dropped.
    pub fn load_raw(&mut self, dataset: Dataset) {
        let from = self.stage();
        self.raw = Some(dataset);
        self.processed = None;
        self.model = None;
        self.log_transition(from);
    }

    /// Decode an upload and commit it. A failed decode leaves the state as it was.
    pub fn ingest(&mut self, bytes: &[u8], file_name: &str) -> Result<DatasetProfile> {
        let table = ingest(bytes, file_name)?;
        let summary = profile(&table);
        self.load_raw(Dataset::new(file_name, table));
        Ok(summary)
    }

    /// Run the pipeline over the raw table and commit the result.
    ///
    /// A previously trained model is dropped. On error nothing changes.
    pub fn apply_pipeline(&mut self, plan: &PipelinePlan) -> Result<&ProcessedData> {
        let raw = self.require_raw("apply preprocessing")?;
        let run = Pipeline::run(&raw.table, plan)?;

        let from = self.stage();
        self.model = None;
        let processed = self.processed.insert(ProcessedData {
            table: run.table,
            steps: run.steps,
            report: run.report,
        });
        if from != Stage::Processed {
            info!(from = %from, to = %Stage::Processed, "Session stage changed");
        }
        Ok(processed)
    }

    /// Fit a model on the processed table. On error the previous model is kept.
    pub fn train(&mut self, request: &TrainingRequest) -> Result<&ModelArtifact> {
        let processed = self.require_processed("train a model")?;
        let outcome = training::train(&processed.table, request)?;

        let from = self.stage();
        let model = self.model.insert(ModelArtifact {
            predictor: outcome.predictor,
            report: outcome.report,
        });
        if from != Stage::Trained {
            info!(from = %from, to = %Stage::Trained, "Session stage changed");
        }
        Ok(model)
    }

    /// Fitted predictor, for download
    pub fn predictor(&self) -> Result<&Predictor> {
        self.model
            .as_ref()
            .map(|m| &m.predictor)
            .ok_or_else(|| WizardError::precondition("download a model", TRAIN_FIRST))
    }

    /// Chart the raw or processed table
    pub fn visualize(&self, request: &VisualizationRequest) -> Result<Chart> {
        let table = match request.source {
            ChartSource::Raw => &self.require_raw("visualize data")?.table,
            ChartSource::Processed => &self.require_processed("visualize processed data")?.table,
        };
        visualization::visualize(table, request)
    }

    /// Back to an empty session
    pub fn reset(&mut self) {
        let from = self.stage();
        *self = Self::default();
        self.log_transition(from);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            stage: self.stage(),
            file_name: self.raw.as_ref().map(|d| d.file_name.clone()),
            raw_shape: self.raw.as_ref().map(|d| d.table.shape()),
            processed_shape: self.processed.as_ref().map(|p| p.table.shape()),
            applied_steps: self.applied_steps().len(),
            estimator: self
                .model
                .as_ref()
                .map(|m| m.report.summary.estimator.clone()),
        }
    }
}
