//! datawizard: upload a tabular dataset, clean it, fit a model and chart it.
//!
//! # Modules
//!
//! - [`ingest`] - decode uploads (csv, excel, json, parquet) into a table
//! - [`table`] - column kinds, dataset profile, previews
//! - [`preprocessing`] - the four-stage transformation pipeline
//! - [`session`] - per-session pipeline state machine
//! - [`training`] - estimators, splitting, cross-validation, metrics
//! - [`visualization`] - sampling and chart data
//! - [`server`] - HTTP API
//! - [`cli`] - command-line interface

pub mod error;

pub mod ingest;
pub mod preprocessing;
pub mod session;
pub mod table;
pub mod training;
pub mod visualization;

pub mod cli;
pub mod server;

pub use error::{Result, WizardError};
pub use session::{PipelineState, SessionStore, Stage};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
