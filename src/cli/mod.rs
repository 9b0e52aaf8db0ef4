//! Command-line interface
//!
//! Runs the same session state machine as the server, one file at a time.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::preprocessing::PipelinePlan;
use crate::session::PipelineState;
use crate::table::{format_bytes, profile};
use crate::training::{EstimatorKind, ProblemKind, TrainingMetrics, TrainingRequest};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}

fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}

fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}

fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: impl std::fmt::Display) {
    println!("  {:<14} {}", muted(key), val.to_string().white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "datawizard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upload a table, clean it, fit a model and chart it")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Bind address (default: WIZARD_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Port (default: WIZARD_PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the upload profile of a data file
    Info {
        /// Data file (csv, xlsx, xls, json or parquet)
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Apply a preprocessing plan and write the result as CSV
    Preprocess {
        #[arg(short, long)]
        data: PathBuf,

        /// Pipeline plan (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Preprocess, then train and evaluate a model
    Train {
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// classification or regression
        #[arg(long, default_value = "classification")]
        problem: String,

        /// random_forest, linear, svm, decision_tree or gradient_boosting
        #[arg(short, long, default_value = "random_forest")]
        estimator: String,

        #[arg(long, default_value = "0.2")]
        test_size: f64,

        #[arg(long, default_value = "5")]
        cv_folds: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Pipeline plan (JSON); the raw table is used as is without one
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Where to write the fitted model (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Helpers ───────────────────────────────────────────────────────────────────

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a data file into a fresh session
fn load_session(path: &Path) -> anyhow::Result<PipelineState> {
    let bytes = std::fs::read(path)?;
    let mut state = PipelineState::new();
    state.ingest(&bytes, &file_name(path))?;
    Ok(state)
}

fn load_plan(path: Option<&Path>) -> anyhow::Result<PipelinePlan> {
    match path {
        Some(path) => Ok(serde_json::from_slice(&std::fs::read(path)?)?),
        None => Ok(PipelinePlan::default()),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let state = load_session(data_path)?;
    let df = state
        .raw()
        .map(|d| &d.table)
        .ok_or_else(|| anyhow::anyhow!("no table loaded"))?;
    let summary = profile(df);

    kv("File", data_path.display());
    kv("Rows", summary.rows);
    kv("Columns", summary.columns);
    kv("Missing cells", summary.missing_cells);
    kv("Memory", format_bytes(df.estimated_size()));
    println!();

    println!(
        "  {:<20} {:<12} {:>6} {:>8} {:>12}",
        muted("Column"),
        muted("Type"),
        muted("Nulls"),
        muted("Unique"),
        muted("Memory")
    );
    println!("  {}", dim(&"─".repeat(62)));
    for col in &summary.column_profiles {
        println!(
            "  {:<20} {:<12} {:>6} {:>8} {:>12}",
            col.name,
            col.dtype.truecolor(140, 140, 140),
            col.null_count,
            col.unique_count,
            col.memory
        );
    }
    println!();
    Ok(())
}

pub fn cmd_preprocess(data_path: &Path, plan_path: &Path, output: &Path) -> anyhow::Result<()> {
    section("Preprocess");
    let start = Instant::now();

    let mut state = load_session(data_path)?;
    let plan = load_plan(Some(plan_path))?;
    let processed = state.apply_pipeline(&plan)?;

    for step in &processed.steps {
        step_ok(&format!("{} {}", accent(&step.stage().to_string()), dim(&step.columns().join(", "))));
    }
    let report = &processed.report;
    kv("Shape", format!("{:?} -> {:?}", report.original_shape, report.processed_shape));
    kv("Rows dropped", report.rows_dropped);
    kv("Duplicates", report.duplicates_removed);

    let mut table = processed.table.clone();
    let mut file = std::fs::File::create(output)?;
    CsvWriter::new(&mut file).finish(&mut table)?;

    step_ok(&format!(
        "wrote {} {}",
        output.display(),
        dim(&format!("({:.2}s)", start.elapsed().as_secs_f64()))
    ));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    data_path: &Path,
    target: &str,
    problem: &str,
    estimator: &str,
    test_size: f64,
    cv_folds: usize,
    seed: u64,
    plan_path: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");

    let problem: ProblemKind = problem.parse()?;
    let request = TrainingRequest::new(target, problem)
        .with_estimator(estimator.parse::<EstimatorKind>()?)
        .with_test_size(test_size)
        .with_cv_folds(cv_folds)
        .with_seed(seed);
    request.validate()?;

    let mut state = load_session(data_path)?;
    state.apply_pipeline(&load_plan(plan_path)?)?;
    let artifact = state.train(&request)?;
    let report = &artifact.report;

    let summary = &report.summary;
    kv("Estimator", &summary.estimator);
    kv("Features", summary.features);
    kv("Train rows", summary.train_rows);
    kv("Test rows", summary.test_rows);
    kv("Seed", summary.seed);
    println!();

    match &report.metrics {
        TrainingMetrics::Classification {
            accuracy,
            cross_validation,
            ..
        } => {
            kv("Accuracy", format!("{:.4}", accuracy));
            kv(
                "CV accuracy",
                format!(
                    "{:.4} ± {:.4} ({} folds)",
                    cross_validation.mean_score, cross_validation.std_score, cross_validation.n_folds
                ),
            );
        }
        TrainingMetrics::Regression { rmse, r2 } => {
            kv("RMSE", format!("{:.4}", rmse));
            kv("R²", r2.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "undefined".to_string()));
        }
    }

    if let Some(importances) = &report.feature_importances {
        section("Feature importance");
        for fi in importances.iter().take(10) {
            println!("  {:<20} {:.4}", fi.feature, fi.importance);
        }
    }

    if let Some(path) = output {
        std::fs::write(path, artifact.predictor.to_bytes()?)?;
        step_ok(&format!("model saved to {}", path.display()));
    }
    println!();
    Ok(())
}

pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }

    section(&format!("datawizard v{}", env!("CARGO_PKG_VERSION")));
    kv("API", format!("http://{}:{}/api", config.host, config.port));
    kv("Health", format!("http://{}:{}/api/health", config.host, config.port));
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { host, port } => cmd_serve(host, port).await,
        Commands::Info { data } => cmd_info(&data),
        Commands::Preprocess { data, plan, output } => cmd_preprocess(&data, &plan, &output),
        Commands::Train {
            data,
            target,
            problem,
            estimator,
            test_size,
            cv_folds,
            seed,
            plan,
            output,
        } => cmd_train(
            &data,
            &target,
            &problem,
            &estimator,
            test_size,
            cv_folds,
            seed,
            plan.as_deref(),
            output.as_deref(),
        ),
    }
}
