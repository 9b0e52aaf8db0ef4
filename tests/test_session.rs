//! Integration tests for the session state machine

use datawizard::preprocessing::{EncodingMethod, MissingStrategy, PipelinePlan};
use datawizard::session::{Dataset, PipelineState, SessionStore, Stage};
use datawizard::training::{EstimatorKind, ProblemKind, TrainingRequest};
use datawizard::visualization::{ChartRequest, ChartSource, VisualizationRequest};
use datawizard::WizardError;
use polars::prelude::*;

fn table() -> DataFrame {
    df!(
        "size" => &[Some(1.0), Some(2.0), None, Some(4.0), Some(5.0), Some(6.0), Some(7.0), Some(8.0)],
        "shape" => &["round", "square", "round", "square", "round", "square", "round", "square"],
        "label" => &["a", "a", "a", "a", "b", "b", "b", "b"],
    )
    .unwrap()
}

fn plan() -> PipelinePlan {
    PipelinePlan::new()
        .with_missing("size", MissingStrategy::Median)
        .with_encoding("shape", EncodingMethod::OneHot)
}

fn request() -> TrainingRequest {
    TrainingRequest::new("label", ProblemKind::Classification)
        .with_estimator(EstimatorKind::DecisionTree)
        .with_test_size(0.25)
        .with_cv_folds(2)
}

#[test]
fn test_train_before_apply_is_rejected() {
    let mut state = PipelineState::new();
    state.load_raw(Dataset::new("t.csv", table()));

    let err = state.train(&request()).unwrap_err();
    assert!(matches!(
        err,
        WizardError::StagePrecondition { ref required, .. } if required == "apply preprocessing"
    ));
    assert!(state.model().is_none());
    assert_eq!(state.stage(), Stage::RawLoaded);
}

#[test]
fn test_everything_gated_on_empty_session() {
    let mut state = PipelineState::new();
    assert!(matches!(
        state.apply_pipeline(&plan()),
        Err(WizardError::StagePrecondition { .. })
    ));
    assert!(matches!(state.train(&request()), Err(WizardError::StagePrecondition { .. })));
    assert!(matches!(
        state.visualize(&VisualizationRequest::new(ChartRequest::CorrelationHeatmap)),
        Err(WizardError::StagePrecondition { .. })
    ));
    assert_eq!(state.stage(), Stage::Empty);
}

#[test]
fn test_full_progression_and_cascade() {
    let mut state = PipelineState::new();
    state.load_raw(Dataset::new("t.csv", table()));
    state.apply_pipeline(&plan()).unwrap();
    state.train(&request()).unwrap();
    assert_eq!(state.stage(), Stage::Trained);

    let chart = VisualizationRequest::new(ChartRequest::Histogram {
        column: "size".to_string(),
        bins: 5,
    })
    .with_source(ChartSource::Processed);
    assert!(state.visualize(&chart).is_ok());

    // A new upload invalidates everything built on the old one
    state.load_raw(Dataset::new("other.csv", table()));
    assert_eq!(state.stage(), Stage::RawLoaded);
    assert!(state.processed().is_none());
    assert!(state.model().is_none());
}

#[test]
fn test_failed_apply_keeps_previous_result() {
    let mut state = PipelineState::new();
    state.load_raw(Dataset::new("t.csv", table()));
    state.apply_pipeline(&plan()).unwrap();
    let before = state.processed().unwrap().table.clone();

    let bad = PipelinePlan::new().with_encoding("size", EncodingMethod::Label);
    assert!(matches!(
        state.apply_pipeline(&bad),
        Err(WizardError::NonCategoricalColumn(_))
    ));
    assert!(state.processed().unwrap().table.equals_missing(&before));
}

#[tokio::test]
async fn test_store_keeps_sessions_apart() {
    let store = SessionStore::new();
    let first = store.create().await;
    let second = store.create().await;

    {
        let shared = store.get(&first).await.unwrap();
        let mut state = shared.lock().await;
        state.load_raw(Dataset::new("t.csv", table()));
        state.apply_pipeline(&plan()).unwrap();
    }

    let second_state = store.get(&second).await.unwrap();
    assert_eq!(second_state.lock().await.stage(), Stage::Empty);
    assert_eq!(store.get(&first).await.unwrap().lock().await.stage(), Stage::Processed);

    assert!(store.remove(&first).await);
    assert_eq!(store.len().await, 1);
}
