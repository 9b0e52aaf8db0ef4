//! Training and evaluation adapter
//!
//! Turns a processed table into a fitted [`Predictor`] plus the metrics the
//! training surface shows. Estimators are picked by a stable id
//! ([`EstimatorKind`]); display labels are separate. The input table is only
//! read, never modified.

pub mod cross_validation;
pub mod decision_tree;
pub mod features;
pub mod gradient_boosting;
pub mod linear_models;
pub mod metrics;
mod predictor;
pub mod random_forest;
pub mod svm;

pub use cross_validation::{stratified_k_fold, train_test_split, CVResults, CVSplit};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
pub use linear_models::{LinearRegression, LogisticRegression};
pub use metrics::{ClassMetrics, ClassificationReport};
pub use predictor::{FeatureImportance, Predictions, Predictor, TrainedModel};
pub use random_forest::{MaxFeatures, RandomForest};
pub use svm::{SVMClassifier, SVMConfig, SVMRegressor};

use crate::error::{Result, WizardError};
use crate::table::series;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info};

/// Kind of prediction problem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    #[default]
    Classification,
    Regression,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemKind::Classification => write!(f, "classification"),
            ProblemKind::Regression => write!(f, "regression"),
        }
    }
}

impl FromStr for ProblemKind {
    type Err = WizardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "classification" => Ok(ProblemKind::Classification),
            "regression" => Ok(ProblemKind::Regression),
            other => Err(WizardError::InvalidParameter {
                name: "problem".to_string(),
                value: other.to_string(),
                reason: "expected classification or regression".to_string(),
            }),
        }
    }
}

/// Estimators offered by the training surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    RandomForest,
    Linear,
    Svm,
    DecisionTree,
    GradientBoosting,
}

/// An estimator id with its label for one problem kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorInfo {
    pub id: EstimatorKind,
    pub label: String,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 5] = [
        EstimatorKind::RandomForest,
        EstimatorKind::Linear,
        EstimatorKind::Svm,
        EstimatorKind::DecisionTree,
        EstimatorKind::GradientBoosting,
    ];

    /// Stable identifier
    pub fn id(&self) -> &'static str {
        match self {
            EstimatorKind::RandomForest => "random_forest",
            EstimatorKind::Linear => "linear",
            EstimatorKind::Svm => "svm",
            EstimatorKind::DecisionTree => "decision_tree",
            EstimatorKind::GradientBoosting => "gradient_boosting",
        }
    }

    /// Display label, which depends on the problem kind
    pub fn label(&self, problem: ProblemKind) -> &'static str {
        match (self, problem) {
            (EstimatorKind::RandomForest, _) => "Random Forest",
            (EstimatorKind::Linear, ProblemKind::Classification) => "Logistic Regression",
            (EstimatorKind::Linear, ProblemKind::Regression) => "Linear Regression",
            (EstimatorKind::Svm, ProblemKind::Classification) => "Support Vector Machine",
            (EstimatorKind::Svm, ProblemKind::Regression) => "Support Vector Regression",
            (EstimatorKind::DecisionTree, _) => "Decision Tree",
            (EstimatorKind::GradientBoosting, _) => "Gradient Boosting",
        }
    }

    /// What the training surface lists for a problem kind
    pub fn available(problem: ProblemKind) -> Vec<EstimatorInfo> {
        Self::ALL
            .iter()
            .map(|kind| EstimatorInfo {
                id: *kind,
                label: kind.label(problem).to_string(),
            })
            .collect()
    }

    /// Construct and fit the estimator behind this id
    pub fn fit(
        &self,
        problem: ProblemKind,
        seed: u64,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<TrainedModel> {
        TrainedModel::fit(*self, problem, seed, x, y)
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EstimatorKind {
    type Err = WizardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|kind| kind.id() == s)
            .copied()
            .ok_or_else(|| WizardError::InvalidParameter {
                name: "estimator".to_string(),
                value: s.to_string(),
                reason: format!(
                    "expected one of {}",
                    Self::ALL.iter().map(|k| k.id()).collect::<Vec<_>>().join(", ")
                ),
            })
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

/// Everything the training surface collects before "train"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub target: String,
    #[serde(default)]
    pub problem: ProblemKind,
    #[serde(default)]
    pub estimator: EstimatorKind,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl TrainingRequest {
    pub fn new(target: impl Into<String>, problem: ProblemKind) -> Self {
        Self {
            target: target.into(),
            problem,
            estimator: EstimatorKind::default(),
            test_size: default_test_size(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
        }
    }

    pub fn with_estimator(mut self, estimator: EstimatorKind) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.1..=0.4).contains(&self.test_size) {
            return Err(WizardError::InvalidParameter {
                name: "test_size".to_string(),
                value: self.test_size.to_string(),
                reason: "must be between 0.1 and 0.4".to_string(),
            });
        }
        if !(2..=10).contains(&self.cv_folds) {
            return Err(WizardError::InvalidParameter {
                name: "cv_folds".to_string(),
                value: self.cv_folds.to_string(),
                reason: "must be between 2 and 10".to_string(),
            });
        }
        if self.target.is_empty() {
            return Err(WizardError::InvalidParameter {
                name: "target".to_string(),
                value: String::new(),
                reason: "a target column is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Metrics on the held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum TrainingMetrics {
    Classification {
        accuracy: f64,
        cross_validation: CVResults,
        report: ClassificationReport,
    },
    Regression {
        rmse: f64,
        /// `None` when the test targets have zero variance
        r2: Option<f64>,
    },
}

/// Test-split targets against model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualVsPredicted {
    pub actual: Predictions,
    pub predicted: Predictions,
    /// Reference line `[min, max]` of the actual values (regression only)
    pub diagonal: Option<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub estimator: String,
    pub estimator_id: EstimatorKind,
    pub problem: ProblemKind,
    pub target: String,
    pub features: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub cv_folds: usize,
    pub seed: u64,
    pub elapsed_ms: u64,
}

/// What the training surface renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub summary: TrainingSummary,
    pub metrics: TrainingMetrics,
    pub feature_importances: Option<Vec<FeatureImportance>>,
    pub actual_vs_predicted: ActualVsPredicted,
}

/// A fitted predictor and its report
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub predictor: Predictor,
    pub report: TrainingReport,
}

/// Fit the requested estimator on `df` and evaluate it.
pub fn train(df: &DataFrame, request: &TrainingRequest) -> Result<TrainingOutcome> {
    request.validate()?;
    let start = Instant::now();

    let target = series(df, &request.target)?;
    let feature_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != request.target)
        .map(|name| name.to_string())
        .collect();
    if feature_names.is_empty() {
        return Err(WizardError::InvalidInput(format!(
            "no feature columns left besides target '{}'",
            request.target
        )));
    }

    let x = features::feature_matrix(df, &feature_names)?;
    let (y, class_labels) = match request.problem {
        ProblemKind::Classification => features::class_codes(target)?,
        ProblemKind::Regression => (features::regression_target(target)?, Vec::new()),
    };

    let split = train_test_split(x.nrows(), request.test_size, request.seed)?;
    let x_train = x.select(Axis(0), &split.train_indices);
    let y_train = y.select(Axis(0), &split.train_indices);
    let x_test = x.select(Axis(0), &split.test_indices);
    let y_test = y.select(Axis(0), &split.test_indices);

    debug!(
        estimator = %request.estimator,
        train_rows = x_train.nrows(),
        test_rows = x_test.nrows(),
        features = feature_names.len(),
        "Fitting estimator"
    );
    let model = request.estimator.fit(request.problem, request.seed, &x_train, &y_train)?;
    let predictor = Predictor::new(
        request.estimator,
        request.problem,
        request.target.clone(),
        feature_names.clone(),
        class_labels.clone(),
        model,
    );

    let y_pred = predictor.predict_array(&x_test)?;
    let metrics = match request.problem {
        ProblemKind::Classification => {
            let cross_validation = cross_validate(request, &x, &y)?;
            TrainingMetrics::Classification {
                accuracy: metrics::accuracy(&y_test, &y_pred),
                cross_validation,
                report: ClassificationReport::compute(&y_test, &y_pred, &class_labels),
            }
        }
        ProblemKind::Regression => TrainingMetrics::Regression {
            rmse: metrics::rmse(&y_test, &y_pred),
            r2: metrics::r2(&y_test, &y_pred),
        },
    };

    let diagonal = match request.problem {
        ProblemKind::Regression => {
            let lo = y_test.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = y_test.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some([lo, hi])
        }
        ProblemKind::Classification => None,
    };
    let actual_vs_predicted = ActualVsPredicted {
        actual: predictor.decode(&y_test),
        predicted: predictor.decode(&y_pred),
        diagonal,
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let summary = TrainingSummary {
        estimator: request.estimator.label(request.problem).to_string(),
        estimator_id: request.estimator,
        problem: request.problem,
        target: request.target.clone(),
        features: feature_names.len(),
        train_rows: split.train_indices.len(),
        test_rows: split.test_indices.len(),
        cv_folds: request.cv_folds,
        seed: request.seed,
        elapsed_ms,
    };

    info!(
        estimator = %request.estimator,
        problem = %request.problem,
        target = %request.target,
        rows = x.nrows(),
        elapsed_ms,
        "Model trained"
    );

    let report = TrainingReport {
        summary,
        metrics,
        feature_importances: predictor.feature_importances(),
        actual_vs_predicted,
    };
    Ok(TrainingOutcome { predictor, report })
}

/// Stratified k-fold accuracy, one fresh estimator per fold
fn cross_validate(request: &TrainingRequest, x: &Array2<f64>, y: &Array1<f64>) -> Result<CVResults> {
    let folds = stratified_k_fold(y, request.cv_folds)?;
    let scores = folds
        .par_iter()
        .map(|fold| -> Result<f64> {
            let x_train = x.select(Axis(0), &fold.train_indices);
            let y_train = y.select(Axis(0), &fold.train_indices);
            let x_test = x.select(Axis(0), &fold.test_indices);
            let y_test = y.select(Axis(0), &fold.test_indices);

            let model = request.estimator.fit(request.problem, request.seed, &x_train, &y_train)?;
            let y_pred = model.predict(&x_test)?;
            Ok(metrics::accuracy(&y_test, &y_pred))
        })
        .collect::<Result<Vec<f64>>>()?;

    debug!(folds = scores.len(), "Cross-validation done");
    Ok(CVResults::from_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification_table() -> DataFrame {
        df!(
            "x1" => &[1.0, 1.2, 0.8, 1.1, 0.9, 5.0, 5.2, 4.8, 5.1, 4.9],
            "x2" => &[0i64, 1, 0, 1, 0, 1, 0, 1, 0, 1],
            "label" => &["no", "no", "no", "no", "no", "yes", "yes", "yes", "yes", "yes"],
        )
        .unwrap()
    }

    #[test]
    fn test_request_validation() {
        let request = TrainingRequest::new("label", ProblemKind::Classification);
        assert!(request.validate().is_ok());
        assert!(matches!(
            request.clone().with_test_size(0.5).validate(),
            Err(WizardError::InvalidParameter { name, .. }) if name == "test_size"
        ));
        assert!(matches!(
            request.with_cv_folds(1).validate(),
            Err(WizardError::InvalidParameter { name, .. }) if name == "cv_folds"
        ));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: TrainingRequest = serde_json::from_str(r#"{"target": "y"}"#).unwrap();
        assert_eq!(request.test_size, 0.2);
        assert_eq!(request.cv_folds, 5);
        assert_eq!(request.seed, 42);
        assert_eq!(request.estimator, EstimatorKind::RandomForest);
    }

    #[test]
    fn test_estimator_ids_and_labels() {
        assert_eq!("svm".parse::<EstimatorKind>().unwrap(), EstimatorKind::Svm);
        assert!("knn".parse::<EstimatorKind>().is_err());
        assert_eq!(EstimatorKind::Linear.label(ProblemKind::Classification), "Logistic Regression");
        assert_eq!(EstimatorKind::Linear.label(ProblemKind::Regression), "Linear Regression");
        assert_eq!(EstimatorKind::available(ProblemKind::Regression).len(), 5);
    }

    #[test]
    fn test_train_classifier() {
        let df = classification_table();
        let request = TrainingRequest::new("label", ProblemKind::Classification)
            .with_estimator(EstimatorKind::DecisionTree)
            .with_cv_folds(2);
        let outcome = train(&df, &request).unwrap();

        let summary = &outcome.report.summary;
        assert_eq!(summary.train_rows, 8);
        assert_eq!(summary.test_rows, 2);
        assert_eq!(summary.features, 2);
        match &outcome.report.metrics {
            TrainingMetrics::Classification { accuracy, cross_validation, report } => {
                assert!((accuracy - 1.0).abs() < 1e-9);
                assert_eq!(cross_validation.n_folds, 2);
                assert_eq!(report.classes.len(), 2);
            }
            other => panic!("unexpected metrics: {other:?}"),
        }
        assert_eq!(outcome.predictor.class_labels, vec!["no", "yes"]);
        assert!(outcome.report.feature_importances.is_some());
    }

    #[test]
    fn test_train_regression_diagonal() {
        let df = df!(
            "x" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
            "y" => &[2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0],
        )
        .unwrap();
        let request = TrainingRequest::new("y", ProblemKind::Regression).with_estimator(EstimatorKind::Linear);
        let outcome = train(&df, &request).unwrap();

        match outcome.report.metrics {
            TrainingMetrics::Regression { rmse, r2 } => {
                assert!(rmse < 1e-6);
                assert!(r2.unwrap() > 0.999);
            }
            other => panic!("unexpected metrics: {other:?}"),
        }
        let diagonal = outcome.report.actual_vs_predicted.diagonal.unwrap();
        assert!(diagonal[0] <= diagonal[1]);
        assert!(outcome.report.feature_importances.is_none());
    }

    #[test]
    fn test_text_feature_rejected() {
        let df = df!("c" => &["a", "b", "a", "b", "a"], "y" => &[1.0, 2.0, 1.0, 2.0, 1.0]).unwrap();
        let request = TrainingRequest::new("y", ProblemKind::Regression);
        assert!(matches!(train(&df, &request), Err(WizardError::NonNumericColumn(c)) if c == "c"));
    }

    #[test]
    fn test_split_is_seeded() {
        let df = classification_table();
        let request = TrainingRequest::new("label", ProblemKind::Classification)
            .with_estimator(EstimatorKind::Linear)
            .with_cv_folds(2);
        let a = train(&df, &request).unwrap();
        let b = train(&df, &request).unwrap();
        assert_eq!(a.report.actual_vs_predicted, b.report.actual_vs_predicted);
    }

    #[test]
    fn test_input_table_untouched() {
        let df = classification_table();
        let before = df.clone();
        let request = TrainingRequest::new("label", ProblemKind::Classification).with_cv_folds(2);
        train(&df, &request).unwrap();
        assert!(df.equals_missing(&before));
    }
}
