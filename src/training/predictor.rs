//! Fitted model artifact

use super::decision_tree::DecisionTree;
use super::features::feature_matrix;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
use super::linear_models::{LinearRegression, LogisticRegression};
use super::random_forest::RandomForest;
use super::svm::{SVMClassifier, SVMConfig, SVMRegressor};
use super::{EstimatorKind, ProblemKind};
use crate::error::{Result, WizardError};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Trees per forest
const FOREST_SIZE: usize = 100;

/// Fitted estimator of any supported kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    SVMClassifier(SVMClassifier),
    SVMRegressor(SVMRegressor),
    GradientBoostingClassifier(GradientBoostingClassifier),
    GradientBoostingRegressor(GradientBoostingRegressor),
}

impl TrainedModel {
    /// Build the estimator behind an id and fit it on `(x, y)`.
    pub fn fit(
        estimator: EstimatorKind,
        problem: ProblemKind,
        seed: u64,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Self> {
        let classify = problem == ProblemKind::Classification;
        let model = match estimator {
            EstimatorKind::DecisionTree => {
                let mut tree = if classify {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                }
                .with_random_state(seed);
                tree.fit(x, y)?;
                TrainedModel::DecisionTree(tree)
            }
            EstimatorKind::RandomForest => {
                let mut forest = if classify {
                    RandomForest::new_classifier(FOREST_SIZE)
                } else {
                    RandomForest::new_regressor(FOREST_SIZE)
                }
                .with_random_state(seed);
                forest.fit(x, y)?;
                TrainedModel::RandomForest(forest)
            }
            EstimatorKind::Linear if classify => {
                let mut model = LogisticRegression::new();
                model.fit(x, y)?;
                TrainedModel::LogisticRegression(model)
            }
            EstimatorKind::Linear => {
                let mut model = LinearRegression::new();
                model.fit(x, y)?;
                TrainedModel::LinearRegression(model)
            }
            EstimatorKind::Svm if classify => {
                let mut model = SVMClassifier::new(SVMConfig::default());
                model.fit(x, y)?;
                TrainedModel::SVMClassifier(model)
            }
            EstimatorKind::Svm => {
                let mut model = SVMRegressor::new(SVMConfig::default());
                model.fit(x, y)?;
                TrainedModel::SVMRegressor(model)
            }
            EstimatorKind::GradientBoosting => {
                let config = GradientBoostingConfig {
                    random_state: seed,
                    ..GradientBoostingConfig::default()
                };
                if classify {
                    let mut model = GradientBoostingClassifier::new(config);
                    model.fit(x, y)?;
                    TrainedModel::GradientBoostingClassifier(model)
                } else {
                    let mut model = GradientBoostingRegressor::new(config);
                    model.fit(x, y)?;
                    TrainedModel::GradientBoostingRegressor(model)
                }
            }
        };
        Ok(model)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::DecisionTree(m) => m.predict(x),
            TrainedModel::RandomForest(m) => m.predict(x),
            TrainedModel::LinearRegression(m) => m.predict(x),
            TrainedModel::LogisticRegression(m) => m.predict(x),
            TrainedModel::SVMClassifier(m) => m.predict(x),
            TrainedModel::SVMRegressor(m) => m.predict(x),
            TrainedModel::GradientBoostingClassifier(m) => m.predict(x),
            TrainedModel::GradientBoostingRegressor(m) => m.predict(x),
        }
    }

    /// Normalised importances; tree-based estimators only
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        match self {
            TrainedModel::DecisionTree(m) => m.feature_importances().cloned(),
            TrainedModel::RandomForest(m) => m.feature_importances().cloned(),
            TrainedModel::GradientBoostingClassifier(m) => m.feature_importances(),
            TrainedModel::GradientBoostingRegressor(m) => m.feature_importances(),
            _ => None,
        }
    }
}

/// One feature's share of the model's importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Model output, as class labels or as values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predictions {
    Labels(Vec<String>),
    Values(Vec<f64>),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Labels(v) => v.len(),
            Predictions::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fitted model plus everything needed to apply it to a new table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictor {
    pub estimator: EstimatorKind,
    pub problem: ProblemKind,
    pub target: String,
    pub feature_names: Vec<String>,
    /// Label of each class code; empty for regression
    pub class_labels: Vec<String>,
    pub trained_at: DateTime<Utc>,
    model: TrainedModel,
}

impl Predictor {
    pub fn new(
        estimator: EstimatorKind,
        problem: ProblemKind,
        target: impl Into<String>,
        feature_names: Vec<String>,
        class_labels: Vec<String>,
        model: TrainedModel,
    ) -> Self {
        Self {
            estimator,
            problem,
            target: target.into(),
            feature_names,
            class_labels,
            trained_at: Utc::now(),
            model,
        }
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Raw model output over a feature matrix laid out like `feature_names`
    pub fn predict_array(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.feature_names.len() {
            return Err(WizardError::ShapeError {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        self.model.predict(x)
    }

    /// Map class codes back to their labels
    pub fn decode(&self, raw: &Array1<f64>) -> Predictions {
        match self.problem {
            ProblemKind::Classification => Predictions::Labels(
                raw.iter()
                    .map(|&code| {
                        let idx = code.round().max(0.0) as usize;
                        self.class_labels
                            .get(idx)
                            .cloned()
                            .unwrap_or_else(|| code.to_string())
                    })
                    .collect(),
            ),
            ProblemKind::Regression => Predictions::Values(raw.to_vec()),
        }
    }

    /// Predict every row of `df`; the table must hold every training feature.
    pub fn predict(&self, df: &DataFrame) -> Result<Predictions> {
        let x = feature_matrix(df, &self.feature_names)?;
        let raw = self.predict_array(&x)?;
        Ok(self.decode(&raw))
    }

    /// Importances by feature, largest first
    pub fn feature_importances(&self) -> Option<Vec<FeatureImportance>> {
        let weights = self.model.feature_importances()?;
        let mut ranked: Vec<FeatureImportance> = self
            .feature_names
            .iter()
            .zip(weights.iter())
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance).then_with(|| a.feature.cmp(&b.feature)));
        Some(ranked)
    }

    /// Downloadable JSON form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
