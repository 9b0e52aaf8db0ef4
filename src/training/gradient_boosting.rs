//! Gradient boosted decision trees

use super::decision_tree::DecisionTree;
use super::linear_models::argmax;
use crate::error::{Result, WizardError};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Gradient boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row fraction drawn for each tree
    pub subsample: f64,
    /// Column fraction drawn for each tree
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

/// Additive sequence of regression trees fitted to residuals
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Booster {
    initial: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    feature_importances: Vec<f64>,
}

impl Booster {
    /// `residual(y, raw)` is the negative gradient of the loss at the current raw score
    fn fit(
        config: &GradientBoostingConfig,
        x: &Array2<f64>,
        y: &Array1<f64>,
        initial: f64,
        residual: impl Fn(f64, f64) -> f64,
    ) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        let mut raw = Array1::from_elem(n_samples, initial);
        let mut rng = ChaCha8Rng::seed_from_u64(config.random_state);
        let mut booster = Booster {
            initial,
            learning_rate: config.learning_rate,
            trees: Vec::with_capacity(config.n_estimators),
            col_indices_per_tree: Vec::with_capacity(config.n_estimators),
            feature_importances: vec![0.0; n_features],
        };

        for round in 0..config.n_estimators {
            let residuals: Array1<f64> = y.iter().zip(raw.iter()).map(|(&yi, &ri)| residual(yi, ri)).collect();

            let rows = sample_indices(n_samples, config.subsample, &mut rng);
            let cols = sample_indices(n_features, config.colsample_bytree, &mut rng);
            let x_sub = x.select(Axis(0), &rows).select(Axis(1), &cols);
            let r_sub = residuals.select(Axis(0), &rows);

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(config.max_depth)
                .with_min_samples_leaf(config.min_samples_leaf)
                .with_random_state(config.random_state.wrapping_add(round as u64));
            tree.fit(&x_sub, &r_sub)?;

            let update = tree.predict(&x.select(Axis(1), &cols))?;
            raw.scaled_add(config.learning_rate, &update);

            if let Some(importance) = tree.feature_importances() {
                for (j, &col) in cols.iter().enumerate() {
                    booster.feature_importances[col] += importance[j];
                }
            }
            booster.trees.push(tree);
            booster.col_indices_per_tree.push(cols);
        }

        let total: f64 = booster.feature_importances.iter().sum();
        if total > 0.0 {
            booster.feature_importances.iter_mut().for_each(|v| *v /= total);
        }
        Ok(booster)
    }

    fn raw_score(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut raw = Array1::from_elem(x.nrows(), self.initial);
        for (tree, cols) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let update = tree.predict(&x.select(Axis(1), cols))?;
            raw.scaled_add(self.learning_rate, &update);
        }
        Ok(raw)
    }
}

/// Sorted random subset of `0..n` covering `fraction` of it (everything at 1.0)
fn sample_indices(n: usize, fraction: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if fraction >= 1.0 {
        return indices;
    }
    let size = ((n as f64) * fraction).ceil().max(1.0) as usize;
    indices.shuffle(rng);
    indices.truncate(size);
    indices.sort_unstable();
    indices
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn log_odds(p: f64) -> f64 {
    let p = p.clamp(1e-10, 1.0 - 1e-10);
    (p / (1.0 - p)).ln()
}

/// Squared-loss gradient boosting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    booster: Option<Booster>,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self { config, booster: None }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_input(x, y)?;
        let initial = y.mean().unwrap_or(0.0);
        self.booster = Some(Booster::fit(&self.config, x, y, initial, |yi, ri| yi - ri)?);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.booster.as_ref().ok_or(WizardError::ModelNotFitted)?.raw_score(x)
    }

    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        self.booster.as_ref().map(|b| Array1::from_vec(b.feature_importances.clone()))
    }
}

/// Log-loss gradient boosting over class codes, one booster per class beyond two
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    boosters: Vec<Booster>,
    n_classes: usize,
    n_features: usize,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            boosters: Vec::new(),
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_input(x, y)?;
        self.n_features = x.ncols();
        self.n_classes = y.iter().fold(0.0f64, |m, &v| m.max(v)) as usize + 1;

        let fit_binary = |target: &Array1<f64>| {
            let initial = log_odds(target.mean().unwrap_or(0.5));
            Booster::fit(&self.config, x, target, initial, |yi, ri| yi - sigmoid(ri))
        };

        self.boosters = match self.n_classes {
            1 => Vec::new(),
            2 => vec![fit_binary(y)?],
            k => (0..k)
                .map(|class| fit_binary(&y.mapv(|v| if v.round() as usize == class { 1.0 } else { 0.0 })))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self.n_classes {
            0 => Err(WizardError::ModelNotFitted),
            1 => Ok(Array1::zeros(x.nrows())),
            2 => Ok(self.boosters[0].raw_score(x)?.mapv(|r| if sigmoid(r) >= 0.5 { 1.0 } else { 0.0 })),
            _ => {
                let scores = self.boosters.iter().map(|b| b.raw_score(x)).collect::<Result<Vec<_>>>()?;
                Ok((0..x.nrows()).map(|i| argmax(scores.iter().map(|s| s[i])) as f64).collect())
            }
        }
    }

    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_classes == 0 {
            return None;
        }
        let mut total = Array1::<f64>::zeros(self.n_features);
        for booster in &self.boosters {
            total += &Array1::from_vec(booster.feature_importances.clone());
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        Some(total)
    }
}

fn check_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(WizardError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(WizardError::TrainingError("cannot boost on zero rows".to_string()));
    }
    Ok(())
}
