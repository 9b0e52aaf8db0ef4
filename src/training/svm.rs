//! Linear support vector machines
//!
//! Both models train by full-batch subgradient descent on standardised
//! features, which keeps memory linear in the row count.

use super::linear_models::{argmax, Standardizer};
use crate::error::{Result, WizardError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Epochs of subgradient descent
    pub max_iter: usize,
    /// Initial step size
    pub learning_rate: f64,
    /// Half-width of the insensitive tube, in target standard deviations (regression)
    pub epsilon: f64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            learning_rate: 0.1,
            epsilon: 0.1,
        }
    }
}

/// Hyperplane `w·x + b`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Hyperplane {
    weights: Array1<f64>,
    bias: f64,
}

impl Hyperplane {
    /// `loss_grad(target, score)` is the subgradient of the data loss w.r.t. the score
    fn fit(
        config: &SVMConfig,
        x: &Array2<f64>,
        y: &Array1<f64>,
        loss_grad: impl Fn(f64, f64) -> f64,
    ) -> Self {
        let n = x.nrows() as f64;
        let lambda = 1.0 / (config.c * n);
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;

        for t in 0..config.max_iter {
            let scores = x.dot(&weights) + bias;
            let g: Array1<f64> = y.iter().zip(scores.iter()).map(|(&yi, &si)| loss_grad(yi, si)).collect();
            let dw = x.t().dot(&g) / n + lambda * &weights;
            let db = g.sum() / n;

            let lr = config.learning_rate / (1.0 + t as f64 / 100.0);
            weights.scaled_add(-lr, &dw);
            bias -= lr * db;
        }
        Self { weights, bias }
    }

    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }
}

fn hinge_grad(target: f64, score: f64) -> f64 {
    if target * score < 1.0 {
        -target
    } else {
        0.0
    }
}

/// Linear support vector classifier over class codes, one-vs-rest beyond two classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    scaler: Option<Standardizer>,
    planes: Vec<Hyperplane>,
    n_classes: usize,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            scaler: None,
            planes: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_input(x, y)?;
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x)?;
        self.n_classes = y.iter().fold(0.0f64, |m, &v| m.max(v)) as usize + 1;

        let signed = |class: usize| y.mapv(|v| if v.round() as usize == class { 1.0 } else { -1.0 });
        self.planes = match self.n_classes {
            1 => Vec::new(),
            2 => vec![Hyperplane::fit(&self.config, &xs, &signed(1), hinge_grad)],
            k => (0..k)
                .map(|class| Hyperplane::fit(&self.config, &xs, &signed(class), hinge_grad))
                .collect(),
        };
        self.scaler = Some(scaler);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scaler = self.scaler.as_ref().ok_or(WizardError::ModelNotFitted)?;
        let xs = scaler.transform(x)?;
        Ok(match self.n_classes {
            0 | 1 => Array1::zeros(x.nrows()),
            2 => self.planes[0].decision(&xs).mapv(|s| if s >= 0.0 { 1.0 } else { 0.0 }),
            _ => {
                let scores: Vec<Array1<f64>> = self.planes.iter().map(|p| p.decision(&xs)).collect();
                (0..x.nrows()).map(|i| argmax(scores.iter().map(|s| s[i])) as f64).collect()
            }
        })
    }
}

/// Linear epsilon-insensitive support vector regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVMConfig,
    scaler: Option<Standardizer>,
    plane: Option<Hyperplane>,
    y_mean: f64,
    y_std: f64,
}

impl SVMRegressor {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            scaler: None,
            plane: None,
            y_mean: 0.0,
            y_std: 1.0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_input(x, y)?;
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x)?;

        self.y_mean = y.mean().unwrap_or(0.0);
        let std = y.std(0.0);
        self.y_std = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        let ys = y.mapv(|v| (v - self.y_mean) / self.y_std);

        let epsilon = self.config.epsilon;
        let plane = Hyperplane::fit(&self.config, &xs, &ys, |target, score| {
            let r = score - target;
            if r > epsilon {
                1.0
            } else if r < -epsilon {
                -1.0
            } else {
                0.0
            }
        });
        self.plane = Some(plane);
        self.scaler = Some(scaler);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (scaler, plane) = match (&self.scaler, &self.plane) {
            (Some(s), Some(p)) => (s, p),
            _ => return Err(WizardError::ModelNotFitted),
        };
        let xs = scaler.transform(x)?;
        Ok(plane.decision(&xs).mapv(|s| s * self.y_std + self.y_mean))
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
        return Err(WizardError::TrainingError("cannot fit an SVM on zero rows".to_string()));
    }
    Ok(())
}
