//! Linear models

use crate::error::{Result, WizardError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a x = b` by Cholesky decomposition.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

/// Ridge-stabilised normal equations: (XᵀX + λI) w = Xᵀy.
/// The ridge grows until the system factorises, so collinear columns
/// (a full set of one-hot indicators, for one) still get a solution.
fn solve_least_squares(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    let n = xtx.nrows();
    if n == 0 {
        return Ok(Array1::zeros(0));
    }

    let scale = (xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64).max(1.0);
    let mut ridge = alpha.max(1e-10 * scale);
    for _ in 0..8 {
        let mut a = xtx.clone();
        for i in 0..n {
            a[[i, i]] += ridge;
        }
        if let Some(w) = cholesky_solve(&a, &xty) {
            if w.iter().all(|v| v.is_finite()) {
                return Ok(w);
            }
        }
        ridge *= 100.0;
    }
    Err(WizardError::TrainingError(
        "normal equations are singular, cannot fit linear model".to_string(),
    ))
}

/// Per-feature standardisation fitted on the training rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: &Array2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Self { mean, std }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(WizardError::ShapeError {
                expected: format!("{} features", self.mean.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok((x - &self.mean.view().insert_axis(Axis(0))) / &self.std.view().insert_axis(Axis(0)))
    }
}

fn check_lengths(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(WizardError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(WizardError::TrainingError("cannot fit on zero rows".to_string()));
    }
    Ok(())
}

/// Ordinary least squares with intercept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// L2 penalty; zero is plain OLS
    pub alpha: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_lengths(x, y)?;

        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_centered = x - &x_mean.view().insert_axis(Axis(0));
        let y_centered = y - y_mean;

        let coefficients = solve_least_squares(&x_centered, &y_centered, self.alpha)?;
        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(WizardError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(WizardError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept)
    }
}

/// One binary logistic model on standardised features
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryLogistic {
    weights: Array1<f64>,
    bias: f64,
}

impl BinaryLogistic {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, alpha: f64, learning_rate: f64, max_iter: usize, tol: f64) -> Self {
        let n = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..max_iter {
            let predictions = sigmoid(&(x.dot(&weights) + bias));
            let errors = &predictions - y;
            let dw = x.t().dot(&errors) / n + alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < tol {
                break;
            }
            weights = weights - learning_rate * dw;
            bias -= learning_rate * db;
        }
        Self { weights, bias }
    }

    fn proba(&self, x: &Array2<f64>) -> Array1<f64> {
        sigmoid(&(x.dot(&self.weights) + self.bias))
    }
}

fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// L2-regularised logistic regression, one-vs-rest for more than two classes.
///
/// Targets are class codes `0..k`; predictions are codes too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub learning_rate: f64,
    scaler: Option<Standardizer>,
    models: Vec<BinaryLogistic>,
    n_classes: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            scaler: None,
            models: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_lengths(x, y)?;
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x)?;

        self.n_classes = y.iter().fold(0.0f64, |m, &v| m.max(v)) as usize + 1;
        self.models = match self.n_classes {
            1 => Vec::new(),
            2 => vec![BinaryLogistic::fit(&xs, y, self.alpha, self.learning_rate, self.max_iter, self.tol)],
            k => (0..k)
                .map(|class| {
                    let target = y.mapv(|v| if v.round() as usize == class { 1.0 } else { 0.0 });
                    BinaryLogistic::fit(&xs, &target, self.alpha, self.learning_rate, self.max_iter, self.tol)
                })
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
            2 => self.models[0].proba(&xs).mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }),
            _ => {
                let probas: Vec<Array1<f64>> = self.models.iter().map(|m| m.proba(&xs)).collect();
                (0..x.nrows()).map(|i| argmax(probas.iter().map(|p| p[i])) as f64).collect()
            }
        })
    }
}

/// Index of the largest value; the first one wins ties
pub(crate) fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0usize, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_exact_fit() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -3.0 * v) + 1.0;

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-6);
        assert!((coef[1] + 3.0).abs() < 1e-6);
        assert!((model.intercept - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_linear_regression_collinear_columns() {
        // Second column duplicates the first
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let y = array![2.0, 4.0, 6.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-3);
        }
    }

    #[test]
    fn test_logistic_binary() {
        let x = array![[0.0], [1.0], [2.0], [8.0], [9.0], [10.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_logistic_one_vs_rest() {
        let x = array![[0.0, 0.0], [0.5, 0.2], [5.0, 0.0], [5.5, 0.3], [0.0, 5.0], [0.3, 5.5]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new();
        assert!(matches!(model.predict(&array![[1.0]]), Err(WizardError::ModelNotFitted)));
    }
}
